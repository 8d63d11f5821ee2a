//! rung-run - headless driver for the Rung simulator
//!
//! Loads a program, then runs the fixed per-frame order: control-channel
//! input events into the staging layer, fieldbus sync, engine update,
//! output readers. The source file's modification time is polled every
//! frame; a successful reparse swaps program and scan state atomically, a
//! failed one keeps the previous program running.
//!
//! Interactive control reads line commands from stdin:
//!
//! ```text
//! set NAME LEVEL   stage a signal write (LEVEL 0..255)
//! toggle NAME      stage a boolean flip
//! press BTN        hold a button's momentary state
//! release BTN      release it
//! latch BTN        toggle a button's latched state
//! step             advance exactly one node
//! pause / run      stop or resume the scan clock
//! speed SLIDER     set the rate from the 0..1 slider curve
//! quit             clean shutdown
//! ```

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rung_dsl::parse_file;
use rung_fieldbus::FieldbusBridge;
use rung_runtime::{slider_to_hz, Engine, OrderPolicy};

/// Frame pacing for the continuous loop
const FRAME: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "rung-run")]
#[command(about = "Run a Rung gate-logic program in the scan-cycle simulator")]
struct Cli {
    /// Path to the program source file
    source: Option<PathBuf>,

    /// Scan rate in Hz
    #[arg(long, default_value = "10.0")]
    hz: f32,

    /// Scan rate as the 0..1 speed-slider position (overrides --hz)
    #[arg(long)]
    speed: Option<f32>,

    /// Number of scans to run, then exit (0 = run until interrupted)
    #[arg(long, default_value = "0")]
    steps: u64,

    /// Node evaluation order
    #[arg(long, value_enum, default_value_t = OrderArg::Source)]
    order: OrderArg,

    /// Connect the Modbus/TCP bridge from modbus_config.txt
    #[arg(long)]
    modbus: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OrderArg {
    /// Evaluate nodes in the order they appear in the file
    Source,
    /// Dependency order with cycles appended at the tail
    Kahn,
}

impl From<OrderArg> for OrderPolicy {
    fn from(arg: OrderArg) -> OrderPolicy {
        match arg {
            OrderArg::Source => OrderPolicy::SourceOrder,
            OrderArg::Kahn => OrderPolicy::Kahn,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rung_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let Some(source) = cli.source.clone() else {
        eprintln!("Usage: rung-run <program.rung>");
        process::exit(1);
    };

    let program = match parse_file(&source) {
        Ok(program) => program,
        Err(e) => {
            error!("Parse error: {e}");
            process::exit(1);
        }
    };
    info!(
        path = %source.display(),
        nodes = program.nodes.len(),
        signals = program.signal_count(),
        "program loaded"
    );

    let policy = OrderPolicy::from(cli.order);
    let mut engine = Engine::with_policy(program, policy);
    if let Err(e) = engine.validity() {
        warn!("program will not run: {e}");
    }

    let mut bridge = FieldbusBridge::from_config_file();
    if cli.modbus && !bridge.connect() {
        warn!(
            "modbus: {}",
            bridge.last_error().unwrap_or("unknown error")
        );
    }

    let hz = cli.speed.map(slider_to_hz).unwrap_or(cli.hz);
    if cli.steps > 0 {
        run_batch(cli.steps, hz, &mut engine, &mut bridge);
    } else {
        run_continuous(&source, policy, hz, &mut engine, &mut bridge);
    }
}

/// Fixed number of scans at a deterministic dt, then exit.
fn run_batch(steps: u64, hz: f32, engine: &mut Engine, bridge: &mut FieldbusBridge) {
    let dt = 1.0 / hz;
    let mut outputs = Vec::new();
    for _ in 0..steps {
        bridge.sync(engine);
        engine.update(dt, hz, true, false);
        report_outputs(engine, &mut outputs);
    }
}

/// Realtime loop with stdin control and hot reload, until quit.
fn run_continuous(
    source: &Path,
    policy: OrderPolicy,
    start_hz: f32,
    engine: &mut Engine,
    bridge: &mut FieldbusBridge,
) {
    let commands = spawn_control_channel();
    let mut watcher = FileWatcher::new(source);
    let mut outputs = Vec::new();
    let mut last = Instant::now();
    let mut hz = start_hz;
    let mut running = true;

    loop {
        if watcher.changed() {
            match parse_file(source) {
                Ok(program) => {
                    // in-flight staged inputs die with the old scan state
                    *engine = Engine::with_policy(program, policy);
                    outputs.clear();
                    info!("hot reload complete");
                }
                Err(e) => warn!("hot reload failed, keeping previous program: {e}"),
            }
        }

        let mut step_once = false;
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Set(name, level) => engine.set_analog(&name, level),
                Command::Toggle(name) => engine.toggle_signal(&name),
                Command::Press(name, down) => engine.set_momentary(&name, down),
                Command::Latch(name) => engine.toggle_latch(&name),
                Command::Step => step_once = true,
                Command::Run(on) => running = on,
                Command::Speed(slider) => {
                    hz = slider_to_hz(slider);
                    info!("scan rate {hz:.1} Hz");
                }
                Command::Quit => return,
            }
        }

        bridge.sync(engine);

        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;
        engine.update(dt, hz, running, step_once);

        report_outputs(engine, &mut outputs);

        thread::sleep(FRAME);
    }
}

/// Log the public output image whenever it changes.
fn report_outputs(engine: &Engine, last: &mut Vec<u8>) {
    let program = engine.program();
    let image: Vec<u8> = program
        .outputs
        .iter()
        .chain(&program.analog_outputs)
        .map(|name| engine.committed_level(name))
        .collect();

    if *last != image {
        let rendered: Vec<String> = program
            .outputs
            .iter()
            .chain(&program.analog_outputs)
            .zip(&image)
            .map(|(name, level)| format!("{name}={level}"))
            .collect();
        info!("outputs: {}", rendered.join(" "));
        *last = image;
    }
}

/// Input events staged from the terminal
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Set(String, u8),
    Toggle(String),
    Press(String, bool),
    Latch(String),
    Step,
    Run(bool),
    Speed(f32),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()? {
        "set" => {
            let name = parts.next()?.to_string();
            let level = parts.next()?.parse().ok()?;
            Command::Set(name, level)
        }
        "toggle" => Command::Toggle(parts.next()?.to_string()),
        "press" => Command::Press(parts.next()?.to_string(), true),
        "release" => Command::Press(parts.next()?.to_string(), false),
        "latch" => Command::Latch(parts.next()?.to_string()),
        "step" => Command::Step,
        "run" => Command::Run(true),
        "pause" => Command::Run(false),
        "speed" => Command::Speed(parts.next()?.parse().ok()?),
        "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Reader thread feeding stdin commands into the driver loop
fn spawn_control_channel() -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => {
                    if !line.trim().is_empty() {
                        warn!("unrecognized command: {line}");
                    }
                }
            }
        }
    });
    rx
}

/// Poll-based watcher over the source file's modification time
struct FileWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl FileWatcher {
    fn new(path: &Path) -> FileWatcher {
        FileWatcher {
            path: path.to_path_buf(),
            last_modified: mtime(path),
        }
    }

    /// True once per observed modification
    fn changed(&mut self) -> bool {
        let now = mtime(&self.path);
        if now != self.last_modified {
            self.last_modified = now;
            now.is_some()
        } else {
            false
        }
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("set LEVEL 200"),
            Some(Command::Set("LEVEL".to_string(), 200))
        );
        assert_eq!(
            parse_command("toggle START"),
            Some(Command::Toggle("START".to_string()))
        );
        assert_eq!(
            parse_command("press b1"),
            Some(Command::Press("b1".to_string(), true))
        );
        assert_eq!(
            parse_command("release b1"),
            Some(Command::Press("b1".to_string(), false))
        );
        assert_eq!(
            parse_command("latch b1"),
            Some(Command::Latch("b1".to_string()))
        );
        assert_eq!(parse_command("step"), Some(Command::Step));
        assert_eq!(parse_command("pause"), Some(Command::Run(false)));
        assert_eq!(parse_command("run"), Some(Command::Run(true)));
        assert_eq!(parse_command("speed 0.5"), Some(Command::Speed(0.5)));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
    }

    #[test]
    fn test_bad_commands_are_rejected() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("frobnicate"), None);
        assert_eq!(parse_command("set LEVEL"), None);
        assert_eq!(parse_command("set LEVEL many"), None);
        assert_eq!(parse_command("speed fast"), None);
    }
}
