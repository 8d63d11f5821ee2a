//! Scan engine.
//!
//! Holds two equal-length signal buffers: `cur` is the committed snapshot
//! (what readers and the fieldbus see), `next` is scratch for the scan in
//! progress. One scan is: commit staged inputs into `cur`, snapshot
//! `next <- cur`, evaluate every node in order against `next`, swap.
//! Reads during a scan therefore see prior-scan values for nodes that have
//! not run yet and this-scan values for nodes that have, which under source
//! order with no forward references is straight-line evaluation.
//!
//! Timer elapsed-time bookkeeping runs once per `update` against the
//! committed snapshot, before any commit barrier of that update.

use std::collections::HashMap;
use std::mem;

use tracing::{info, warn};

use rung_dsl::{NodeKind, Program, SignalId, DEFAULT_PRESET_SECS};

use crate::error::Error;
use crate::order::{OrderPolicy, ScanOrder};
use crate::staging::InputStaging;

/// Up-counter ceiling (16-bit IEC counter range)
const CTU_MAX: i32 = 32767;

/// Map the 0..1 speed slider to 0.5..2000 Hz, exponentially.
pub fn slider_to_hz(slider: f32) -> f32 {
    0.5 * 4000.0_f32.powf(slider.clamp(0.0, 1.0))
}

/// Pacing mode for [`Engine::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    /// One full scan per paced tick (rate = scans per second)
    #[default]
    FastScan,
    /// One node per paced tick, exposing the node's source line for
    /// visualization (rate = nodes per second)
    SingleNode,
}

/// Scan-cycle evaluator over a parsed program
pub struct Engine {
    program: Program,
    order: ScanOrder,
    mode: StepMode,

    /// Committed snapshot, read by the UI surface and the fieldbus
    cur: Vec<u8>,
    /// Scratch buffer for the in-progress scan
    next: Vec<u8>,

    staging: InputStaging,
    momentary: HashMap<String, bool>,
    latch: HashMap<String, bool>,

    timer_elapsed: HashMap<String, f32>,
    timer_status: HashMap<String, bool>,
    preset_time: HashMap<String, f32>,
    preset_count: HashMap<String, i32>,
    current_count: HashMap<String, i32>,
    /// Previous input for PS/NS and counter clock edges, keyed by node name
    prev_edge: HashMap<String, bool>,

    acc: f32,
    step_idx: usize,
    stepping: bool,
    cur_line: Option<usize>,
    cur_node: Option<usize>,
    last_visible_line: Option<usize>,
    last_visible_node: Option<usize>,
}

fn value(buf: &[u8], id: SignalId) -> u8 {
    buf.get(id.index()).copied().unwrap_or(0)
}

fn high(buf: &[u8], id: SignalId) -> bool {
    value(buf, id) != 0
}

impl Engine {
    pub fn new(program: Program) -> Engine {
        Engine::with_policy(program, OrderPolicy::SourceOrder)
    }

    pub fn with_policy(program: Program, policy: OrderPolicy) -> Engine {
        let order = ScanOrder::build(&program, policy);

        let n = program.signal_count();
        let mut cur = vec![0u8; n];
        // constants live in the buffers for the life of the program;
        // nothing ever writes them back
        for (id, &konst) in &program.constants {
            if let Some(cell) = cur.get_mut(id.index()) {
                *cell = konst;
            }
        }
        let next = cur.clone();

        let mut preset_time = HashMap::new();
        let mut preset_count = HashMap::new();
        let mut current_count = HashMap::new();
        for node in &program.nodes {
            if let Some(pt) = node.preset_time {
                if pt > 0.0 {
                    preset_time.insert(node.name.clone(), pt);
                }
            }
            if let Some(pc) = node.preset_count {
                preset_count.insert(node.name.clone(), pc);
                if node.kind == NodeKind::Ctd {
                    // down counters start loaded
                    current_count.insert(node.name.clone(), pc);
                }
            }
        }

        let engine = Engine {
            program,
            order,
            mode: StepMode::default(),
            cur,
            next,
            staging: InputStaging::default(),
            momentary: HashMap::new(),
            latch: HashMap::new(),
            timer_elapsed: HashMap::new(),
            timer_status: HashMap::new(),
            preset_time,
            preset_count,
            current_count,
            prev_edge: HashMap::new(),
            acc: 0.0,
            step_idx: 0,
            stepping: false,
            cur_line: None,
            cur_node: None,
            last_visible_line: None,
            last_visible_node: None,
        };

        match engine.validity() {
            Ok(()) => info!(
                nodes = engine.program.nodes.len(),
                signals = n,
                forward_refs = engine.order.has_forward_refs(),
                "scan engine ready"
            ),
            Err(e) => warn!("scan engine not runnable: {e}"),
        }
        engine
    }

    /// Why the engine refuses to run, if it does
    pub fn validity(&self) -> Result<(), Error> {
        if self.program.nodes.is_empty() {
            return Err(Error::EmptyProgram);
        }
        if self.order.len() != self.program.nodes.len() {
            return Err(Error::IncompleteOrder {
                ordered: self.order.len(),
                total: self.program.nodes.len(),
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validity().is_ok()
    }

    /// Advance the simulation.
    ///
    /// `step_once` advances exactly one node regardless of rate or pause
    /// state. Otherwise, when running, `acc += dt` and paced ticks execute
    /// until the accumulator drains: one full scan per tick in
    /// [`StepMode::FastScan`], one node per tick in [`StepMode::SingleNode`].
    pub fn update(&mut self, dt: f32, rate_hz: f32, running: bool, step_once: bool) {
        if !self.is_valid() {
            return;
        }

        if running && dt > 0.0 {
            self.advance_timers(dt);
        }

        if step_once {
            self.begin_cycle_if_needed();
            self.step_one_node();
            return;
        }

        if !running || rate_hz <= 0.0 {
            return;
        }

        self.acc += dt;
        let step_time = 1.0 / rate_hz;
        while self.acc >= step_time {
            match self.mode {
                StepMode::FastScan => self.full_scan(),
                StepMode::SingleNode => {
                    self.begin_cycle_if_needed();
                    self.step_one_node();
                }
            }
            self.acc -= step_time;
        }
    }

    // === external input surface ===

    pub fn set_momentary(&mut self, btn: &str, down: bool) {
        if self.find_btn(btn) {
            self.staging.stage_momentary(btn, down);
        }
    }

    pub fn toggle_latch(&mut self, btn: &str) {
        if !self.find_btn(btn) {
            return;
        }
        let current = self
            .staging
            .staged_latch(btn)
            .unwrap_or_else(|| self.latch.get(btn).copied().unwrap_or(false));
        self.staging.stage_latch(btn, !current);
    }

    pub fn toggle_signal(&mut self, name: &str) {
        let Some(id) = self.program.signal(name) else {
            return;
        };
        if self.program.constant_value(id).is_some() {
            return;
        }
        let current = self
            .staging
            .staged_signal(id)
            .unwrap_or_else(|| value(&self.cur, id));
        self.staging.stage_signal(id, if current != 0 { 0 } else { 1 });
    }

    pub fn set_signal(&mut self, name: &str, on: bool) {
        self.set_analog(name, u8::from(on));
    }

    pub fn set_analog(&mut self, name: &str, level: u8) {
        let Some(id) = self.program.signal(name) else {
            return;
        };
        if self.program.constant_value(id).is_some() {
            return;
        }
        self.staging.stage_signal(id, level);
    }

    // === read-back: staged value wins so the surface reacts instantly ===

    pub fn is_button_pressed(&self, btn: &str) -> bool {
        self.staging
            .staged_momentary(btn)
            .unwrap_or_else(|| self.momentary.get(btn).copied().unwrap_or(false))
    }

    pub fn is_button_latched(&self, btn: &str) -> bool {
        self.staging
            .staged_latch(btn)
            .unwrap_or_else(|| self.latch.get(btn).copied().unwrap_or(false))
    }

    pub fn signal_value(&self, name: &str) -> bool {
        self.analog_value(name) != 0
    }

    pub fn analog_value(&self, name: &str) -> u8 {
        let Some(id) = self.program.signal(name) else {
            return 0;
        };
        self.staging
            .staged_signal(id)
            .unwrap_or_else(|| value(&self.cur, id))
    }

    /// Committed value only, bypassing staged read-back. The fieldbus
    /// publishes from this so a half-staged frame never reaches the wire.
    pub fn committed_level(&self, name: &str) -> u8 {
        self.program
            .signal(name)
            .map(|id| value(&self.cur, id))
            .unwrap_or(0)
    }

    // === per-node state ===

    pub fn set_preset_time(&mut self, node: &str, seconds: f32) {
        self.preset_time.insert(node.to_string(), seconds);
    }

    pub fn preset_time(&self, node: &str) -> f32 {
        self.preset_time
            .get(node)
            .copied()
            .unwrap_or(DEFAULT_PRESET_SECS)
    }

    pub fn elapsed_time(&self, node: &str) -> f32 {
        self.timer_elapsed.get(node).copied().unwrap_or(0.0)
    }

    pub fn timer_status(&self, node: &str) -> bool {
        self.timer_status.get(node).copied().unwrap_or(false)
    }

    pub fn set_preset_count(&mut self, node: &str, count: i32) {
        self.preset_count.insert(node.to_string(), count);
    }

    pub fn preset_count(&self, node: &str) -> i32 {
        self.preset_count.get(node).copied().unwrap_or(0)
    }

    pub fn set_current_count(&mut self, node: &str, count: i32) {
        self.current_count.insert(node.to_string(), count);
    }

    pub fn current_count(&self, node: &str) -> i32 {
        self.current_count.get(node).copied().unwrap_or(0)
    }

    // === committed state ===

    /// The committed snapshot; valid between scans
    pub fn signals(&self) -> &[u8] {
        &self.cur
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn order(&self) -> &ScanOrder {
        &self.order
    }

    pub fn set_step_mode(&mut self, mode: StepMode) {
        self.mode = mode;
    }

    /// Source line being evaluated (0-based), skipping synthetic nodes
    pub fn current_line(&self) -> Option<usize> {
        self.cur_line
    }

    pub fn current_node(&self) -> Option<usize> {
        self.cur_node
    }

    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    // === scan internals ===

    fn find_btn(&self, name: &str) -> bool {
        self.program
            .nodes
            .iter()
            .any(|n| n.kind == NodeKind::Btn && n.name == name)
    }

    fn commit_staged(&mut self) {
        let Engine {
            staging,
            momentary,
            latch,
            cur,
            ..
        } = self;
        staging.commit(momentary, latch, cur);
    }

    /// Timer bookkeeping against the committed snapshot. Runs before the
    /// commit barrier, so an input staged this frame is not seen until the
    /// scan that commits it.
    fn advance_timers(&mut self, dt: f32) {
        let Engine {
            program,
            cur,
            timer_elapsed,
            timer_status,
            preset_time,
            ..
        } = self;

        for node in &program.nodes {
            match node.kind {
                NodeKind::Ton => {
                    let active = node.inputs.first().map(|&s| high(cur, s)).unwrap_or(false);
                    let preset = preset_time
                        .get(&node.name)
                        .copied()
                        .unwrap_or(DEFAULT_PRESET_SECS);
                    let elapsed = timer_elapsed.entry(node.name.clone()).or_insert(0.0);
                    if active {
                        *elapsed += dt;
                    }
                    if *elapsed >= preset {
                        *elapsed = 0.0;
                        timer_status.insert(node.name.clone(), true);
                    }
                    if !active {
                        *elapsed = 0.0;
                        timer_status.insert(node.name.clone(), false);
                    }
                }
                NodeKind::Tof => {
                    let active = node.inputs.first().map(|&s| high(cur, s)).unwrap_or(false);
                    let preset = preset_time
                        .get(&node.name)
                        .copied()
                        .unwrap_or(DEFAULT_PRESET_SECS);
                    let status = timer_status.get(&node.name).copied().unwrap_or(false);
                    let elapsed = timer_elapsed.entry(node.name.clone()).or_insert(0.0);
                    if active {
                        *elapsed = 0.0;
                    } else if status {
                        *elapsed += dt;
                    }
                    if *elapsed >= preset {
                        *elapsed = 0.0;
                        timer_status.insert(node.name.clone(), false);
                    }
                }
                _ => {}
            }
        }
    }

    fn begin_cycle_if_needed(&mut self) {
        if !self.stepping {
            self.begin_cycle();
        }
    }

    fn begin_cycle(&mut self) {
        self.commit_staged();
        self.stepping = true;
        self.step_idx = 0;
        self.next.copy_from_slice(&self.cur);
        self.cur_line = None;
        self.last_visible_line = None;
        self.last_visible_node = None;
    }

    fn full_scan(&mut self) {
        if self.stepping {
            // mode switched mid-cycle: drain the remainder as this scan
            while self.stepping {
                self.step_one_node();
            }
            return;
        }
        self.begin_cycle();
        while self.stepping {
            self.step_one_node();
        }
    }

    fn step_one_node(&mut self) {
        let order_len = self.order.len();
        if self.step_idx >= order_len {
            self.finish_cycle();
            return;
        }

        let node_idx = self.order.indices()[self.step_idx];
        let (line, synthetic) = {
            let node = &self.program.nodes[node_idx];
            (node.line, node.synthetic)
        };

        self.cur_node = Some(node_idx);
        // synthetic nodes evaluate but never take the visible line
        if !synthetic {
            self.cur_line = Some(line);
            self.last_visible_line = Some(line);
            self.last_visible_node = Some(node_idx);
        }

        self.evaluate_node(node_idx);

        self.step_idx += 1;
        if self.step_idx >= order_len {
            self.finish_cycle();
        }
    }

    fn finish_cycle(&mut self) {
        mem::swap(&mut self.cur, &mut self.next);
        self.stepping = false;
        self.step_idx = 0;
        self.cur_line = self.last_visible_line;
        self.cur_node = self.last_visible_node;
    }

    fn evaluate_node(&mut self, node_idx: usize) {
        let Engine {
            program,
            next,
            momentary,
            latch,
            timer_elapsed,
            timer_status,
            preset_time,
            preset_count,
            current_count,
            prev_edge,
            ..
        } = self;
        let node = &program.nodes[node_idx];

        let out = match node.kind {
            NodeKind::And => node.inputs.iter().all(|&s| high(next, s)),
            NodeKind::Or => node.inputs.iter().any(|&s| high(next, s)),
            // parity: true iff an odd number of inputs are true
            NodeKind::Xor => node.inputs.iter().filter(|&&s| high(next, s)).count() % 2 == 1,
            NodeKind::Not => node.inputs.first().map(|&s| !high(next, s)).unwrap_or(false),

            NodeKind::Ps => {
                let now = node.inputs.first().map(|&s| high(next, s)).unwrap_or(false);
                let prev = prev_edge.insert(node.name.clone(), now).unwrap_or(false);
                now && !prev
            }
            NodeKind::Ns => {
                let now = node.inputs.first().map(|&s| high(next, s)).unwrap_or(false);
                let prev = prev_edge.insert(node.name.clone(), now).unwrap_or(false);
                !now && prev
            }

            NodeKind::Sr => {
                if node.inputs.len() < 2 {
                    false
                } else {
                    let set = high(next, node.inputs[0]);
                    let reset = high(next, node.inputs[1]);
                    if set {
                        true
                    } else if reset {
                        false
                    } else {
                        // hold: the same output signal in the working buffer
                        node.outputs.first().map(|&o| high(next, o)).unwrap_or(false)
                    }
                }
            }
            NodeKind::Rs => {
                if node.inputs.len() < 2 {
                    false
                } else {
                    let set = high(next, node.inputs[0]);
                    let reset = high(next, node.inputs[1]);
                    if reset {
                        false
                    } else if set {
                        true
                    } else {
                        node.outputs.first().map(|&o| high(next, o)).unwrap_or(false)
                    }
                }
            }

            NodeKind::Ton => {
                let active = node.inputs.first().map(|&s| high(next, s)).unwrap_or(false);
                if !active {
                    timer_elapsed.insert(node.name.clone(), 0.0);
                    timer_status.insert(node.name.clone(), false);
                }
                active && timer_status.get(&node.name).copied().unwrap_or(false)
            }
            NodeKind::Tof => {
                let active = node.inputs.first().map(|&s| high(next, s)).unwrap_or(false);
                let preset = preset_time
                    .get(&node.name)
                    .copied()
                    .unwrap_or(DEFAULT_PRESET_SECS);
                let elapsed = timer_elapsed.get(&node.name).copied().unwrap_or(0.0);
                if active {
                    timer_status.insert(node.name.clone(), true);
                    true
                } else if elapsed >= preset {
                    timer_status.insert(node.name.clone(), false);
                    false
                } else {
                    timer_status.get(&node.name).copied().unwrap_or(false)
                }
            }

            NodeKind::Ctu => {
                if node.inputs.len() < 2 {
                    false
                } else {
                    let cu = high(next, node.inputs[0]);
                    let reset = high(next, node.inputs[1]);
                    let prev = prev_edge.insert(node.name.clone(), cu).unwrap_or(false);
                    let mut cv = current_count.get(&node.name).copied().unwrap_or(0);
                    let pv = preset_count.get(&node.name).copied().unwrap_or(0);
                    if reset {
                        cv = 0;
                    } else if cu && !prev && cv < CTU_MAX {
                        cv += 1;
                    }
                    current_count.insert(node.name.clone(), cv);
                    cv >= pv
                }
            }
            NodeKind::Ctd => {
                if node.inputs.len() < 2 {
                    false
                } else {
                    let cd = high(next, node.inputs[0]);
                    let load = high(next, node.inputs[1]);
                    let prev = prev_edge.insert(node.name.clone(), cd).unwrap_or(false);
                    let mut cv = current_count.get(&node.name).copied().unwrap_or(0);
                    let pv = preset_count.get(&node.name).copied().unwrap_or(0);
                    if load {
                        cv = pv;
                    } else if cd && !prev && cv > 0 {
                        cv -= 1;
                    }
                    current_count.insert(node.name.clone(), cv);
                    cv <= 0
                }
            }

            NodeKind::Lt | NodeKind::Gt | NodeKind::Eq => {
                if node.inputs.len() < 2 {
                    false
                } else {
                    let a = value(next, node.inputs[0]);
                    let b = value(next, node.inputs[1]);
                    match node.kind {
                        NodeKind::Lt => a < b,
                        NodeKind::Gt => a > b,
                        _ => a == b,
                    }
                }
            }

            NodeKind::Btn => {
                momentary.get(&node.name).copied().unwrap_or(false)
                    || latch.get(&node.name).copied().unwrap_or(false)
            }
        };

        let bit = u8::from(out);
        for &output in &node.outputs {
            // constants stay immutable even if named as an output
            if program.constant_value(output).is_some() {
                continue;
            }
            if let Some(cell) = next.get_mut(output.index()) {
                *cell = bit;
            }
        }
        if let Some(cv_out) = node.cv_output {
            if program.constant_value(cv_out).is_none() {
                let cv = current_count.get(&node.name).copied().unwrap_or(0);
                if let Some(cell) = next.get_mut(cv_out.index()) {
                    *cell = cv.clamp(0, 255) as u8;
                }
            }
        }
    }
}
