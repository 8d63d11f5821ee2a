//! The bridge itself: reserved-name mapping and the per-sync exchange.
//!
//! One sync pass, invoked between input handling and scan execution:
//!
//! 1. read discrete inputs at address 0, stage them as `INPUT_i`
//! 2. snapshot committed `OUTPUT_i` coils, write them if any bit changed
//! 3. read input registers at address 0, stage them as `AINPUT_i`
//! 4. snapshot committed `AOUTPUT_i` registers, write them if any changed
//!
//! Transport failures land in `last_error` and the rest of the pass is
//! retried on the next sync; the scan engine keeps running either way.

use std::io;
use std::net::SocketAddr;

use tracing::{info, warn};

use rung_runtime::Engine;

use crate::config::{FieldbusConfig, CONFIG_FILE};
use crate::transport::{TcpTransport, Transport};
use crate::Error;

pub struct FieldbusBridge {
    config: FieldbusConfig,
    transport: Option<Box<dyn Transport>>,
    last_error: Option<String>,
    coil_shadow: Vec<bool>,
    register_shadow: Vec<u16>,
}

impl FieldbusBridge {
    pub fn new(mut config: FieldbusConfig) -> FieldbusBridge {
        config.clamp();
        let coil_shadow = vec![false; config.num_outputs as usize];
        let register_shadow = vec![0; config.num_analog_outputs as usize];
        FieldbusBridge {
            config,
            transport: None,
            last_error: None,
            coil_shadow,
            register_shadow,
        }
    }

    /// Bridge configured from `modbus_config.txt` in the working directory
    pub fn from_config_file() -> FieldbusBridge {
        FieldbusBridge::new(FieldbusConfig::load(CONFIG_FILE))
    }

    pub fn config(&self) -> &FieldbusConfig {
        &self.config
    }

    pub fn set_config(&mut self, mut config: FieldbusConfig) {
        config.clamp();
        self.coil_shadow = vec![false; config.num_outputs as usize];
        self.register_shadow = vec![0; config.num_analog_outputs as usize];
        self.config = config;
    }

    pub fn save_config(&self) -> io::Result<()> {
        self.config.save(CONFIG_FILE)
    }

    /// Open the Modbus/TCP connection from the current config.
    pub fn connect(&mut self) -> bool {
        self.disconnect();

        let addr_text = format!("{}:{}", self.config.ip, self.config.port);
        let addr: SocketAddr = match addr_text.parse() {
            Ok(addr) => addr,
            Err(source) => {
                self.last_error = Some(
                    Error::Address {
                        addr: addr_text,
                        source,
                    }
                    .to_string(),
                );
                return false;
            }
        };

        match TcpTransport::connect(addr, self.config.slave_id) {
            Ok(transport) => {
                info!(%addr, slave = self.config.slave_id, "fieldbus connected");
                self.attach(Box::new(transport));
                true
            }
            Err(e) => {
                self.last_error = Some(format!("connection failed: {e}"));
                false
            }
        }
    }

    /// Attach an already-open transport (mock, alternative wire)
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
        self.last_error = None;
        self.coil_shadow = vec![false; self.config.num_outputs as usize];
        self.register_shadow = vec![0; self.config.num_analog_outputs as usize];
    }

    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!("fieldbus disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// One exchange pass. A disconnected bridge is a no-op.
    pub fn sync(&mut self, engine: &mut Engine) {
        if self.transport.is_none() {
            return;
        }
        if let Err(e) = self.sync_exchange(engine) {
            warn!("fieldbus sync failed: {e}");
            self.last_error = Some(e.to_string());
        }
    }

    fn sync_exchange(&mut self, engine: &mut Engine) -> io::Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };

        // device inputs -> staged INPUT_i
        let bits = transport.read_discrete_inputs(0, self.config.num_inputs)?;
        for i in 0..self.config.num_inputs as usize {
            let bit = bits.get(i).copied().unwrap_or(false);
            engine.set_signal(&format!("INPUT_{i}"), bit);
        }

        // committed OUTPUT_i -> coils, only when the image changed
        let coils: Vec<bool> = (0..self.config.num_outputs as usize)
            .map(|i| engine.committed_level(&format!("OUTPUT_{i}")) != 0)
            .collect();
        if coils != self.coil_shadow {
            transport.write_coils(0, &coils)?;
            self.coil_shadow = coils;
        }

        // device registers -> staged AINPUT_i (low 8 bits are significant)
        if self.config.num_analog_inputs > 0 {
            let registers = transport.read_input_registers(0, self.config.num_analog_inputs)?;
            for i in 0..self.config.num_analog_inputs as usize {
                let level = registers.get(i).copied().unwrap_or(0);
                engine.set_analog(&format!("AINPUT_{i}"), (level & 0xFF) as u8);
            }
        }

        // committed AOUTPUT_i -> holding registers on change
        if self.config.num_analog_outputs > 0 {
            let registers: Vec<u16> = (0..self.config.num_analog_outputs as usize)
                .map(|i| u16::from(engine.committed_level(&format!("AOUTPUT_{i}"))))
                .collect();
            if registers != self.register_shadow {
                transport.write_holding_registers(0, &registers)?;
                self.register_shadow = registers;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use rung_dsl::parse_source;

    fn test_config() -> FieldbusConfig {
        FieldbusConfig {
            num_inputs: 2,
            num_outputs: 2,
            num_analog_inputs: 1,
            num_analog_outputs: 1,
            ..FieldbusConfig::default()
        }
    }

    fn test_engine() -> Engine {
        let source = "IN INPUT_0, INPUT_1\nOUT OUTPUT_0, OUTPUT_1\n\
                      AIN AINPUT_0\nAOUT AOUTPUT_0\n\
                      OR g(INPUT_0, INPUT_1) -> OUTPUT_0\n\
                      GT hot(AINPUT_0, 100) -> OUTPUT_1\n";
        Engine::new(parse_source(source).unwrap())
    }

    fn scan(engine: &mut Engine) {
        engine.update(1.0, 1.0, true, false);
    }

    #[test]
    fn test_disconnected_bridge_is_a_noop() {
        let mut bridge = FieldbusBridge::new(test_config());
        let mut engine = test_engine();
        bridge.sync(&mut engine);
        assert!(!bridge.is_connected());
        assert!(bridge.last_error().is_none());
    }

    #[test]
    fn test_inputs_are_staged_then_committed() {
        let mut bridge = FieldbusBridge::new(test_config());
        let mock = MockTransport::new();
        let device = mock.device();
        bridge.attach(Box::new(mock));

        device.borrow_mut().discrete_inputs = vec![true, false];
        let mut engine = test_engine();
        bridge.sync(&mut engine);

        // staged but not yet committed
        assert!(engine.signal_value("INPUT_0"));
        let id = engine.program().signal("INPUT_0").unwrap();
        assert_eq!(engine.signals()[id.index()], 0);

        scan(&mut engine);
        assert_eq!(engine.signals()[id.index()], 1);
        assert!(engine.signal_value("OUTPUT_0"));
    }

    #[test]
    fn test_coils_write_only_on_change() {
        let mut bridge = FieldbusBridge::new(test_config());
        let mock = MockTransport::new();
        let device = mock.device();
        bridge.attach(Box::new(mock));
        let mut engine = test_engine();

        // all outputs low, same as the shadow: nothing on the wire
        bridge.sync(&mut engine);
        assert!(device.borrow().coils_written.is_empty());

        device.borrow_mut().discrete_inputs = vec![true, false];
        bridge.sync(&mut engine);
        scan(&mut engine);

        bridge.sync(&mut engine);
        assert_eq!(device.borrow().coils_written, vec![vec![true, false]]);

        // unchanged image: no second write
        bridge.sync(&mut engine);
        assert_eq!(device.borrow().coils_written.len(), 1);
    }

    #[test]
    fn test_analog_registers_use_low_byte() {
        let mut bridge = FieldbusBridge::new(test_config());
        let mock = MockTransport::new();
        let device = mock.device();
        bridge.attach(Box::new(mock));
        let mut engine = test_engine();

        device.borrow_mut().input_registers = vec![0x01FF];
        bridge.sync(&mut engine);
        scan(&mut engine);
        assert_eq!(engine.analog_value("AINPUT_0"), 0xFF);
        // 255 > 100, the comparator sees the low byte
        assert!(engine.signal_value("OUTPUT_1"));
    }

    #[test]
    fn test_analog_outputs_write_on_change() {
        let mut bridge = FieldbusBridge::new(test_config());
        let mock = MockTransport::new();
        let device = mock.device();
        bridge.attach(Box::new(mock));
        let mut engine = test_engine();

        engine.set_analog("AOUTPUT_0", 42);
        scan(&mut engine);
        bridge.sync(&mut engine);
        assert_eq!(device.borrow().registers_written, vec![vec![42]]);

        bridge.sync(&mut engine);
        assert_eq!(device.borrow().registers_written.len(), 1);
    }

    #[test]
    fn test_transport_failure_sets_last_error_and_scan_continues() {
        let mut bridge = FieldbusBridge::new(test_config());
        let mock = MockTransport::new();
        let device = mock.device();
        bridge.attach(Box::new(mock));
        let mut engine = test_engine();

        device.borrow_mut().fail = true;
        bridge.sync(&mut engine);
        assert!(bridge.last_error().unwrap().contains("mock transport down"));

        scan(&mut engine);
        assert!(engine.is_valid());

        // recovery clears the failure on the next pass
        device.borrow_mut().fail = false;
        device.borrow_mut().discrete_inputs = vec![true, true];
        bridge.sync(&mut engine);
        scan(&mut engine);
        assert!(engine.signal_value("OUTPUT_0"));
    }
}
