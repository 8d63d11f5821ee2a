//! Bridge configuration, persisted as plain `key=value` lines.
//!
//! Missing file means defaults; unknown keys and malformed values are
//! ignored. I/O counts outside their legal ranges are clamped silently.

use std::fs;
use std::io;
use std::path::Path;

/// Config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "modbus_config.txt";

/// Legal range for discrete I/O counts
const DISCRETE_RANGE: (u16, u16) = (1, 512);
/// Legal range for analog I/O counts
const ANALOG_RANGE: (u16, u16) = (0, 128);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldbusConfig {
    pub ip: String,
    pub port: u16,
    pub slave_id: u8,
    pub num_inputs: u16,
    pub num_outputs: u16,
    pub num_analog_inputs: u16,
    pub num_analog_outputs: u16,
}

impl Default for FieldbusConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 502,
            slave_id: 1,
            num_inputs: 8,
            num_outputs: 8,
            num_analog_inputs: 0,
            num_analog_outputs: 0,
        }
    }
}

impl FieldbusConfig {
    /// Load from `path`. A missing or unreadable file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> FieldbusConfig {
        let mut config = FieldbusConfig::default();
        let Ok(text) = fs::read_to_string(path) else {
            return config;
        };

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "ip" => config.ip = value.to_string(),
                "port" => {
                    if let Ok(v) = value.parse() {
                        config.port = v;
                    }
                }
                "slave_id" => {
                    if let Ok(v) = value.parse() {
                        config.slave_id = v;
                    }
                }
                "num_inputs" => {
                    if let Ok(v) = value.parse() {
                        config.num_inputs = v;
                    }
                }
                "num_outputs" => {
                    if let Ok(v) = value.parse() {
                        config.num_outputs = v;
                    }
                }
                "num_analog_inputs" => {
                    if let Ok(v) = value.parse() {
                        config.num_analog_inputs = v;
                    }
                }
                "num_analog_outputs" => {
                    if let Ok(v) = value.parse() {
                        config.num_analog_outputs = v;
                    }
                }
                _ => {}
            }
        }

        config.clamp();
        config
    }

    /// Write newline-terminated `key=value` lines to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let text = format!(
            "ip={}\nport={}\nslave_id={}\nnum_inputs={}\nnum_outputs={}\n\
             num_analog_inputs={}\nnum_analog_outputs={}\n",
            self.ip,
            self.port,
            self.slave_id,
            self.num_inputs,
            self.num_outputs,
            self.num_analog_inputs,
            self.num_analog_outputs,
        );
        fs::write(path, text)
    }

    /// Force I/O counts into their legal ranges.
    pub fn clamp(&mut self) {
        self.num_inputs = self.num_inputs.clamp(DISCRETE_RANGE.0, DISCRETE_RANGE.1);
        self.num_outputs = self.num_outputs.clamp(DISCRETE_RANGE.0, DISCRETE_RANGE.1);
        self.num_analog_inputs = self.num_analog_inputs.clamp(ANALOG_RANGE.0, ANALOG_RANGE.1);
        self.num_analog_outputs = self
            .num_analog_outputs
            .clamp(ANALOG_RANGE.0, ANALOG_RANGE.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_defaults() {
        let config = FieldbusConfig::load("/nonexistent/modbus_config.txt");
        assert_eq!(config, FieldbusConfig::default());
        assert_eq!(config.ip, "127.0.0.1");
        assert_eq!(config.port, 502);
        assert_eq!(config.slave_id, 1);
        assert_eq!(config.num_inputs, 8);
        assert_eq!(config.num_analog_inputs, 0);
    }

    #[test]
    fn test_round_trip() {
        let dir = std::env::temp_dir().join("rung-fieldbus-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);

        let config = FieldbusConfig {
            ip: "10.0.0.7".to_string(),
            port: 1502,
            slave_id: 3,
            num_inputs: 16,
            num_outputs: 4,
            num_analog_inputs: 2,
            num_analog_outputs: 1,
        };
        config.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("ip=10.0.0.7"));
        assert!(text.contains("num_analog_inputs=2"));

        assert_eq!(FieldbusConfig::load(&path), config);
    }

    #[test]
    fn test_out_of_range_counts_are_clamped() {
        let dir = std::env::temp_dir().join("rung-fieldbus-clamp-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(
            &path,
            "num_inputs=0\nnum_outputs=9999\nnum_analog_inputs=500\nnum_analog_outputs=0\n",
        )
        .unwrap();

        let config = FieldbusConfig::load(&path);
        assert_eq!(config.num_inputs, 1);
        assert_eq!(config.num_outputs, 512);
        assert_eq!(config.num_analog_inputs, 128);
        assert_eq!(config.num_analog_outputs, 0);
    }

    #[test]
    fn test_unknown_keys_and_garbage_are_ignored() {
        let dir = std::env::temp_dir().join("rung-fieldbus-garbage-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, "nonsense\nmystery_key=5\nport=not-a-number\nip=192.168.0.9\n").unwrap();

        let config = FieldbusConfig::load(&path);
        assert_eq!(config.ip, "192.168.0.9");
        assert_eq!(config.port, 502);
    }
}
