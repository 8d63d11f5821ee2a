//! Rung fieldbus bridge
//!
//! Modbus/TCP client that exchanges a program's external inputs and outputs
//! with a physical or simulated device. Reserved signal names (`INPUT_i`,
//! `OUTPUT_i`, `AINPUT_i`, `AOUTPUT_i`) are the contract between the program
//! and the device; everything else stays local to the simulator.

pub mod bridge;
pub mod config;
pub mod transport;

pub use bridge::FieldbusBridge;
pub use config::{FieldbusConfig, CONFIG_FILE};
pub use transport::{MockDevice, MockTransport, TcpTransport, Transport};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid address {addr}: {source}")]
    Address {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),
}
