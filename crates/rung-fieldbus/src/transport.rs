//! Transport seam between the bridge and the wire.
//!
//! The real implementation is a blocking Modbus/TCP client; the mock serves
//! tests and demo setups without a device on the network.

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio_modbus::client::sync::{self, Context, Reader, Writer};
use tokio_modbus::prelude::Slave;

use crate::Error;

/// Blocking Modbus data access used by one sync pass
pub trait Transport {
    fn read_discrete_inputs(&mut self, addr: u16, count: u16) -> io::Result<Vec<bool>>;
    fn write_coils(&mut self, addr: u16, coils: &[bool]) -> io::Result<()>;
    fn read_input_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>>;
    fn write_holding_registers(&mut self, addr: u16, registers: &[u16]) -> io::Result<()>;
}

/// Modbus/TCP master over the tokio-modbus sync client.
///
/// Blocking is acceptable here: the bridge runs between scans in the driver
/// loop and a transport error only marks `last_error`.
pub struct TcpTransport {
    ctx: Context,
}

impl TcpTransport {
    pub fn connect(addr: SocketAddr, slave_id: u8) -> Result<TcpTransport, Error> {
        let ctx = sync::tcp::connect_slave(addr, Slave(slave_id))?;
        Ok(TcpTransport { ctx })
    }
}

impl Transport for TcpTransport {
    fn read_discrete_inputs(&mut self, addr: u16, count: u16) -> io::Result<Vec<bool>> {
        self.ctx.read_discrete_inputs(addr, count)
    }

    fn write_coils(&mut self, addr: u16, coils: &[bool]) -> io::Result<()> {
        self.ctx.write_multiple_coils(addr, coils)
    }

    fn read_input_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>> {
        self.ctx.read_input_registers(addr, count)
    }

    fn write_holding_registers(&mut self, addr: u16, registers: &[u16]) -> io::Result<()> {
        self.ctx.write_multiple_registers(addr, registers)
    }
}

/// Device image served by [`MockTransport`].
///
/// Reads serve the `discrete_inputs`/`input_registers` images, padded with
/// zeros; writes append to the `coils_written`/`registers_written` logs.
/// Set `fail` to make every call return a broken-pipe error.
#[derive(Debug, Default)]
pub struct MockDevice {
    pub discrete_inputs: Vec<bool>,
    pub input_registers: Vec<u16>,
    pub coils_written: Vec<Vec<bool>>,
    pub registers_written: Vec<Vec<u16>>,
    pub fail: bool,
}

/// In-memory transport for tests and deviceless demos.
///
/// The device state is shared, so a caller can keep a handle to poke inputs
/// and inspect writes after the bridge takes ownership of the transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    device: Rc<RefCell<MockDevice>>,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport::default()
    }

    /// Shared handle to the device image
    pub fn device(&self) -> Rc<RefCell<MockDevice>> {
        Rc::clone(&self.device)
    }
}

impl Transport for MockTransport {
    fn read_discrete_inputs(&mut self, addr: u16, count: u16) -> io::Result<Vec<bool>> {
        let device = self.device.borrow();
        device.check()?;
        let start = addr as usize;
        Ok((start..start + count as usize)
            .map(|i| device.discrete_inputs.get(i).copied().unwrap_or(false))
            .collect())
    }

    fn write_coils(&mut self, _addr: u16, coils: &[bool]) -> io::Result<()> {
        let mut device = self.device.borrow_mut();
        device.check()?;
        device.coils_written.push(coils.to_vec());
        Ok(())
    }

    fn read_input_registers(&mut self, addr: u16, count: u16) -> io::Result<Vec<u16>> {
        let device = self.device.borrow();
        device.check()?;
        let start = addr as usize;
        Ok((start..start + count as usize)
            .map(|i| device.input_registers.get(i).copied().unwrap_or(0))
            .collect())
    }

    fn write_holding_registers(&mut self, _addr: u16, registers: &[u16]) -> io::Result<()> {
        let mut device = self.device.borrow_mut();
        device.check()?;
        device.registers_written.push(registers.to_vec());
        Ok(())
    }
}

impl MockDevice {
    fn check(&self) -> io::Result<()> {
        if self.fail {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock transport down"))
        } else {
            Ok(())
        }
    }
}
