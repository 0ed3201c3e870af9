//! Byte transport to the adapter
//!
//! The [`ByteTransport`] trait abstracts over the physical link. The adapter
//! enumerates as a CH340 USB-serial bridge, so the production implementation
//! is [`SerialTransport`]; tests drive the protocol through an in-memory
//! implementation instead.

use crate::types::{DecoderError, Result};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Poll-driven byte-level transport
///
/// Reads never wait for data that has not arrived: callers ask how many
/// bytes are available and read at most that many. Writes are synchronous.
pub trait ByteTransport {
    /// Open the underlying connection
    fn open(&mut self) -> Result<()>;

    /// Close the connection; closing a closed transport is a no-op
    fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently open
    fn is_open(&self) -> bool;

    /// Number of received bytes that can be read without blocking
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes, returning the count read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all bytes and flush them to the device
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

/// Serial port transport for the adapter's USB-serial bridge
///
/// The port is configured 8N1 without flow control.
pub struct SerialTransport {
    /// Port path for opening and logging
    port_name: String,
    /// Baud rate of the serial link
    baud_rate: u32,
    /// Open port handle
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Timeout for reads that were promised data by `bytes_available`
    const READ_TIMEOUT: Duration = Duration::from_millis(10);

    /// Create a closed transport for the given port
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            port: None,
        }
    }

    /// Port path this transport opens
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(DecoderError::NotOpen)
    }
}

impl ByteTransport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            log::debug!("Serial port {} already open", self.port_name);
            return Ok(());
        }

        let port = serialport::new(&self.port_name, self.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .timeout(Self::READ_TIMEOUT)
            .open()?;

        // Drop bytes queued before this session
        port.clear(ClearBuffer::All)?;

        log::info!("Opened serial port {} at {} baud", self.port_name, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            log::info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let count = self.port_mut()?.bytes_to_read()?;
        Ok(count as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port_mut()?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
