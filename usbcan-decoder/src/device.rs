//! Adapter session management
//!
//! A [`DeviceInterface`] exclusively owns one transport together with the
//! decoder and encoder for it. All receive state lives in the instance and
//! is rebuilt on every `open()`, so two interfaces never share buffers,
//! counters or timestamps.
//!
//! The model is single-threaded and poll-driven: a periodic caller invokes
//! [`DeviceInterface::receive`] every few tens of milliseconds. Sending is
//! synchronous and happens on the same thread, so it never interleaves with
//! receiving.

use crate::config::DeviceConfig;
use crate::protocol::{ConfigCommand, FrameDecoder, FrameEncoder};
use crate::transport::{ByteTransport, SerialTransport};
use crate::types::{DecoderError, Frame, Result, Timestamp};

/// One connection to a USB-CAN Analyzer adapter
pub struct DeviceInterface<T: ByteTransport> {
    transport: T,
    config_command: ConfigCommand,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
    poll_byte_budget: usize,
    read_buf: Vec<u8>,
}

impl DeviceInterface<SerialTransport> {
    /// Create an interface for the serial port named in the configuration
    ///
    /// The port is not opened; call [`DeviceInterface::open`].
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        let transport = SerialTransport::new(config.port.clone(), config.serial_baud);
        Self::new(transport, config)
    }
}

impl<T: ByteTransport> DeviceInterface<T> {
    /// Create an interface over an existing transport
    ///
    /// # Errors
    /// Configuration errors (unsupported speed, standard frames) are returned
    /// before the transport is touched.
    pub fn new(transport: T, config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        let speed = config.bus_speed()?;
        let encoder = FrameEncoder::new(config.frame_kind())?;

        log::debug!("Device interface configured for {}", speed);

        Ok(Self {
            transport,
            config_command: ConfigCommand::new(speed),
            decoder: FrameDecoder::new(),
            encoder,
            poll_byte_budget: config.poll_byte_budget,
            read_buf: vec![0; config.poll_byte_budget],
        })
    }

    /// Replace the time source used to stamp received frames
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.decoder = FrameDecoder::with_clock(clock);
        self
    }

    /// Open the transport, reset receive state and configure the adapter
    ///
    /// The configuration command is the first thing written after opening.
    /// Opening an already open interface does nothing.
    pub fn open(&mut self) -> Result<()> {
        if self.transport.is_open() {
            log::warn!("Device already open");
            return Ok(());
        }

        self.transport.open()?;
        self.decoder.start_session();

        let command = self.config_command.to_bytes();
        if let Err(e) = self.transport.write_all(&command) {
            if let Err(close_err) = self.transport.close() {
                log::warn!("Failed to close transport after configure error: {}", close_err);
            }
            return Err(e);
        }

        log::info!("Device configured for {}", self.config_command.speed());
        Ok(())
    }

    /// Close the transport; closing twice is harmless
    pub fn close(&mut self) -> Result<()> {
        if self.transport.is_open() {
            log::info!(
                "Closing device after {} frames ({} framing errors)",
                self.decoder.frames_decoded(),
                self.decoder.framing_errors()
            );
        }
        self.transport.close()
    }

    /// Check whether the transport is open
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Decode whatever bytes are currently available
    ///
    /// Never blocks on an incomplete frame. At most `poll_byte_budget` bytes
    /// are consumed per call; the rest stay queued in the transport.
    pub fn receive(&mut self) -> Result<Vec<Frame>> {
        if !self.transport.is_open() {
            return Err(DecoderError::NotOpen);
        }

        let available = self.transport.bytes_available()?;
        let to_read = available.min(self.poll_byte_budget);
        if to_read == 0 {
            return Ok(Vec::new());
        }

        let count = self.transport.read(&mut self.read_buf[..to_read])?;
        Ok(self.decoder.poll(&self.read_buf[..count]))
    }

    /// Transmit an extended frame
    ///
    /// `identifier` must be exactly 4 bytes, most significant first. Rejected
    /// frames are never written to the transport.
    pub fn send(&mut self, identifier: &[u8], payload: &[u8]) -> Result<()> {
        let wire = self.encoder.encode(identifier, payload)?;
        self.write_frame(&wire)
    }

    /// Transmit an extended frame with a numeric identifier
    pub fn send_extended(&mut self, identifier: u32, payload: &[u8]) -> Result<()> {
        let wire = self.encoder.encode_extended(identifier, payload)?;
        self.write_frame(&wire)
    }

    fn write_frame(&mut self, wire: &[u8]) -> Result<()> {
        if !self.transport.is_open() {
            return Err(DecoderError::NotOpen);
        }
        log::debug!("Sending {} bytes: {:02X?}", wire.len(), wire);
        self.transport.write_all(wire)
    }

    /// Receive-side decoder (for statistics)
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Configuration command written on open
    pub fn config_command(&self) -> &ConfigCommand {
        &self.config_command
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_rejects_bad_speed_before_opening() {
        let config = DeviceConfig::new().with_speed_kbps(333);
        assert!(matches!(
            DeviceInterface::from_config(&config),
            Err(DecoderError::UnsupportedSpeed(333))
        ));
    }

    #[test]
    fn test_from_config_rejects_standard_frames() {
        let config = DeviceConfig::new().with_extended_frame(false);
        assert!(matches!(
            DeviceInterface::from_config(&config),
            Err(DecoderError::StandardFrameTransmit)
        ));
    }

    #[test]
    fn test_closed_serial_interface() {
        let config = DeviceConfig::new().with_port("/dev/usbcan-missing-port").with_speed_kbps(500);
        let mut device = DeviceInterface::from_config(&config).unwrap();
        assert!(!device.is_open());
        assert!(matches!(device.receive(), Err(DecoderError::NotOpen)));
        assert!(device.close().is_ok());
        assert!(device.close().is_ok());
        assert_eq!(device.config_command().speed().kbps(), 500);
    }
}
