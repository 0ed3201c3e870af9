//! Device configuration types
//!
//! This module defines the settings needed to open a session with the
//! adapter: the serial port, the CAN bus speed and how the receive loop is
//! paced. Everything here is validated before any transport activity.

use crate::types::{DecoderError, FrameKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported CAN bus speeds and their device codes
///
/// These codes were reverse-engineered from the vendor tool and have no
/// public specification.
const SPEED_TABLE: [(u32, u8); 12] = [
    (5, 0x0C),
    (10, 0x0B),
    (20, 0x0A),
    (50, 0x09),
    (100, 0x08),
    (125, 0x07),
    (200, 0x06),
    (250, 0x05),
    (400, 0x04),
    (500, 0x03),
    (800, 0x02),
    (1024, 0x01),
];

/// A CAN bus speed the adapter can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusSpeed {
    kbps: u32,
    code: u8,
}

impl BusSpeed {
    /// Look up a speed in kbps
    ///
    /// Anything outside the enumerated set is rejected.
    pub fn from_kbps(kbps: u32) -> Result<Self> {
        SPEED_TABLE
            .iter()
            .find(|(rate, _)| *rate == kbps)
            .map(|&(kbps, code)| BusSpeed { kbps, code })
            .ok_or(DecoderError::UnsupportedSpeed(kbps))
    }

    /// Speed in kbps
    pub fn kbps(&self) -> u32 {
        self.kbps
    }

    /// Device code sent in the configuration command
    pub fn code(&self) -> u8 {
        self.code
    }

    /// All supported speeds in kbps, ascending
    pub fn supported_kbps() -> impl Iterator<Item = u32> {
        SPEED_TABLE.iter().map(|(rate, _)| *rate)
    }
}

impl fmt::Display for BusSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps", self.kbps)
    }
}

/// Operating mode byte of the configuration command
///
/// Loopback is accepted by the device but is not offered to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum OperatingMode {
    #[default]
    Normal,
    #[allow(dead_code)]
    Loopback,
}

impl OperatingMode {
    pub(crate) fn code(self) -> u8 {
        match self {
            OperatingMode::Normal => 0x00,
            OperatingMode::Loopback => 0x01,
        }
    }
}

/// Configuration for one adapter session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM5")
    #[serde(default = "default_port")]
    pub port: String,

    /// CAN bus speed in kbps
    #[serde(default = "default_speed")]
    pub can_speed_kbps: u32,

    /// Must stay true: only extended frames can be transmitted
    #[serde(default = "default_true")]
    pub use_extended_frame: bool,

    /// Baud rate of the USB-serial bridge
    #[serde(default = "default_serial_baud")]
    pub serial_baud: u32,

    /// Maximum bytes consumed per receive call
    #[serde(default = "default_poll_byte_budget")]
    pub poll_byte_budget: usize,

    /// Receive cadence for polling front ends, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_port() -> String {
    if cfg!(windows) {
        "COM5".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

fn default_speed() -> u32 {
    1024
}

fn default_true() -> bool {
    true
}

fn default_serial_baud() -> u32 {
    115_200
}

fn default_poll_byte_budget() -> usize {
    4096
}

fn default_poll_interval() -> u64 {
    20
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            can_speed_kbps: default_speed(),
            use_extended_frame: true,
            serial_baud: default_serial_baud(),
            poll_byte_budget: default_poll_byte_budget(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl DeviceConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the serial port
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// Builder method: set the CAN bus speed
    pub fn with_speed_kbps(mut self, kbps: u32) -> Self {
        self.can_speed_kbps = kbps;
        self
    }

    /// Builder method: select extended or standard frames
    pub fn with_extended_frame(mut self, enabled: bool) -> Self {
        self.use_extended_frame = enabled;
        self
    }

    /// Builder method: set the serial baud rate
    pub fn with_serial_baud(mut self, baud: u32) -> Self {
        self.serial_baud = baud;
        self
    }

    /// Builder method: set the per-call receive byte budget
    pub fn with_poll_byte_budget(mut self, budget: usize) -> Self {
        self.poll_byte_budget = budget;
        self
    }

    /// Builder method: set the receive cadence
    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    /// Resolve the configured bus speed
    pub fn bus_speed(&self) -> Result<BusSpeed> {
        BusSpeed::from_kbps(self.can_speed_kbps)
    }

    /// Frame kind used for transmission
    pub fn frame_kind(&self) -> FrameKind {
        if self.use_extended_frame {
            FrameKind::Extended
        } else {
            FrameKind::Standard
        }
    }

    /// Check every setting; called before any transport activity
    pub fn validate(&self) -> Result<()> {
        self.bus_speed()?;
        if !self.use_extended_frame {
            return Err(DecoderError::StandardFrameTransmit);
        }
        if self.port.trim().is_empty() {
            return Err(DecoderError::InvalidConfig("serial port is empty".to_string()));
        }
        if self.serial_baud == 0 {
            return Err(DecoderError::InvalidConfig("serial baud rate must be non-zero".to_string()));
        }
        if self.poll_byte_budget == 0 {
            return Err(DecoderError::InvalidConfig("poll byte budget must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_table() {
        assert_eq!(BusSpeed::from_kbps(5).unwrap().code(), 0x0C);
        assert_eq!(BusSpeed::from_kbps(250).unwrap().code(), 0x05);
        assert_eq!(BusSpeed::from_kbps(500).unwrap().code(), 0x03);
        assert_eq!(BusSpeed::from_kbps(1024).unwrap().code(), 0x01);
        assert_eq!(BusSpeed::supported_kbps().count(), 12);
    }

    #[test]
    fn test_unsupported_speed() {
        for kbps in [0, 1, 83, 1000, 2048] {
            assert!(matches!(
                BusSpeed::from_kbps(kbps),
                Err(DecoderError::UnsupportedSpeed(k)) if k == kbps
            ));
        }
    }

    #[test]
    fn test_device_config_builder() {
        let config = DeviceConfig::new()
            .with_port("/dev/ttyUSB1")
            .with_speed_kbps(250)
            .with_serial_baud(2_000_000)
            .with_poll_byte_budget(512)
            .with_poll_interval_ms(10);

        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.bus_speed().unwrap().kbps(), 250);
        assert_eq!(config.frame_kind(), FrameKind::Extended);
        assert_eq!(config.poll_byte_budget, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_standard_frames() {
        let config = DeviceConfig::new().with_extended_frame(false);
        assert!(matches!(config.validate(), Err(DecoderError::StandardFrameTransmit)));
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = DeviceConfig::new().with_poll_byte_budget(0);
        assert!(matches!(config.validate(), Err(DecoderError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let config: DeviceConfig = serde_json::from_str(r#"{"port": "COM7"}"#).unwrap();
        assert_eq!(config.port, "COM7");
        assert_eq!(config.can_speed_kbps, 1024);
        assert!(config.use_extended_frame);
        assert_eq!(config.serial_baud, 115_200);
        assert_eq!(config.poll_interval_ms, 20);
    }
}
