//! Device configuration command
//!
//! Sent exactly once after the transport is opened, before any data frame.
//!
//! | Offset | Value             | Meaning                       |
//! |--------|-------------------|-------------------------------|
//! | 0      | `AA`              | sync                          |
//! | 1      | `55`              | configure command             |
//! | 2      | `12`              | vendor constant               |
//! | 3      | speed code        | see `BusSpeed`                |
//! | 4      | `02`              | extended frame type           |
//! | 5..13  | `00` x 8          | filter and mask (unsupported) |
//! | 13     | mode              | `00` normal, `01` loopback    |
//! | 14..18 | `01 00 00 00`     | vendor constants              |
//! | 18     | checksum          | sum of bytes 0..18 mod 255    |

use super::{CMD_CONFIGURE, SYNC_BYTE};
use crate::config::{BusSpeed, OperatingMode};

/// Total length of the configuration command
pub const CONFIG_COMMAND_LEN: usize = 19;

const VENDOR_BYTE: u8 = 0x12;
const FRAME_TYPE_EXTENDED: u8 = 0x02;
const TRAILING_CONSTANTS: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Builder for the one-time configuration command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigCommand {
    speed: BusSpeed,
    mode: OperatingMode,
}

impl ConfigCommand {
    /// Configuration for normal operation at the given speed
    pub fn new(speed: BusSpeed) -> Self {
        Self {
            speed,
            mode: OperatingMode::Normal,
        }
    }

    #[allow(dead_code)]
    pub(crate) fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bus speed this command selects
    pub fn speed(&self) -> BusSpeed {
        self.speed
    }

    /// Serialize the command, checksum included
    pub fn to_bytes(&self) -> [u8; CONFIG_COMMAND_LEN] {
        let mut bytes = [0u8; CONFIG_COMMAND_LEN];
        bytes[0] = SYNC_BYTE;
        bytes[1] = CMD_CONFIGURE;
        bytes[2] = VENDOR_BYTE;
        bytes[3] = self.speed.code();
        bytes[4] = FRAME_TYPE_EXTENDED;
        // bytes[5..13] stay zero: no hardware filter or mask
        bytes[13] = self.mode.code();
        bytes[14..18].copy_from_slice(&TRAILING_CONSTANTS);
        bytes[18] = checksum(&bytes[..18]);
        bytes
    }
}

/// Sum of all bytes modulo 255
pub fn checksum(bytes: &[u8]) -> u8 {
    (bytes.iter().map(|&b| b as u32).sum::<u32>() % 255) as u8
}
