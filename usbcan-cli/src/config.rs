//! Application configuration (usbcan.toml)
//!
//! ```toml
//! [device]
//! port = "/dev/ttyUSB0"
//! can_speed_kbps = 250
//!
//! [rules]
//! path = "rules.toml"
//! ```
//!
//! Every section is optional; command-line flags override file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use usbcan_decoder::DeviceConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    /// Rule table (.toml or .json); relative paths resolve against the config file
    pub path: Option<PathBuf>,
}

/// Device settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct DeviceOverrides {
    pub port: Option<String>,
    pub speed_kbps: Option<u32>,
    pub baud: Option<u32>,
}

impl AppConfig {
    /// Apply command-line overrides on top of the file values
    pub fn with_overrides(mut self, overrides: &DeviceOverrides) -> Self {
        if let Some(port) = &overrides.port {
            self.device.port = port.clone();
        }
        if let Some(kbps) = overrides.speed_kbps {
            self.device.can_speed_kbps = kbps;
        }
        if let Some(baud) = overrides.baud {
            self.device.serial_baud = baud;
        }
        self
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let (Some(rules), Some(base)) = (&config.rules.path, path.parent()) {
        if rules.is_relative() {
            config.rules.path = Some(base.join(rules));
        }
    }

    config
        .device
        .validate()
        .with_context(|| format!("Invalid [device] section in {:?}", path))?;

    Ok(config)
}
