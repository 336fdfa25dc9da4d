use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::DeviceFilter;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between device/adapter polls.
    pub refresh_interval: u64,
    pub pairing_delay_ms: u64,
    pub disconnect_delay_ms: u64,
    /// 0 waits for the operator indefinitely.
    pub pairing_timeout_secs: u64,

    pub auto_trust_on_pair: bool,
    pub auto_start_scanning: bool,

    pub hide_unnamed_devices: bool,
    pub min_rssi_threshold: i16,
    pub battery_high_threshold: u8,
    pub battery_low_threshold: u8,

    pub show_emojis: bool,
    pub show_rssi: bool,
    pub show_battery: bool,
    pub show_device_address: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: 2,
            pairing_delay_ms: 1000,
            disconnect_delay_ms: 500,
            pairing_timeout_secs: 60,
            auto_trust_on_pair: true,
            auto_start_scanning: true,
            hide_unnamed_devices: false,
            min_rssi_threshold: -100,
            battery_high_threshold: 60,
            battery_low_threshold: 30,
            show_emojis: true,
            show_rssi: true,
            show_battery: true,
            show_device_address: true,
        }
    }
}

impl Config {
    /// Reads `path`, writing a default file there if none exists yet.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                // Create default config if not found
                if let Err(e) = config.save(path) {
                    tracing::warn!("Could not write default config to {}: {}", path.display(), e);
                }
                Ok(config)
            }
            Err(e) => Err(Error::Config(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&mut self) {
        self.refresh_interval = self.refresh_interval.clamp(1, 10);
        self.battery_high_threshold = self.battery_high_threshold.min(100);
        self.battery_low_threshold = self.battery_low_threshold.min(100);
        if self.battery_low_threshold > self.battery_high_threshold {
            std::mem::swap(&mut self.battery_low_threshold, &mut self.battery_high_threshold);
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn pairing_delay(&self) -> Duration {
        Duration::from_millis(self.pairing_delay_ms)
    }

    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_delay_ms)
    }

    pub fn pairing_timeout(&self) -> Option<Duration> {
        (self.pairing_timeout_secs > 0).then(|| Duration::from_secs(self.pairing_timeout_secs))
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter {
            hide_unnamed: self.hide_unnamed_devices,
            min_rssi: self.min_rssi_threshold,
        }
    }

    /// `$XDG_CONFIG_HOME/kyanos/config.toml`, falling back to `~/.config`.
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(std::env::temp_dir);
        base.join("kyanos").join("config.toml")
    }
}
