//! # Configuration Management
//!
//! This module handles loading and saving the clock configuration from the
//! bcp-clock.toml file. The file is re-read on every restart, so saving a new
//! configuration and letting the clock restart is how settings take effect.
//!
//! ## Thresholds
//!
//! The yellow and red countdown thresholds are written the way a tournament
//! organiser thinks about them, as clock times:
//!
//! ```toml
//! [timer]
//! yellow = "10:00"
//! red = "00:00"
//! ```
//!
//! `H:MM:SS` is accepted as well, and so is `.` as a separator (`05.00`).
//! In memory they are plain seconds.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, relative to the working directory
pub const CONFIG_FILE: &str = "bcp-clock.toml";

/// Application configuration loaded from bcp-clock.toml
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Which event to follow and where to ask about it
    pub event: EventConfig,
    /// Refresh cadence and countdown colors
    pub timer: TimerConfig,
    /// Device identity and local resources
    pub device: DeviceConfig,
}

/// Event data source configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventConfig {
    /// BCP event id, or an event URL copied from the browser
    pub id: String,
    /// Base URL of the BCP API
    pub api_base: String,
    /// Path of the round timer resource; `{id}` and `{round}` are substituted
    pub timer_path: String,
}

/// Timer configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Remaining seconds at or below which the countdown turns yellow
    #[serde(with = "clock_time")]
    pub yellow: i64,
    /// Remaining seconds at or below which the countdown turns red
    #[serde(with = "clock_time")]
    pub red: i64,
    /// Seconds between event data refreshes
    pub refresh_interval: u64,
    /// Seconds between countdown redraws
    pub countdown_interval: u64,
}

/// Device configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub hostname: String,
    /// Directory holding the `.bin` bitmap fonts
    pub font_dir: PathBuf,
}

impl Default for EventConfig {
    fn default() -> Self {
        EventConfig {
            id: "fsRXYbsuNaWX".to_string(),
            api_base: "https://newprod-api.bestcoastpairings.com".to_string(),
            timer_path: "/v1/events/{id}/timer?round={round}".to_string(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig {
            yellow: 10 * 60,
            red: 0,
            refresh_interval: 60,
            countdown_interval: 1,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            hostname: "bcp-timer".to_string(),
            font_dir: PathBuf::from("fonts"),
        }
    }
}

impl TimerConfig {
    /// Refresh period, never shorter than a second
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.max(1))
    }

    /// Countdown period, never shorter than a second
    pub fn countdown_period(&self) -> Duration {
        Duration::from_secs(self.countdown_interval.max(1))
    }
}

impl Config {
    /// Load configuration from bcp-clock.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!("Loaded configuration for event {}", config.event.id);
                    config
                }
                Err(e) => {
                    warn!("Invalid config file {}: {e}", path.display());
                    warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                info!(
                    "No config file at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Save current configuration to `path`
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Save current configuration to bcp-clock.toml
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(CONFIG_FILE)
    }
}

/// Parse `MM:SS` or `H:MM:SS` (`.` also accepted as separator) into seconds.
pub fn parse_clock_time(text: &str) -> Option<i64> {
    let normalized = text.trim().replace('.', ":");
    let parts = normalized
        .split(':')
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (h, m, s) = match parts[..] {
        [m, s] => (0, m, s),
        [h, m, s] => (h, m, s),
        _ => return None,
    };
    if s >= 60 || (parts.len() == 3 && m >= 60) {
        return None;
    }
    Some(i64::from(h) * 3600 + i64::from(m) * 60 + i64::from(s))
}

/// Format seconds as `MM:SS`, or `H:MM:SS` from an hour up.
pub fn format_clock_time(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

mod clock_time {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(seconds: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_clock_time(*seconds))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_clock_time(&text)
            .ok_or_else(|| D::Error::custom(format!("invalid time {text:?}, expected MM:SS")))
    }
}
