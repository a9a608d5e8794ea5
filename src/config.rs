use anyhow::Error;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    #[clap(long)]
    pub conf: Option<String>,
    /// JSON scenario to replay through both controllers.
    #[clap(long)]
    pub scenario: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub timing: TimingConfig,
    pub screen: ScreenConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Quiet window applied to Active events; a later one restarts it.
    pub active_debounce_ms: u64,
    /// Delay before the first incoming-call ping.
    pub ping_warmup_ms: u64,
    pub ping_repeat_ms: u64,
    /// How long the ended-call view stays up.
    pub finish_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScreenConfig {
    /// Device blanks the screen by proximity, so the shade may stay enabled.
    pub proximity_sensor: bool,
    pub ping_auto_repeat: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            timing: TimingConfig::default(),
            screen: ScreenConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            active_debounce_ms: 1000,
            ping_warmup_ms: 250,
            ping_repeat_ms: 1200,
            finish_delay_ms: 500,
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            proximity_sensor: true,
            ping_auto_repeat: true,
        }
    }
}

impl TimingConfig {
    pub fn active_debounce(&self) -> Duration {
        Duration::from_millis(self.active_debounce_ms)
    }

    pub fn ping_warmup(&self) -> Duration {
        Duration::from_millis(self.ping_warmup_ms)
    }

    pub fn ping_repeat(&self) -> Duration {
        Duration::from_millis(self.ping_repeat_ms)
    }

    pub fn finish_delay(&self) -> Duration {
        Duration::from_millis(self.finish_delay_ms)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }
}
