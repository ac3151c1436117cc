// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use serde::Deserialize;

use crate::types::Sample;

pub const CONFIG_ENV: &str = "SERIAL_SCOPE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "serial-scope.json";

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryConfig {
    /// One reconnect attempt per viewer frame.
    EveryPoll,
    Backoff { initial_ms: u64, max_ms: u64 },
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::Backoff {
            initial_ms: 250,
            max_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScopeConfig {
    /// Matched against port name and USB descriptor strings.
    pub port_pattern: String,
    pub baud_rate: u32,
    pub window_len: usize,
    /// Upper bound on bytes taken from the link per read.
    pub read_chunk: usize,
    pub read_timeout_ms: u64,
    pub noise_threshold: Sample,
    pub filter_on_start: bool,
    pub full_scale_volts: f32,
    pub retry: RetryConfig,
    pub legacy_chunk_reset: bool,
    pub simulate: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            port_pattern: "USB-SERIAL CH340".to_owned(),
            baud_rate: 115_200,
            window_len: 250,
            read_chunk: 64,
            read_timeout_ms: 50,
            noise_threshold: 2,
            filter_on_start: false,
            full_scale_volts: 5.0,
            retry: RetryConfig::default(),
            legacy_chunk_reset: false,
            simulate: false,
        }
    }
}

impl ScopeConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ScopeConfig = serde_json::from_str(text).context("invalid config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// `$SERIAL_SCOPE_CONFIG`, then `./serial-scope.json`, then defaults.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            info!("loading config from {}", path.display());
            return Self::from_file(&path);
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            info!("loading config from {}", local.display());
            return Self::from_file(local);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_len == 0 {
            bail!("window_len must be at least 1");
        }
        if self.read_chunk == 0 {
            bail!("read_chunk must be at least 1");
        }
        // a zero timeout would turn the read loop into a spin
        if self.read_timeout_ms == 0 {
            bail!("read_timeout_ms must be greater than zero");
        }
        if let RetryConfig::Backoff { initial_ms, max_ms } = self.retry {
            if initial_ms > max_ms {
                bail!("retry initial_ms ({initial_ms}) exceeds max_ms ({max_ms})");
            }
        }
        Ok(())
    }
}
