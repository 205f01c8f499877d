//! Core configuration
//!
//! Loaded from a JSON file in the same camelCase shape the frontends use, with
//! a couple of environment overrides for quick experiments.

use crate::export::DEFAULT_FILENAME_PREFIX;
use crate::playback::FormatCandidates;
use crate::relay::RelayEncoding;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the slicing interval (milliseconds)
pub const ENV_SLICE_MS: &str = "SCREEN_RELAY_SLICE_MS";

/// Environment variable overriding the relay encoding
pub const ENV_RELAY_ENCODING: &str = "SCREEN_RELAY_RELAY_ENCODING";

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeConfig {
    /// Give up if decoding shows no progress within this window
    pub initial_timeout_ms: u64,
    /// Give up if progress stops for this long
    pub stall_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: 5_000,
            stall_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub encoding: RelayEncoding,
    /// Requests buffered in front of the relay host
    pub queue_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            encoding: RelayEncoding::Transfer,
            queue_depth: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    pub filename_prefix: String,
    /// Where the file download target writes
    pub download_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
            download_dir: None,
        }
    }
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Duration of each emitted segment
    pub slice_interval_ms: u64,
    /// Declaration used when the device does not report one
    pub declared_type: String,
    pub probe: ProbeConfig,
    pub format_candidates: FormatCandidates,
    pub relay: RelayConfig,
    pub export: ExportConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            slice_interval_ms: 100,
            declared_type: "video/webm".to_string(),
            probe: ProbeConfig::default(),
            format_candidates: FormatCandidates::default(),
            relay: RelayConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Read a config file, apply environment overrides and validate
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_json(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SLICE_MS) {
            self.slice_interval_ms = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer, got {:?}", ENV_SLICE_MS, value))?;
        }

        if let Some(value) = lookup(ENV_RELAY_ENCODING) {
            self.relay.encoding = value
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {}", ENV_RELAY_ENCODING))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.slice_interval_ms == 0 {
            bail!("sliceIntervalMs must be greater than zero");
        }
        if self.declared_type.trim().is_empty() {
            bail!("declaredType must not be empty");
        }
        if self.probe.initial_timeout_ms == 0 {
            bail!("probe.initialTimeoutMs must be greater than zero");
        }
        if self.probe.stall_timeout_ms < self.probe.initial_timeout_ms {
            bail!("probe.stallTimeoutMs must not be shorter than probe.initialTimeoutMs");
        }
        if self.format_candidates.is_empty() {
            bail!("formatCandidates must list at least one media type");
        }
        Ok(())
    }

    pub fn slice_interval(&self) -> Duration {
        Duration::from_millis(self.slice_interval_ms)
    }

    pub fn initial_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.initial_timeout_ms)
    }

    pub fn stall_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.stall_timeout_ms)
    }
}
