//! Engine configuration.
//!
//! All fields have working defaults; hosts typically only ever touch
//! `track_tail_updates`.
//!
//! # Example
//!
//! ```toml
//! track_tail_updates = true   # reconcile renders from overlapping cycles
//! deadline_ms = 100           # registration confirmation deadline
//! tail_poll_ms = 16           # reconciliation poll interval (one UI frame)
//! tail_poll_attempts = 5      # reconciliation poll bound
//! ```

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// EngineConfig
// =============================================================================

/// Hot-update engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// After a forced re-render, poll the generation counter and re-render
    /// once more when another update cycle ran in the meantime. Best-effort
    /// reconciliation for descendants reached through deferred code paths.
    pub track_tail_updates: bool,

    /// How long the export step may take before an unconfirmed registration
    /// is reported as a probable silent failure.
    pub deadline_ms: u64,

    /// Delay between reconciliation poll attempts.
    pub tail_poll_ms: u64,

    /// Hard bound on reconciliation poll attempts.
    pub tail_poll_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            track_tail_updates: true,
            deadline_ms: 100,
            tail_poll_ms: 16,
            tail_poll_attempts: 5,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml(&content)
    }

    /// Registration confirmation deadline.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Reconciliation poll interval.
    pub fn tail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tail_poll_ms)
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),
}

// =============================================================================
// Tests
// =============================================================================
