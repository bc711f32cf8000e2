//! Relay configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{history::DEFAULT_HISTORY_CHARS, scanner::DEFAULT_MAX_PENDING_LINE};

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunables for interception, scanning and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Appended when a compose line that is not a relay command is forwarded.
    pub input_line_ending: String,
    /// Appended to every relayed command.
    pub dispatch_line_ending: String,
    /// Per-pane history cap, in chars.
    pub history_limit: usize,
    /// Longest output line, in bytes, the scanner buffers before discarding it.
    pub max_pending_line: usize,
    /// Dispatch log entries shown by `recent_logs`.
    pub recent_log_display: usize,
    /// Per-target write timeout; a timed-out write counts as failed.
    pub write_timeout_ms: Option<u64>,
    /// Ask before a manual send reaches more than one pane.
    pub confirm_multi_target: bool,
    /// Per-parent cap on stored dispatch logs. Unbounded when unset.
    pub log_retention: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            input_line_ending: "\r".to_string(),
            dispatch_line_ending: "\r".to_string(),
            history_limit: DEFAULT_HISTORY_CHARS,
            max_pending_line: DEFAULT_MAX_PENDING_LINE,
            recent_log_display: 5,
            write_timeout_ms: None,
            confirm_multi_target: true,
            log_retention: None,
        }
    }
}

impl RelayConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns error if the document is not valid TOML for this schema.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load from the default location, falling back to defaults when the
    /// file is missing or invalid.
    #[must_use]
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.is_file() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring relay config: {e}");
                Self::default()
            }
        }
    }

    /// `<config dir>/pane-relay/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pane-relay").join("config.toml"))
    }

    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}
