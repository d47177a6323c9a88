//! Configuration structures for the latency guard.
//!
//! Supports TOML deserialization. Every field has a default, and the
//! defaults reproduce the plain behaviour: zero latency on
//! `/dev/cpu_dma_latency`, released when the user presses enter.

use crate::error::{QosError, QosResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Kernel PM QOS device for the system-wide CPU latency constraint.
pub const DEFAULT_DEVICE: &str = "/dev/cpu_dma_latency";

/// Prompt printed while waiting for a line on stdin.
pub const ENTER_PROMPT: &str = "Press [enter] to restore";

/// Prompt printed while waiting for a termination signal.
pub const SIGNAL_PROMPT: &str = "Press Ctrl+C to restore";

/// Top-level guard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Path of the latency-control device.
    pub device: PathBuf,

    /// Requested maximum wake-up latency in microseconds (0 = strictest).
    pub target_latency_us: i32,

    /// How the constraint is held before being released.
    pub wait: WaitMode,

    /// Release automatically after this long, even without input.
    #[serde(
        with = "humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub hold_for: Option<Duration>,

    /// Custom prompt text (replaces the wait mode's default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            target_latency_us: 0,
            wait: WaitMode::default(),
            hold_for: None,
            prompt: None,
        }
    }
}

/// What the program blocks on between acquire and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Prompt and wait for one line on stdin (or a signal).
    #[default]
    Enter,
    /// Wait for SIGINT, SIGTERM or SIGHUP only.
    Signal,
    /// Release immediately after acquiring.
    None,
}

impl WaitMode {
    /// Default prompt for this mode; `None` means nothing is printed.
    #[must_use]
    pub fn default_prompt(self) -> Option<&'static str> {
        match self {
            Self::Enter => Some(ENTER_PROMPT),
            Self::Signal => Some(SIGNAL_PROMPT),
            Self::None => None,
        }
    }
}

impl fmt::Display for WaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Signal => write!(f, "signal"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for WaitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enter" => Ok(Self::Enter),
            "signal" => Ok(Self::Signal),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown wait mode '{other}' (expected enter, signal or none)"
            )),
        }
    }
}

impl GuardConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "Parsing guard configuration");
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check values that deserialize fine but cannot be honoured.
    ///
    /// # Errors
    ///
    /// Returns [`QosError::InvalidTarget`] for a negative latency target and
    /// [`QosError::Config`] for an empty device path or a zero `hold_for`.
    pub fn validate(&self) -> QosResult<()> {
        if self.target_latency_us < 0 {
            return Err(QosError::InvalidTarget(self.target_latency_us));
        }
        if self.device.as_os_str().is_empty() {
            return Err(QosError::Config("device path is empty".into()));
        }
        if self.hold_for == Some(Duration::ZERO) {
            return Err(QosError::Config(
                "hold_for must be non-zero (use wait = \"none\" to release immediately)".into(),
            ));
        }
        Ok(())
    }

    /// Prompt to print before waiting, if any.
    #[must_use]
    pub fn prompt_text(&self) -> Option<&str> {
        let default = self.wait.default_prompt()?;
        Some(self.prompt.as_deref().unwrap_or(default))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {}", path.display())]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    /// Same format for optional durations.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
