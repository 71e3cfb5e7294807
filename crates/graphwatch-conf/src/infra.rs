//! Infrastructure configuration - fixed for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for persisted policy state (remembered default nodes).
    /// Default: ~/.local/state/graphwatch
    #[serde(default = "PathsConfig::default_state_dir")]
    pub state_dir: PathBuf,
}

impl PathsConfig {
    fn default_state_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/state/graphwatch"))
            .unwrap_or_else(|| PathBuf::from(".local/state/graphwatch"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: Self::default_state_dir(),
        }
    }
}

/// Which daemon to talk to and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote name passed to the connector; `None` uses the daemon default.
    #[serde(default)]
    pub name: Option<String>,

    /// Bind every announced global right away.
    /// Default: true
    #[serde(default = "RemoteConfig::default_eager_bind")]
    pub eager_bind: bool,
}

impl RemoteConfig {
    fn default_eager_bind() -> bool {
        true
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: None,
            eager_bind: Self::default_eager_bind(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive (trace, debug, info, warn, error, or per-target).
    /// Default: warn
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "warn".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let infra = InfraConfig::default();
        assert!(infra.paths.state_dir.ends_with("graphwatch"));
        assert_eq!(infra.remote.name, None);
        assert!(infra.remote.eager_bind);
        assert_eq!(infra.telemetry.log_level, "warn");
    }
}
