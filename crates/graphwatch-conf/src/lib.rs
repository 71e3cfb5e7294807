//! Configuration loading for graphwatch tools.
//!
//! # Configuration Philosophy
//!
//! - **Infrastructure** (`InfraConfig`): paths, which remote to connect to,
//!   logging. Fixed once the process started.
//!
//! - **Policy** (`PolicyConfig`): switches and timings for the policies that
//!   run on top of a connection.
//!
//! # Usage
//!
//! ```rust,no_run
//! use graphwatch_conf::GraphwatchConfig;
//!
//! let config = GraphwatchConfig::load().expect("Failed to load config");
//! println!("state dir: {}", config.infra.paths.state_dir.display());
//! println!("save interval: {:?}", config.policy.save_interval());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/graphwatch/config.toml` (system)
//! 2. `~/.config/graphwatch/config.toml` (user)
//! 3. `./graphwatch.toml` (local override, replaced by `--config`)
//! 4. Environment variables (`GRAPHWATCH_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! state_dir = "~/.local/state/graphwatch"
//!
//! [remote]
//! name = "pipewire-0"
//! eager_bind = true
//!
//! [telemetry]
//! log_level = "info"
//!
//! [policy]
//! default_nodes = true
//! save_interval_ms = 1000
//! ```

pub mod infra;
pub mod loader;
pub mod policy;

pub use infra::{InfraConfig, PathsConfig, RemoteConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use policy::PolicyConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete graphwatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphwatchConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

impl GraphwatchConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with `config_path` standing in for `./graphwatch.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables were used.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = GraphwatchConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# graphwatch configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "state_dir = \"{}\"\n",
            self.infra.paths.state_dir.display()
        ));

        output.push_str("\n[remote]\n");
        if let Some(name) = &self.infra.remote.name {
            output.push_str(&format!("name = \"{}\"\n", name));
        }
        output.push_str(&format!("eager_bind = {}\n", self.infra.remote.eager_bind));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        output.push_str("\n[policy]\n");
        output.push_str(&format!("default_nodes = {}\n", self.policy.default_nodes));
        output.push_str(&format!(
            "save_interval_ms = {}\n",
            self.policy.save_interval_ms
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphwatchConfig::default();
        assert!(config.policy.default_nodes);
        assert_eq!(config.policy.save_interval_ms, 1000);
    }

    #[test]
    fn test_to_toml() {
        let mut config = GraphwatchConfig::default();
        config.infra.remote.name = Some("pipewire-0".to_string());
        let toml = config.to_toml();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("name = \"pipewire-0\""));
        assert!(toml.contains("save_interval_ms = 1000"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let config = GraphwatchConfig::default();
        let parsed: GraphwatchConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }
}
