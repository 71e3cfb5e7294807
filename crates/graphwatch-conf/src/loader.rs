//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, GraphwatchConfig, InfraConfig, PolicyConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns existing paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/graphwatch/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("graphwatch/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("graphwatch.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<GraphwatchConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from a TOML string; absent keys keep their defaults.
fn parse_toml(contents: &str, path: &Path) -> Result<GraphwatchConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut infra = InfraConfig::default();
    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("state_dir").and_then(|v| v.as_str()) {
            infra.paths.state_dir = expand_path(v);
        }
    }
    if let Some(remote) = table.get("remote").and_then(|v| v.as_table()) {
        if let Some(v) = remote.get("name").and_then(|v| v.as_str()) {
            infra.remote.name = Some(v.to_string());
        }
        if let Some(v) = remote.get("eager_bind").and_then(|v| v.as_bool()) {
            infra.remote.eager_bind = v;
        }
    }
    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            infra.telemetry.log_level = v.to_string();
        }
    }

    let mut policy = PolicyConfig::default();
    if let Some(section) = table.get("policy").and_then(|v| v.as_table()) {
        if let Some(v) = section.get("default_nodes").and_then(|v| v.as_bool()) {
            policy.default_nodes = v;
        }
        if let Some(v) = section.get("save_interval_ms").and_then(|v| v.as_integer()) {
            policy.save_interval_ms = u64::try_from(v).map_err(|_| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("policy.save_interval_ms must not be negative, got {}", v),
            })?;
        }
    }

    Ok(GraphwatchConfig { infra, policy })
}

fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configs, with values in `overlay` that differ from the compiled
/// defaults taking precedence.
pub fn merge_configs(base: GraphwatchConfig, overlay: GraphwatchConfig) -> GraphwatchConfig {
    let defaults = GraphwatchConfig::default();
    GraphwatchConfig {
        infra: InfraConfig {
            paths: crate::PathsConfig {
                state_dir: pick(
                    base.infra.paths.state_dir,
                    overlay.infra.paths.state_dir,
                    defaults.infra.paths.state_dir,
                ),
            },
            remote: crate::RemoteConfig {
                name: overlay.infra.remote.name.or(base.infra.remote.name),
                eager_bind: pick(
                    base.infra.remote.eager_bind,
                    overlay.infra.remote.eager_bind,
                    defaults.infra.remote.eager_bind,
                ),
            },
            telemetry: crate::TelemetryConfig {
                log_level: pick(
                    base.infra.telemetry.log_level,
                    overlay.infra.telemetry.log_level,
                    defaults.infra.telemetry.log_level,
                ),
            },
        },
        policy: PolicyConfig {
            default_nodes: pick(
                base.policy.default_nodes,
                overlay.policy.default_nodes,
                defaults.policy.default_nodes,
            ),
            save_interval_ms: pick(
                base.policy.save_interval_ms,
                overlay.policy.save_interval_ms,
                defaults.policy.save_interval_ms,
            ),
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut GraphwatchConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides looked up through `var`.
pub fn apply_overrides_from<F>(config: &mut GraphwatchConfig, sources: &mut ConfigSources, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = var("GRAPHWATCH_STATE_DIR") {
        config.infra.paths.state_dir = expand_path(&v);
        sources.env_overrides.push("GRAPHWATCH_STATE_DIR".to_string());
    }

    if let Some(v) = var("GRAPHWATCH_REMOTE") {
        config.infra.remote.name = Some(v);
        sources.env_overrides.push("GRAPHWATCH_REMOTE".to_string());
    }
    if let Some(v) = var("GRAPHWATCH_EAGER_BIND") {
        if let Some(eager) = parse_bool(&v) {
            config.infra.remote.eager_bind = eager;
            sources.env_overrides.push("GRAPHWATCH_EAGER_BIND".to_string());
        }
    }

    if let Some(v) = var("GRAPHWATCH_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("GRAPHWATCH_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Some(v) = var("GRAPHWATCH_SAVE_INTERVAL_MS") {
        if let Ok(ms) = v.parse() {
            config.policy.save_interval_ms = ms;
            sources.env_overrides.push("GRAPHWATCH_SAVE_INTERVAL_MS".to_string());
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        directories::BaseDirs::new()
            .map(|d| d.home_dir().join(stripped))
            .unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|value| PathBuf::from(value).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}
