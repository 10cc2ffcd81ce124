//! Configuration resolution for shellkeep.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/shellkeep/settings.json`)
//! 3. Project config (`.shellkeep/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::session::SessionOptions;

/// Complete shellkeep configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

/// Shell session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell executable (path or name on `PATH`). Platform default when unset.
    pub shell: Option<PathBuf>,
    /// Initial working directory. Process cwd when unset.
    pub working_directory: Option<PathBuf>,
    pub timeout_secs: u64,
    pub startup_timeout_secs: u64,
    pub locale: String,
    pub exit_grace_ms: u64,
    pub terminate_grace_ms: u64,
    pub stderr_settle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let defaults = SessionOptions::default();
        Self {
            shell: None,
            working_directory: None,
            timeout_secs: defaults.default_timeout.as_secs(),
            startup_timeout_secs: defaults.startup_timeout.as_secs(),
            locale: defaults.locale,
            exit_grace_ms: duration_ms(defaults.exit_grace),
            terminate_grace_ms: duration_ms(defaults.terminate_grace),
            stderr_settle_ms: duration_ms(defaults.stderr_settle),
        }
    }
}

impl SessionConfig {
    /// Build spawn options, falling back to `default_cwd` when no working
    /// directory is configured.
    pub fn to_options(&self, default_cwd: &Path) -> SessionOptions {
        SessionOptions {
            shell: self.shell.clone(),
            working_directory: self
                .working_directory
                .clone()
                .unwrap_or_else(|| default_cwd.to_path_buf()),
            default_timeout: Duration::from_secs(self.timeout_secs),
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            locale: self.locale.clone(),
            exit_grace: Duration::from_millis(self.exit_grace_ms),
            terminate_grace: Duration::from_millis(self.terminate_grace_ms),
            stderr_settle: Duration::from_millis(self.stderr_settle_ms),
        }
    }
}

/// Tool-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on model round-trips per user message.
    pub max_rounds: u32,
    /// Per-command timeout inside the loop; session default when unset.
    pub command_timeout_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 32,
            command_timeout_secs: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut layers = Vec::new();
    if let Some(global_path) = global_config_path() {
        layers.push(global_path);
    }
    if let Some(dir) = project_dir {
        layers.push(project_config_path(dir));
    }

    let mut config = load_layers(&layers)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Global settings file: `<config dir>/shellkeep/settings.json`.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("shellkeep").join("settings.json"))
}

/// Project settings file: `<dir>/.shellkeep/settings.json`.
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(".shellkeep").join("settings.json")
}

/// Fold the settings files that exist, lowest priority first, over the
/// defaults. Only keys a file actually sets override earlier layers.
fn load_layers(paths: &[PathBuf]) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in paths.iter().filter(|p| p.exists()) {
        merge_config(&mut merged, load_config_file(path)?);
    }
    serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid merged configuration: {e}")))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    // Reject bad types here so the error names the offending file.
    Config::deserialize(&value).map_err(|e| {
        Error::Config(format!("Invalid config file {}: {}", path.display(), e))
    })?;
    Ok(value)
}

/// Recursively overlay `overlay` onto `base`; objects merge key by key,
/// anything else replaces.
fn merge_config(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_config(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `SHELLKEEP_*` overrides read through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("SHELLKEEP_SHELL") {
        config.session.shell = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("SHELLKEEP_TIMEOUT_SECS") {
        if let Ok(n) = val.parse() {
            config.session.timeout_secs = n;
        }
    }
    if let Some(val) = lookup("SHELLKEEP_LOCALE") {
        config.session.locale = val;
    }
    if let Some(val) = lookup("SHELLKEEP_MAX_ROUNDS") {
        if let Ok(n) = val.parse() {
            config.agent.max_rounds = n;
        }
    }
    if let Some(val) = lookup("SHELLKEEP_LOG_LEVEL") {
        config.logging.level = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_has_30s_timeout() {
        let config = Config::default();
        assert_eq!(config.session.timeout_secs, 30);
        assert_eq!(config.agent.max_rounds, 32);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"session": {"timeout_secs": 5}}"#).unwrap();
        assert_eq!(config.session.timeout_secs, 5);
        assert_eq!(config.session.locale, "C.UTF-8");
        assert_eq!(config.logging.level, "warn");
    }

    fn write_settings(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name).join("settings.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn project_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_settings(
            dir.path(),
            ".shellkeep",
            r#"{"session": {"shell": "/bin/sh", "locale": "en_US.UTF-8"}, "agent": {"max_rounds": 4}}"#,
        );

        let config = load_layers(&[path]).unwrap();
        assert_eq!(config.session.shell, Some(PathBuf::from("/bin/sh")));
        assert_eq!(config.session.locale, "en_US.UTF-8");
        assert_eq!(config.session.timeout_secs, 30);
        assert_eq!(config.agent.max_rounds, 4);
    }

    #[test]
    fn project_layer_keeps_unset_global_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let global = write_settings(
            dir.path(),
            "global",
            r#"{"session": {"timeout_secs": 5, "locale": "en_US.UTF-8"}, "logging": {"level": "debug"}}"#,
        );
        let project = write_settings(dir.path(), "project", r#"{"agent": {"max_rounds": 4}}"#);

        let config = load_layers(&[global, project]).unwrap();
        assert_eq!(config.session.timeout_secs, 5);
        assert_eq!(config.session.locale, "en_US.UTF-8");
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json);
        assert_eq!(config.agent.max_rounds, 4);
    }

    #[test]
    fn later_layer_wins_per_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let global = write_settings(
            dir.path(),
            "global",
            r#"{"session": {"timeout_secs": 5, "shell": "/bin/zsh"}}"#,
        );
        let project = write_settings(dir.path(), "project", r#"{"session": {"timeout_secs": 9}}"#);

        let config = load_layers(&[global, project, dir.path().join("missing.json")]).unwrap();
        assert_eq!(config.session.timeout_secs, 9);
        assert_eq!(config.session.shell, Some(PathBuf::from("/bin/zsh")));
    }

    #[test]
    fn wrongly_typed_value_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_settings(dir.path(), "bad", r#"{"session": {"timeout_secs": "soon"}}"#);
        assert!(matches!(load_layers(&[path]), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHELLKEEP_SHELL", "zsh"),
            ("SHELLKEEP_TIMEOUT_SECS", "12"),
            ("SHELLKEEP_MAX_ROUNDS", "not-a-number"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.session.shell, Some(PathBuf::from("zsh")));
        assert_eq!(config.session.timeout_secs, 12);
        assert_eq!(config.agent.max_rounds, 32);
    }

    #[test]
    fn options_fall_back_to_given_cwd() {
        let config = SessionConfig::default();
        let opts = config.to_options(Path::new("/srv"));
        assert_eq!(opts.working_directory, PathBuf::from("/srv"));
        assert_eq!(opts.default_timeout, Duration::from_secs(30));
        assert_eq!(opts.stderr_settle, Duration::from_millis(250));
    }
}
