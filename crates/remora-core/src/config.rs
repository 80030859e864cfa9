//! Engine configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/remora/config.toml)
//! 3. Environment variables (REMORA_* prefix)
//!
//! Environment variables take precedence over config file values.
//!
//! Invalid configuration is the only fatal error class: it is surfaced
//! by [`Config::validate`] before the mirror loop starts, and nothing
//! after that point terminates the loop.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix
const ENV_PREFIX: &str = "REMORA";

/// Fatal configuration problems, reported before the engine starts
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("remote root '{0}' must begin with '/'")]
    RemoteRootNotAbsolute(String),

    #[error("mirror directory is not set")]
    MirrorDirMissing,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory in the remote store to watch (must begin with '/')
    #[serde(default = "default_remote_root")]
    pub remote_root: String,

    /// Local directory kept consistent with the remote root
    #[serde(default = "default_mirror_dir")]
    pub mirror_dir: PathBuf,

    /// Drop the watched folder's own name from mirrored paths
    #[serde(default = "default_strip_root")]
    pub strip_root: bool,

    /// Long-poll wait timeout, in seconds
    #[serde(default = "default_long_poll_timeout_secs")]
    pub long_poll_timeout_secs: u64,

    /// Fixed delay before retrying after any remote or local failure,
    /// in seconds
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Mirror the full remote tree on startup before watching.
    ///
    /// When false, watching starts from a "now" cursor and existing
    /// remote content is never fetched.
    #[serde(default = "default_full_sync_on_start")]
    pub full_sync_on_start: bool,

    /// Local directory treated as the remote store by `remora run`
    /// (filesystem-backed store)
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_root: default_remote_root(),
            mirror_dir: default_mirror_dir(),
            strip_root: default_strip_root(),
            long_poll_timeout_secs: default_long_poll_timeout_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            full_sync_on_start: default_full_sync_on_start(),
            source_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (REMORA_REMOTE_ROOT, REMORA_MIRROR_DIR, ...)
    /// 2. Config file (~/.config/remora/config.toml or REMORA_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_REMOTE_ROOT", ENV_PREFIX)) {
            self.remote_root = val;
        }

        if let Ok(val) = std::env::var(format!("{}_MIRROR_DIR", ENV_PREFIX)) {
            self.mirror_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SOURCE_DIR", ENV_PREFIX)) {
            self.source_dir = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        if let Ok(val) = std::env::var(format!("{}_STRIP_ROOT", ENV_PREFIX)) {
            self.strip_root = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Ok(val) = std::env::var(format!("{}_LONG_POLL_TIMEOUT_SECS", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.long_poll_timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_ERROR_BACKOFF_SECS", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.error_backoff_secs = secs;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_FULL_SYNC_ON_START", ENV_PREFIX)) {
            self.full_sync_on_start = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    /// Check the configuration before starting the engine.
    ///
    /// This is the only place a configuration problem surfaces; the
    /// running loop assumes a valid config.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.remote_root.starts_with('/') {
            return Err(ConfigError::RemoteRootNotAbsolute(self.remote_root.clone()));
        }
        if self.mirror_dir.as_os_str().is_empty() {
            return Err(ConfigError::MirrorDirMissing);
        }
        Ok(())
    }

    /// Long-poll wait timeout
    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs)
    }

    /// Fallback delay applied after any failed cycle
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Get the config file path
    ///
    /// Can be overridden with REMORA_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remora")
            .join("config.toml")
    }
}

/// Watch the whole remote namespace by default
fn default_remote_root() -> String {
    "/".to_string()
}

/// Get the default mirror directory
fn default_mirror_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remora")
        .join("mirror")
}

/// Stripping only makes sense when watching a named shared folder; the
/// default root '/' has no segment to strip
fn default_strip_root() -> bool {
    false
}

fn default_long_poll_timeout_secs() -> u64 {
    30
}

fn default_error_backoff_secs() -> u64 {
    10
}

fn default_full_sync_on_start() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            // Clear all the vars
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "REMORA_REMOTE_ROOT",
        "REMORA_MIRROR_DIR",
        "REMORA_SOURCE_DIR",
        "REMORA_STRIP_ROOT",
        "REMORA_LONG_POLL_TIMEOUT_SECS",
        "REMORA_ERROR_BACKOFF_SECS",
        "REMORA_FULL_SYNC_ON_START",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.remote_root, "/");
        assert!(!config.strip_root);
        assert!(config.full_sync_on_start);
        assert_eq!(config.long_poll_timeout(), Duration::from_secs(30));
        assert_eq!(config.error_backoff(), Duration::from_secs(10));
        assert!(config.mirror_dir.ends_with("remora/mirror"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_remote_root() {
        let config = Config {
            remote_root: "Shared/Docs".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RemoteRootNotAbsolute(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_mirror_dir() {
        let config = Config {
            mirror_dir: PathBuf::new(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MirrorDirMissing)
        ));
    }

    #[test]
    fn test_env_override_remote_root() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("REMORA_REMOTE_ROOT", "/Shared/Docs");
        config.apply_env_overrides();

        assert_eq!(config.remote_root, "/Shared/Docs");
    }

    #[test]
    fn test_env_override_mirror_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("REMORA_MIRROR_DIR", "/tmp/remora-test");
        config.apply_env_overrides();

        assert_eq!(config.mirror_dir, PathBuf::from("/tmp/remora-test"));
    }

    #[test]
    fn test_env_override_strip_root() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("REMORA_STRIP_ROOT", "false");
        config.apply_env_overrides();
        assert!(!config.strip_root);

        env::set_var("REMORA_STRIP_ROOT", "1");
        config.apply_env_overrides();
        assert!(config.strip_root);
    }

    #[test]
    fn test_env_override_timing_and_full_sync() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("REMORA_LONG_POLL_TIMEOUT_SECS", "90");
        env::set_var("REMORA_ERROR_BACKOFF_SECS", "2");
        env::set_var("REMORA_FULL_SYNC_ON_START", "false");
        config.apply_env_overrides();

        assert_eq!(config.long_poll_timeout(), Duration::from_secs(90));
        assert_eq!(config.error_backoff(), Duration::from_secs(2));
        assert!(!config.full_sync_on_start);

        // Unparseable values leave the current setting alone
        env::set_var("REMORA_LONG_POLL_TIMEOUT_SECS", "soon");
        config.apply_env_overrides();
        assert_eq!(config.long_poll_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_env_override_source_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(config.source_dir.is_none());

        env::set_var("REMORA_SOURCE_DIR", "/srv/share");
        config.apply_env_overrides();
        assert_eq!(config.source_dir, Some(PathBuf::from("/srv/share")));

        // Empty string clears it
        env::set_var("REMORA_SOURCE_DIR", "");
        config.apply_env_overrides();
        assert!(config.source_dir.is_none());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            remote_root: "/Shared".to_string(),
            mirror_dir: PathBuf::from("/data/mirror"),
            strip_root: false,
            long_poll_timeout_secs: 45,
            error_backoff_secs: 5,
            full_sync_on_start: false,
            source_dir: None,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("remote_root"));
        assert!(toml_str.contains("mirror_dir"));
        assert!(toml_str.contains("long_poll_timeout_secs"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.remote_root, config.remote_root);
        assert_eq!(parsed.mirror_dir, config.mirror_dir);
        assert_eq!(parsed.long_poll_timeout_secs, 45);
        assert!(!parsed.full_sync_on_start);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            remote_root = "/Test"
            mirror_dir = "/custom/mirror"
            error_backoff_secs = 3
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.remote_root, "/Test");
        assert_eq!(config.mirror_dir, PathBuf::from("/custom/mirror"));
        assert_eq!(config.error_backoff(), Duration::from_secs(3));
        // Unset keys fall back to defaults
        assert_eq!(config.long_poll_timeout_secs, 30);
        assert!(!config.strip_root);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert_eq!(config.remote_root, "/");
        assert!(config.source_dir.is_none());
    }
}
