//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Two configuration scopes:
//! - **Global**: User-level settings, including the default repository root
//! - **Repo**: Settings stored in the repository root, shared by all writers
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here, except `--root` / `--config` discovery)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. An explicit path (`--config`)
//! 2. `$JOBSTORE_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/jobstore/config.toml`
//! 4. `~/.jobstore/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use jobstore::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(None, Some(Path::new("/srv/jobs"))).unwrap();
//! println!("format: {}", config.format());
//! println!("name field: {}", config.name_field());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, RepoConfig};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::codec::CodecFormat;

/// Default payload field naming a definition.
pub const DEFAULT_NAME_FIELD: &str = "name";

/// Name of the repo config file inside the repository root.
pub const REPO_CONFIG_FILE: &str = ".jobstore.toml";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("no repository root configured; pass --root or set `root` in the global config")]
    NoRoot,
}

/// Merged configuration from all sources.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if present in the root)
    pub repo: Option<RepoConfig>,
    /// Repository root after applying overrides
    root: Option<PathBuf>,
    /// Path to the global config file (if loaded)
    global_path: Option<PathBuf>,
    /// Path to the repo config file (if loaded)
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// `explicit` is a global config path that bypasses discovery. `root`
    /// overrides the root named in the global config.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or fails
    /// validation. Missing files are not an error.
    pub fn load(explicit: Option<&Path>, root: Option<&Path>) -> Result<Config, ConfigError> {
        let global_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover_global(),
        };
        Self::load_from(global_path.as_deref(), root)
    }

    /// Load from a known global config path (or none), without discovery.
    pub fn load_from(global_path: Option<&Path>, root: Option<&Path>) -> Result<Config, ConfigError> {
        let (global, global_path) = match global_path {
            Some(path) => (read_toml::<GlobalConfig>(path)?, Some(path.to_path_buf())),
            None => (GlobalConfig::default(), None),
        };
        global.validate()?;

        let root = root.map(Path::to_path_buf).or_else(|| global.root.clone());

        let (repo, repo_path) = match &root {
            Some(root) => {
                let path = Self::repo_config_path(root);
                if path.is_file() {
                    let repo = read_toml::<RepoConfig>(&path)?;
                    repo.validate()?;
                    (Some(repo), Some(path))
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        Ok(Config {
            global,
            repo,
            root,
            global_path,
            repo_path,
        })
    }

    fn discover_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("JOBSTORE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("jobstore/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".jobstore/config.toml"))
            .filter(|path| path.exists())
    }

    /// Path of the repo config for `root`.
    pub fn repo_config_path(root: &Path) -> PathBuf {
        root.join(REPO_CONFIG_FILE)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// The repository root, if one was given or configured.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The repository root, or [`ConfigError::NoRoot`].
    pub fn require_root(&self) -> Result<&Path, ConfigError> {
        self.root().ok_or(ConfigError::NoRoot)
    }

    /// Revision file encoding. Defaults to JSON.
    pub fn format(&self) -> CodecFormat {
        self.repo
            .as_ref()
            .and_then(|r| r.format)
            .or(self.global.format)
            .unwrap_or_default()
    }

    /// Payload field naming a definition. Defaults to `"name"`.
    pub fn name_field(&self) -> &str {
        self.repo
            .as_ref()
            .and_then(|r| r.name_field.as_deref())
            .or(self.global.name_field.as_deref())
            .unwrap_or(DEFAULT_NAME_FIELD)
    }

    /// Where the global config was loaded from.
    pub fn global_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Where the repo config was loaded from.
    pub fn repo_path(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_files() {
        let config = Config::load_from(None, None).unwrap();
        assert_eq!(config.root(), None);
        assert_eq!(config.format(), CodecFormat::Json);
        assert_eq!(config.name_field(), "name");
        assert!(matches!(config.require_root(), Err(ConfigError::NoRoot)));
    }

    #[test]
    fn global_root_used_when_not_overridden() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        fs::write(&global, "root = \"/srv/jobs\"\nformat = \"toml\"\n").unwrap();

        let config = Config::load_from(Some(&global), None).unwrap();
        assert_eq!(config.root(), Some(Path::new("/srv/jobs")));
        assert_eq!(config.format(), CodecFormat::Toml);
        assert_eq!(config.global_path(), Some(global.as_path()));
    }

    #[test]
    fn root_override_wins() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        fs::write(&global, "root = \"/srv/jobs\"\n").unwrap();

        let config = Config::load_from(Some(&global), Some(Path::new("/tmp/other"))).unwrap();
        assert_eq!(config.root(), Some(Path::new("/tmp/other")));
    }

    #[test]
    fn repo_config_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        fs::write(&global, "format = \"json\"\nname_field = \"name\"\n").unwrap();
        let root = temp.path().join("repo");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            Config::repo_config_path(&root),
            "format = \"toml\"\nname_field = \"job_id\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&global), Some(&root)).unwrap();
        assert_eq!(config.format(), CodecFormat::Toml);
        assert_eq!(config.name_field(), "job_id");
        assert!(config.repo_path().is_some());
    }

    #[test]
    fn parse_error_names_file() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        fs::write(&global, "format = [").unwrap();

        let err = Config::load_from(Some(&global), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn invalid_repo_value_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(Config::repo_config_path(temp.path()), "name_field = \"revision\"\n").unwrap();

        let err = Config::load_from(None, Some(temp.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn explicit_missing_file_is_read_error() {
        let err = Config::load(Some(Path::new("/no/such/config.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
