//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$JOBSTORE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/jobstore/config.toml`
//! 3. `~/.jobstore/config.toml`
//!
//! # Repo Config
//!
//! Located at `<root>/.jobstore.toml`. Every process sharing a repository
//! should agree on the encoding and name field, so these live with the data.
//!
//! # Validation
//!
//! Config values are validated after parsing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::codec::{CodecFormat, REVISION_FIELD};

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// root = "/srv/jobs"
/// format = "json"
/// name_field = "name"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default repository root
    pub root: Option<PathBuf>,

    /// Default revision file encoding
    pub format: Option<CodecFormat>,

    /// Default payload field naming a definition
    pub name_field: Option<String>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name_field(self.name_field.as_deref())
    }
}

/// Repository configuration (shared by every process using the root).
///
/// # Example
///
/// ```toml
/// format = "toml"
/// name_field = "job_id"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Revision file encoding for this repository
    pub format: Option<CodecFormat>,

    /// Payload field naming a definition in this repository
    pub name_field: Option<String>,
}

impl RepoConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name_field(self.name_field.as_deref())
    }
}

fn validate_name_field(field: Option<&str>) -> Result<(), ConfigError> {
    match field {
        Some(f) if f.trim().is_empty() => Err(ConfigError::InvalidValue(
            "name_field cannot be empty".into(),
        )),
        Some(f) if f == REVISION_FIELD => Err(ConfigError::InvalidValue(format!(
            "name_field cannot be '{REVISION_FIELD}'; the store overwrites it"
        ))),
        _ => Ok(()),
    }
}
