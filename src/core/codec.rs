//! core::codec
//!
//! Definition payloads and the pluggable codec that reads and writes them.
//!
//! # Design
//!
//! The store never interprets a definition beyond two fields: the
//! `revision` field it stamps on every write, and the configurable name
//! field used to route a definition to its directory. Everything else is an
//! opaque structured document. [`DefinitionCodec`] is the seam between the
//! store and the on-disk encoding; JSON and TOML implementations ship here.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::types::Revision;

/// Payload field overwritten with the revision number on every write.
pub const REVISION_FIELD: &str = "revision";

/// Errors from encoding or decoding a definition.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes could not be decoded into a definition.
    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    /// The definition could not be encoded.
    #[error("failed to encode definition: {0}")]
    Encode(String),

    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// A decoded definition document.
///
/// Always a top-level object. The wrapped map is exposed read-only; writes
/// go through [`Definition::set`] so the store can inject fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Definition(Map<String, Value>);

impl Definition {
    /// An empty definition (what the head of an empty definition holds).
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing object map.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Convert a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Look up a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a top-level field, replacing any existing value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// The revision stamped into the payload, if present and in range.
    pub fn revision(&self) -> Option<Revision> {
        self.0
            .get(REVISION_FIELD)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .and_then(|n| Revision::new(n).ok())
    }

    /// Overwrite the `revision` field.
    pub fn set_revision(&mut self, rev: Revision) {
        self.set(REVISION_FIELD, rev.get());
    }

    /// Return a copy with the `revision` field overwritten.
    pub fn with_revision(mut self, rev: Revision) -> Self {
        self.set_revision(rev);
        self
    }

    /// A string field, used to resolve the definition's name.
    pub fn string_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// True when the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Encoding of definition documents on disk.
///
/// Implementations must be thread-safe; one codec instance is shared by the
/// store, the repository index, and the cache watcher.
pub trait DefinitionCodec: Send + Sync + fmt::Debug {
    /// File extension (without the dot) for revision files in this encoding.
    fn extension(&self) -> &str;

    /// Decode a document. `origin` is only used in error messages.
    fn decode(&self, bytes: &[u8], origin: &str) -> Result<Definition, CodecError>;

    /// Encode a document.
    fn encode(&self, definition: &Definition) -> Result<Vec<u8>, CodecError>;

    /// Read and decode the file at `path`.
    fn read(&self, path: &Path) -> Result<Definition, CodecError> {
        let origin = path.display().to_string();
        let bytes = fs::read(path).map_err(|source| CodecError::Read {
            path: origin.clone(),
            source,
        })?;
        self.decode(&bytes, &origin)
    }
}

/// Pretty-printed JSON documents (`.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DefinitionCodec for JsonCodec {
    fn extension(&self) -> &str {
        "json"
    }

    fn decode(&self, bytes: &[u8], origin: &str) -> Result<Definition, CodecError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Definition::from_value(value).ok_or_else(|| CodecError::Decode {
            path: origin.to_string(),
            message: "top-level value is not an object".into(),
        })
    }

    fn encode(&self, definition: &Definition) -> Result<Vec<u8>, CodecError> {
        let mut bytes = serde_json::to_vec_pretty(definition)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// TOML documents (`.toml`).
///
/// TOML has no null; encoding a definition containing `null` fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlCodec;

impl DefinitionCodec for TomlCodec {
    fn extension(&self) -> &str {
        "toml"
    }

    fn decode(&self, bytes: &[u8], origin: &str) -> Result<Definition, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|e| CodecError::Decode {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        let map: Map<String, Value> = toml::from_str(text).map_err(|e| CodecError::Decode {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Ok(Definition::from_map(map))
    }

    fn encode(&self, definition: &Definition) -> Result<Vec<u8>, CodecError> {
        toml::to_string_pretty(definition)
            .map(String::into_bytes)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }
}

/// Which built-in codec a repository uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFormat {
    #[default]
    Json,
    Toml,
}

impl CodecFormat {
    /// Instantiate the codec for this format.
    pub fn codec(self) -> std::sync::Arc<dyn DefinitionCodec> {
        match self {
            CodecFormat::Json => std::sync::Arc::new(JsonCodec),
            CodecFormat::Toml => std::sync::Arc::new(TomlCodec),
        }
    }
}

impl FromStr for CodecFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(CodecFormat::Json),
            "toml" => Ok(CodecFormat::Toml),
            other => Err(format!("unknown format '{other}', expected 'json' or 'toml'")),
        }
    }
}

impl fmt::Display for CodecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecFormat::Json => f.write_str("json"),
            CodecFormat::Toml => f.write_str("toml"),
        }
    }
}
