//! core::types
//!
//! Strong types used throughout the store.
//!
//! # Types
//!
//! - [`DefinitionName`] - Validated definition name (doubles as a directory name)
//! - [`Revision`] - Revision number in the on-disk range `1..=999`
//! - [`RevisionSelector`] - Either the head or a specific revision
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. A name that could
//! escape the repository root or collide with the revision-file naming
//! scheme cannot be represented.
//!
//! # Examples
//!
//! ```
//! use jobstore::core::types::{DefinitionName, Revision};
//!
//! let name = DefinitionName::new("pricing").unwrap();
//! assert_eq!(name.as_str(), "pricing");
//!
//! let rev = Revision::new(7).unwrap();
//! assert_eq!(rev.file_component(), "007");
//!
//! assert!(DefinitionName::new("../etc").is_err());
//! assert!(Revision::new(1000).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid definition name: {0}")]
    InvalidDefinitionName(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),
}

/// A validated definition name.
///
/// The name is used verbatim as the definition's directory name and as the
/// stem of every revision file, so it must be a single, visible path
/// component:
/// - Cannot be empty
/// - Cannot start with `.` (hidden entries are skipped by repository scans)
/// - Cannot contain `/`, `\`, or ASCII control characters
/// - Cannot be `HEAD` (reserved for the lock and audit file)
///
/// # Example
///
/// ```
/// use jobstore::core::types::DefinitionName;
///
/// assert!(DefinitionName::new("nightly-report").is_ok());
/// assert!(DefinitionName::new("etl.v2").is_ok());
///
/// assert!(DefinitionName::new("").is_err());
/// assert!(DefinitionName::new(".hidden").is_err());
/// assert!(DefinitionName::new("a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DefinitionName(String);

impl DefinitionName {
    /// Create a new validated definition name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidDefinitionName` if the name is not a safe
    /// single path component.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidDefinitionName(
                "definition name cannot be empty".into(),
            ));
        }
        if name.starts_with('.') {
            return Err(TypeError::InvalidDefinitionName(format!(
                "'{name}' cannot start with '.'"
            )));
        }
        if name == "HEAD" {
            return Err(TypeError::InvalidDefinitionName(
                "'HEAD' is reserved".into(),
            ));
        }
        for c in name.chars() {
            if c == '/' || c == '\\' {
                return Err(TypeError::InvalidDefinitionName(format!(
                    "'{name}' cannot contain path separators"
                )));
            }
            if c.is_ascii_control() {
                return Err(TypeError::InvalidDefinitionName(format!(
                    "'{}' cannot contain control characters",
                    name.escape_debug()
                )));
            }
        }
        Ok(())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DefinitionName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DefinitionName> for String {
    fn from(name: DefinitionName) -> Self {
        name.0
    }
}

impl AsRef<str> for DefinitionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DefinitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A revision number.
///
/// Revisions start at 1 and increase by one per append. Revision files carry
/// the number as a fixed three-digit field, which caps a definition at
/// [`Revision::MAX`]. [`Revision::ZERO`] stands for "no revisions yet" and is
/// what an empty definition reports as its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Revision(u32);

impl Revision {
    /// The head of a definition with no revisions.
    pub const ZERO: Revision = Revision(0);

    /// The first revision of any definition.
    pub const FIRST: Revision = Revision(1);

    /// Largest revision expressible in the three-digit filename field.
    pub const MAX: Revision = Revision(999);

    /// Create a revision number in `0..=999`.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRevision` above [`Revision::MAX`].
    pub fn new(value: u32) -> Result<Self, TypeError> {
        if value > Self::MAX.0 {
            return Err(TypeError::InvalidRevision(format!(
                "{value} exceeds the maximum of {}",
                Self::MAX.0
            )));
        }
        Ok(Self(value))
    }

    /// Convert from the 64-bit representation used by the audit log.
    pub fn from_i64(value: i64) -> Result<Self, TypeError> {
        u32::try_from(value)
            .map_err(|_| TypeError::InvalidRevision(format!("{value} is out of range")))
            .and_then(Self::new)
    }

    /// The numeric value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// True for [`Revision::ZERO`].
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The following revision, or `None` once [`Revision::MAX`] is reached.
    pub fn next(self) -> Option<Revision> {
        if self >= Self::MAX {
            None
        } else {
            Some(Revision(self.0 + 1))
        }
    }

    /// Zero-padded three-digit form used in revision filenames.
    pub fn file_component(self) -> String {
        format!("{:03}", self.0)
    }
}

impl TryFrom<u32> for Revision {
    type Error = TypeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Revision> for u32 {
    fn from(rev: Revision) -> Self {
        rev.0
    }
}

impl From<Revision> for i64 {
    fn from(rev: Revision) -> Self {
        i64::from(rev.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects a revision of a definition: the current head or a fixed number.
///
/// Parses from `"head"` (case-insensitive) or a decimal revision number.
///
/// ```
/// use jobstore::core::types::{Revision, RevisionSelector};
///
/// assert_eq!("head".parse::<RevisionSelector>().unwrap(), RevisionSelector::Head);
/// assert_eq!(
///     "3".parse::<RevisionSelector>().unwrap(),
///     RevisionSelector::Number(Revision::new(3).unwrap())
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionSelector {
    Head,
    Number(Revision),
}

impl FromStr for RevisionSelector {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("head") {
            return Ok(RevisionSelector::Head);
        }
        let value: u32 = s
            .parse()
            .map_err(|_| TypeError::InvalidRevision(format!("'{s}' is not 'head' or a number")))?;
        if value == 0 {
            return Err(TypeError::InvalidRevision(
                "revision numbers start at 1".into(),
            ));
        }
        Ok(RevisionSelector::Number(Revision::new(value)?))
    }
}

impl fmt::Display for RevisionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSelector::Head => f.write_str("head"),
            RevisionSelector::Number(rev) => write!(f, "{rev}"),
        }
    }
}

/// A UTC timestamp, displayed as RFC3339.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl From<std::time::SystemTime> for UtcTimestamp {
    fn from(time: std::time::SystemTime) -> Self {
        Self(chrono::DateTime::<chrono::Utc>::from(time))
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
