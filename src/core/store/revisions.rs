//! core::store::revisions
//!
//! Enumeration and naming of revision files inside a definition directory.
//!
//! A revision file is named `<name>.<NNN>.<ext>`, where `<name>` is the
//! directory's own name and `NNN` is exactly three decimal digits. Anything
//! else in the directory (the `HEAD` file, staged temp files, other
//! extensions, two- or four-digit numbers) is not a revision.
//!
//! Nothing here is cached: every call re-derives from the directory
//! listing, because callers run both under the definition lock and
//! lock-free.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::paths::RepoPaths;
use crate::core::types::{DefinitionName, Revision};

/// Parse `file_name` as a revision file of `name` with extension `ext`.
///
/// ```
/// use jobstore::core::store::revisions::parse_revision_file_name;
///
/// assert_eq!(parse_revision_file_name("etl.007.json", "etl", "json").map(|r| r.get()), Some(7));
/// assert_eq!(parse_revision_file_name("etl.7.json", "etl", "json"), None);
/// assert_eq!(parse_revision_file_name("etl.0007.json", "etl", "json"), None);
/// assert_eq!(parse_revision_file_name("other.007.json", "etl", "json"), None);
/// ```
pub fn parse_revision_file_name(file_name: &str, name: &str, ext: &str) -> Option<Revision> {
    let rest = file_name.strip_suffix(ext)?.strip_suffix('.')?;
    let (stem, digits) = rest.rsplit_once('.')?;
    if stem != name {
        return None;
    }
    split_revision_digits(digits)
}

/// Split `file_name` into `(name, revision)` without knowing the name.
///
/// Used when only the file is known, e.g. from a filesystem event.
pub fn split_revision_file_name(file_name: &str, ext: &str) -> Option<(DefinitionName, Revision)> {
    let rest = file_name.strip_suffix(ext)?.strip_suffix('.')?;
    let (stem, digits) = rest.rsplit_once('.')?;
    let rev = split_revision_digits(digits)?;
    let name = DefinitionName::new(stem).ok()?;
    Some((name, rev))
}

fn split_revision_digits(digits: &str) -> Option<Revision> {
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rev = Revision::new(digits.parse().ok()?).ok()?;
    (!rev.is_zero()).then_some(rev)
}

/// Parse `file_name` as a revision file of `name` in any encoding.
fn parse_any_extension(file_name: &str, name: &str) -> Option<Revision> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    parse_revision_file_name(file_name, name, ext)
}

fn scan(
    dir: &Path,
    parse: impl Fn(&str, &str) -> Option<Revision>,
) -> io::Result<BTreeMap<Revision, PathBuf>> {
    let mut revisions = BTreeMap::new();
    let Some(name) = RepoPaths::name_of_dir(dir) else {
        return Ok(revisions);
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(revisions),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(rev) = parse(file_name, name.as_str()) {
            revisions.insert(rev, entry.path());
        }
    }

    Ok(revisions)
}

/// All revision files of the definition stored in `dir`, keyed by revision.
///
/// A missing directory has no revisions.
pub fn list(dir: &Path, ext: &str) -> io::Result<BTreeMap<Revision, PathBuf>> {
    scan(dir, |file_name, name| {
        parse_revision_file_name(file_name, name, ext)
    })
}

/// Highest revision present in `dir`, or [`Revision::ZERO`] if none.
pub fn head(dir: &Path, ext: &str) -> io::Result<Revision> {
    Ok(last(list(dir, ext)?))
}

/// Highest revision number taken in `dir` by a file of any extension.
///
/// Appends allocate from this rather than [`head`], so a number already
/// used by a writer configured with another encoding is never reused.
pub fn allocated_head(dir: &Path) -> io::Result<Revision> {
    Ok(last(scan(dir, parse_any_extension)?))
}

fn last(revisions: BTreeMap<Revision, PathBuf>) -> Revision {
    revisions
        .last_key_value()
        .map(|(rev, _)| *rev)
        .unwrap_or(Revision::ZERO)
}

/// Path of revision `rev` of `name` in `dir`.
pub fn path_for(dir: &Path, name: &DefinitionName, rev: Revision, ext: &str) -> PathBuf {
    RepoPaths::revision_file(dir, name, rev, ext)
}
