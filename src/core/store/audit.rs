//! core::store::audit
//!
//! Per-definition audit log: who wrote each revision, and why.
//!
//! # On-disk format
//!
//! The log lives in the definition's `HEAD` file (the same file the
//! definition lock is taken on). All integers are big-endian.
//!
//! ```text
//! [8 bytes: i64 offset of the most recently appended record]
//! repeated {
//!     [8 bytes: i64 revision number]
//!     [2 bytes: u16 author length][author: UTF-8]
//!     [2 bytes: u16 notes length][notes: UTF-8]
//! }
//! ```
//!
//! Records carry no delimiters beyond their length prefixes and are only
//! decodable front to back. The header offset is maintained on every append
//! but never consulted when reading.
//!
//! # Crash tolerance
//!
//! A record cut short at the end of the file (a crash during append) ends the
//! scan without error. A complete record whose contents are invalid is
//! corruption and is reported as [`AuditLogError::Corrupt`].

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::ops::lock::DefinitionLock;
use crate::core::paths::RepoPaths;
use crate::core::types::Revision;

/// Size of the header holding the last-record offset.
pub const HEADER_LEN: u64 = 8;

/// Errors from audit log operations.
#[derive(Debug, Error)]
pub enum AuditLogError {
    /// I/O error reading or writing the log.
    #[error("audit log i/o error: {0}")]
    Io(#[from] io::Error),

    /// A complete record in the log could not be decoded.
    #[error("corrupt audit record in {path} at offset {offset}: {reason}")]
    Corrupt {
        path: String,
        offset: u64,
        reason: String,
    },

    /// A string field does not fit its 16-bit length prefix.
    #[error("audit {field} is {len} bytes, limit is 65535")]
    FieldTooLong { field: &'static str, len: usize },

    /// Append was attempted through a lock that has already been released.
    #[error("audit log append requires a held definition lock")]
    NotLocked,
}

/// Metadata recorded for one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditEntry {
    pub author: String,
    pub notes: String,
}

/// Result of decoding a log image.
#[derive(Debug, Default)]
struct Scan {
    records: BTreeMap<Revision, AuditEntry>,
    /// Offset just past the last complete record (0 if there is no header).
    valid_end: u64,
    /// Value of the header field, if the header is present.
    header_offset: Option<i64>,
}

/// Why a record could not be decoded.
enum RecordError {
    /// The file ends inside the record.
    Truncated,
    /// The record is complete but malformed.
    Malformed(String),
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], RecordError> {
        let end = self.pos.checked_add(n).ok_or(RecordError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(RecordError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn i64(&mut self) -> Result<i64, RecordError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(buf))
    }

    fn string(&mut self, field: &str) -> Result<String, RecordError> {
        let mut len = [0u8; 2];
        len.copy_from_slice(self.take(2)?);
        let raw = self.take(u16::from_be_bytes(len) as usize)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| RecordError::Malformed(format!("{field} is not valid UTF-8: {e}")))
    }

    fn record(&mut self) -> Result<(Revision, AuditEntry), RecordError> {
        let raw = self.i64()?;
        let author = self.string("author")?;
        let notes = self.string("notes")?;
        let rev = Revision::from_i64(raw)
            .ok()
            .filter(|rev| !rev.is_zero())
            .ok_or_else(|| RecordError::Malformed(format!("revision {raw} is out of range")))?;
        Ok((rev, AuditEntry { author, notes }))
    }
}

fn scan(bytes: &[u8], path: &Path) -> Result<Scan, AuditLogError> {
    if (bytes.len() as u64) < HEADER_LEN {
        return Ok(Scan::default());
    }

    let mut reader = Reader { bytes, pos: 0 };
    let header_offset = reader.i64().ok();
    let mut result = Scan {
        records: BTreeMap::new(),
        valid_end: HEADER_LEN,
        header_offset,
    };

    while reader.pos < bytes.len() {
        let start = reader.pos;
        match reader.record() {
            Ok((rev, entry)) => {
                result.records.insert(rev, entry);
                result.valid_end = reader.pos as u64;
            }
            Err(RecordError::Truncated) => {
                warn!(
                    path = %path.display(),
                    offset = start,
                    trailing = bytes.len() - start,
                    "truncated audit record at end of log; ignoring"
                );
                break;
            }
            Err(RecordError::Malformed(reason)) => {
                return Err(AuditLogError::Corrupt {
                    path: path.display().to_string(),
                    offset: start as u64,
                    reason,
                });
            }
        }
    }

    Ok(result)
}

fn read_image(path: &Path) -> Result<Option<Vec<u8>>, AuditLogError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn encode_record(rev: Revision, author: &str, notes: &str) -> Result<Vec<u8>, AuditLogError> {
    let mut out = Vec::with_capacity(12 + author.len() + notes.len());
    out.extend_from_slice(&i64::from(rev).to_be_bytes());
    for (field, value) in [("author", author), ("notes", notes)] {
        let len = u16::try_from(value.len()).map_err(|_| AuditLogError::FieldTooLong {
            field,
            len: value.len(),
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    Ok(out)
}

/// Reader and appender for a definition's audit log.
pub struct AuditLog;

impl AuditLog {
    /// Read every record in the log of the definition stored in `dir`.
    ///
    /// A missing log yields an empty map. If a revision appears more than
    /// once, the later record wins.
    ///
    /// # Errors
    ///
    /// [`AuditLogError::Corrupt`] if a complete record is malformed.
    pub fn read_all(dir: &Path) -> Result<BTreeMap<Revision, AuditEntry>, AuditLogError> {
        let path = RepoPaths::head_file(dir);
        match read_image(&path)? {
            Some(bytes) => Ok(scan(&bytes, &path)?.records),
            None => Ok(BTreeMap::new()),
        }
    }

    /// The header field: offset at which the most recent record begins.
    ///
    /// Informational only; readers always scan from the start.
    pub fn last_record_offset(dir: &Path) -> Result<Option<u64>, AuditLogError> {
        let path = RepoPaths::head_file(dir);
        let Some(bytes) = read_image(&path)? else {
            return Ok(None);
        };
        if (bytes.len() as u64) < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; 8];
        header.copy_from_slice(&bytes[..8]);
        Ok(u64::try_from(i64::from_be_bytes(header)).ok())
    }

    /// Append a record through the held definition lock.
    ///
    /// Equivalent to [`AuditLog::prepare`] followed immediately by
    /// [`PendingRecord::commit`]. Returns the offset written to the header.
    pub fn append(
        lock: &mut DefinitionLock,
        rev: Revision,
        author: &str,
        notes: &str,
    ) -> Result<u64, AuditLogError> {
        Self::prepare(lock, rev, author, notes)?.commit(lock)
    }

    /// Validate and place a record without writing anything.
    ///
    /// Encodes the record (rejecting oversized fields) and scans the current
    /// log through the held lock (rejecting a corrupt log). The returned
    /// [`PendingRecord`] must be committed under the same lock acquisition.
    pub fn prepare(
        lock: &mut DefinitionLock,
        rev: Revision,
        author: &str,
        notes: &str,
    ) -> Result<PendingRecord, AuditLogError> {
        let record = encode_record(rev, author, notes)?;
        let path = lock.path().to_path_buf();
        let file = lock.file_mut().ok_or(AuditLogError::NotLocked)?;

        let mut image = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut image)?;
        let existing = scan(&image, &path)?;

        let offset = existing.valid_end.max(HEADER_LEN);
        let header = i64::try_from(offset).map_err(|_| AuditLogError::Corrupt {
            path: path.display().to_string(),
            offset,
            reason: "log exceeds i64 offsets".into(),
        })?;
        let truncate_to = ((image.len() as u64) > existing.valid_end).then(|| {
            if existing.valid_end >= HEADER_LEN {
                warn!(
                    path = %path.display(),
                    from = image.len(),
                    to = existing.valid_end,
                    "discarding partial audit record before append"
                );
            }
            existing.valid_end
        });

        Ok(PendingRecord {
            rev,
            record,
            offset,
            header,
            truncate_to,
            previous: existing.header_offset,
        })
    }
}

/// A validated audit record, placed but not yet written.
#[derive(Debug)]
pub struct PendingRecord {
    rev: Revision,
    record: Vec<u8>,
    offset: u64,
    header: i64,
    /// Length to cut the file to first, when a torn tail is present.
    truncate_to: Option<u64>,
    previous: Option<i64>,
}

impl PendingRecord {
    /// Offset the record will start at.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Write the header and the record through `lock`.
    ///
    /// Returns the offset written to the header.
    pub fn commit(self, lock: &mut DefinitionLock) -> Result<u64, AuditLogError> {
        let path = lock.path().to_path_buf();
        let file = lock.file_mut().ok_or(AuditLogError::NotLocked)?;

        if let Some(len) = self.truncate_to {
            file.set_len(len)?;
        }
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.header.to_be_bytes())?;
        file.seek(SeekFrom::Start(self.offset))?;
        file.write_all(&self.record)?;
        file.flush()?;
        file.sync_data()?;

        debug!(
            path = %path.display(),
            revision = %self.rev,
            offset = self.offset,
            previous = ?self.previous,
            "audit record appended"
        );
        Ok(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn rev(n: u32) -> Revision {
        Revision::new(n).unwrap()
    }

    fn append(dir: &Path, n: u32, author: &str, notes: &str) -> u64 {
        let mut lock = DefinitionLock::acquire(dir).expect("acquire");
        AuditLog::append(&mut lock, rev(n), author, notes).expect("append")
    }

    fn head_bytes(dir: &Path) -> Vec<u8> {
        fs::read(RepoPaths::head_file(dir)).unwrap()
    }

    #[test]
    fn missing_log_reads_empty() {
        let temp = TempDir::new().unwrap();
        assert!(AuditLog::read_all(temp.path()).unwrap().is_empty());
        assert_eq!(AuditLog::last_record_offset(temp.path()).unwrap(), None);
    }

    #[test]
    fn empty_lock_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let _lock = DefinitionLock::acquire(temp.path()).unwrap();
        assert!(AuditLog::read_all(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn first_append_starts_after_header() {
        let temp = TempDir::new().unwrap();
        assert_eq!(append(temp.path(), 1, "alice", "init"), HEADER_LEN);

        let bytes = head_bytes(temp.path());
        assert_eq!(&bytes[..8], &8i64.to_be_bytes());
        assert_eq!(&bytes[8..16], &1i64.to_be_bytes());
        assert_eq!(&bytes[16..18], &5u16.to_be_bytes());
        assert_eq!(&bytes[18..23], b"alice");
        assert_eq!(&bytes[23..25], &4u16.to_be_bytes());
        assert_eq!(&bytes[25..29], b"init");
        assert_eq!(bytes.len(), 29);
    }

    #[test]
    fn header_tracks_most_recent_record() {
        let temp = TempDir::new().unwrap();
        let first = append(temp.path(), 1, "alice", "init");
        let second = append(temp.path(), 2, "bob", "raise");

        assert_eq!(first, 8);
        assert_eq!(second, 29);
        assert_eq!(AuditLog::last_record_offset(temp.path()).unwrap(), Some(29));
    }

    #[test]
    fn read_all_returns_every_record() {
        let temp = TempDir::new().unwrap();
        append(temp.path(), 1, "alice", "init");
        append(temp.path(), 2, "bob", "");
        append(temp.path(), 3, "", "unicode ✓ notes");

        let records = AuditLog::read_all(temp.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[&rev(1)].author, "alice");
        assert_eq!(records[&rev(1)].notes, "init");
        assert_eq!(records[&rev(2)].notes, "");
        assert_eq!(records[&rev(3)].notes, "unicode ✓ notes");
    }

    #[test]
    fn truncated_tail_is_end_of_log() {
        let temp = TempDir::new().unwrap();
        append(temp.path(), 1, "alice", "init");
        append(temp.path(), 2, "bob", "second");

        let bytes = head_bytes(temp.path());
        let cut = bytes.len() - 3;
        fs::write(RepoPaths::head_file(temp.path()), &bytes[..cut]).unwrap();

        let records = AuditLog::read_all(temp.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records.contains_key(&rev(1)));
    }

    #[test]
    fn tail_cut_inside_revision_field_is_end_of_log() {
        let temp = TempDir::new().unwrap();
        append(temp.path(), 1, "alice", "init");
        let mut file = OpenOptions::new()
            .append(true)
            .open(RepoPaths::head_file(temp.path()))
            .unwrap();
        file.write_all(&[0, 0, 0]).unwrap();

        assert_eq!(AuditLog::read_all(temp.path()).unwrap().len(), 1);
    }

    #[test]
    fn append_discards_partial_tail() {
        let temp = TempDir::new().unwrap();
        append(temp.path(), 1, "alice", "init");
        let good_len = head_bytes(temp.path()).len() as u64;
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(RepoPaths::head_file(temp.path()))
                .unwrap();
            file.write_all(&2i64.to_be_bytes()).unwrap();
            file.write_all(&[0, 9, b'b']).unwrap();
        }

        let offset = append(temp.path(), 2, "bob", "after crash");
        assert_eq!(offset, good_len);

        let records = AuditLog::read_all(temp.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[&rev(2)].notes, "after crash");
    }

    #[test]
    fn invalid_utf8_mid_log_is_corruption() {
        let temp = TempDir::new().unwrap();
        append(temp.path(), 1, "alice", "init");
        append(temp.path(), 2, "bob", "next");

        let mut bytes = head_bytes(temp.path());
        bytes[18] = 0xff;
        fs::write(RepoPaths::head_file(temp.path()), &bytes).unwrap();

        let err = AuditLog::read_all(temp.path()).unwrap_err();
        match err {
            AuditLogError::Corrupt { offset, .. } => assert_eq!(offset, 8),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_revision_is_corruption() {
        let temp = TempDir::new().unwrap();
        let mut bytes = 8i64.to_be_bytes().to_vec();
        bytes.extend_from_slice(&(-4i64).to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        fs::write(RepoPaths::head_file(temp.path()), &bytes).unwrap();

        assert!(matches!(
            AuditLog::read_all(temp.path()),
            Err(AuditLogError::Corrupt { .. })
        ));
    }

    #[test]
    fn append_refuses_corrupt_log() {
        let temp = TempDir::new().unwrap();
        let mut bytes = 8i64.to_be_bytes().to_vec();
        bytes.extend_from_slice(&0i64.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        fs::write(RepoPaths::head_file(temp.path()), &bytes).unwrap();

        let mut lock = DefinitionLock::acquire(temp.path()).unwrap();
        let result = AuditLog::append(&mut lock, rev(1), "a", "b");
        assert!(matches!(result, Err(AuditLogError::Corrupt { .. })));
    }

    #[test]
    fn oversized_field_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut lock = DefinitionLock::acquire(temp.path()).unwrap();
        let notes = "x".repeat(u16::MAX as usize + 1);

        let result = AuditLog::append(&mut lock, rev(1), "alice", &notes);
        assert!(matches!(
            result,
            Err(AuditLogError::FieldTooLong { field: "notes", .. })
        ));
        assert_eq!(head_bytes(temp.path()).len(), 0, "nothing written");
    }

    #[test]
    fn append_after_release_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut lock = DefinitionLock::acquire(temp.path()).unwrap();
        lock.release().unwrap();

        assert!(matches!(
            AuditLog::append(&mut lock, rev(1), "a", "b"),
            Err(AuditLogError::NotLocked)
        ));
    }

    #[test]
    fn later_duplicate_wins() {
        let temp = TempDir::new().unwrap();
        append(temp.path(), 1, "alice", "first");
        append(temp.path(), 1, "bob", "second");

        let records = AuditLog::read_all(temp.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[&rev(1)].author, "bob");
    }

    #[test]
    fn prepare_writes_nothing_until_commit() {
        let temp = TempDir::new().unwrap();
        append(temp.path(), 1, "alice", "init");
        let before = head_bytes(temp.path());

        let mut lock = DefinitionLock::acquire(temp.path()).unwrap();
        let pending = AuditLog::prepare(&mut lock, rev(2), "bob", "next").unwrap();
        assert_eq!(pending.offset(), before.len() as u64);
        assert_eq!(head_bytes(temp.path()), before);

        assert_eq!(pending.commit(&mut lock).unwrap(), before.len() as u64);
        assert_eq!(AuditLog::read_all(temp.path()).unwrap()[&rev(2)].author, "bob");
    }
}
