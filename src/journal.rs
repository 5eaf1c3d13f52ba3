// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Append-only reading journal.
//!
//! Newline-delimited JSON, one reading per line, UTF-8. Append is the only
//! mutation: records are never rewritten, reordered, or truncated by this
//! module. Each append is flushed and fsynced before returning so a caller
//! may acknowledge the source message once `append` succeeds.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One sensor observation.
///
/// The payload is an arbitrary JSON value passed through verbatim; no schema
/// is imposed here. Decoding a journal line and re-encoding yields a
/// semantically equal reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(pub serde_json::Value);

impl Reading {
    /// Parse a reading from raw message bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Reading)
    }

    /// Borrow the underlying JSON value.
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Journal errors.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode reading: {0}")]
    Encode(serde_json::Error),

    #[error("corrupt journal record at line {line}: {source}")]
    Corrupt {
        line: u64,
        source: serde_json::Error,
    },
}

/// Append-only NDJSON journal of readings.
///
/// Holds no open file handle: each append is a scoped open/write/sync so a
/// crash mid-write cannot affect prior records, and a listener and an
/// uploader process can share the file under the single-writer,
/// single-reader discipline.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Create a journal handle for the given path.
    ///
    /// The file itself is created on first append.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one reading as a single line and fsync.
    ///
    /// Returns only after the record is durable. Uses `O_APPEND` open
    /// semantics so concurrent readers never observe interleaved lines.
    pub fn append(&self, reading: &Reading) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(&reading.0).map_err(JournalError::Encode)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()?;

        Ok(())
    }

    /// Read all records at index `start` and later, in append order.
    ///
    /// Returns `(index, reading)` pairs where `index` is the zero-based line
    /// number. A missing journal file yields an empty backlog. A torn final
    /// line (crash artifact from an interrupted append) is skipped with a
    /// warning; an unparseable line anywhere else is a corrupt journal.
    pub fn read_from(&self, start: u64) -> Result<Vec<(u64, Reading)>, JournalError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<String> = BufReader::new(file).lines().collect::<Result<_, _>>()?;
        let last = lines.len().saturating_sub(1);

        let mut records = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str(line) {
                Ok(value) => {
                    if index as u64 >= start {
                        records.push((index as u64, Reading(value)));
                    }
                }
                Err(_) if index == last => {
                    tracing::warn!(line = index, "skipping torn final journal line");
                    break;
                }
                Err(source) => {
                    return Err(JournalError::Corrupt {
                        line: index as u64,
                        source,
                    });
                }
            }
        }

        Ok(records)
    }

    /// Number of records in the journal (0 if the file does not exist).
    pub fn len(&self) -> Result<u64, JournalError> {
        Ok(self.read_from(0)?.len() as u64)
    }

    /// True if the journal has no records.
    pub fn is_empty(&self) -> Result<bool, JournalError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_append_preserves_order() {
        let dir = tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("readings.jsonl"));

        journal
            .append(&Reading(json!({"batchId": 1, "temp": 22})))
            .expect("append");
        journal
            .append(&Reading(json!({"batchId": 1, "temp": 23})))
            .expect("append");
        journal
            .append(&Reading(json!({"batchId": 2, "temp": 19})))
            .expect("append");

        let records = journal.read_from(0).expect("read");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].0, 0);
        assert_eq!(records[0].1 .0, json!({"batchId": 1, "temp": 22}));
        assert_eq!(records[2].0, 2);
        assert_eq!(records[2].1 .0, json!({"batchId": 2, "temp": 19}));
    }

    #[test]
    fn test_read_from_offset() {
        let dir = tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("readings.jsonl"));

        for i in 0..5 {
            journal.append(&Reading(json!({"seq": i}))).expect("append");
        }

        let records = journal.read_from(3).expect("read");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 3);
        assert_eq!(records[0].1 .0, json!({"seq": 3}));
        assert_eq!(records[1].0, 4);
    }

    #[test]
    fn test_missing_file_is_empty_backlog() {
        let dir = tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("absent.jsonl"));

        assert!(journal.read_from(0).expect("read").is_empty());
        assert_eq!(journal.len().expect("len"), 0);
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let dir = tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("readings.jsonl"));

        let payload = json!({
            "batch_id": "B-2031",
            "rfid_tag": "RF99",
            "temperature": 21.5,
            "humidity": 48,
            "gps": {"lat": 48.137, "lon": 11.575},
        });
        journal.append(&Reading(payload.clone())).expect("append");

        let records = journal.read_from(0).expect("read");
        assert_eq!(records[0].1 .0, payload);
    }

    #[test]
    fn test_torn_final_line_is_skipped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("readings.jsonl");
        let journal = Journal::new(&path);

        journal.append(&Reading(json!({"seq": 0}))).expect("append");
        // Simulate a crash mid-append: partial JSON without trailing newline.
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open")
            .write_all(b"{\"seq\": 1, \"te")
            .expect("write");

        let records = journal.read_from(0).expect("read");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1 .0, json!({"seq": 0}));
    }

    #[test]
    fn test_corrupt_interior_line_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("readings.jsonl");
        let journal = Journal::new(&path);

        std::fs::write(&path, "not json\n{\"seq\": 1}\n").expect("write");

        match journal.read_from(0) {
            Err(JournalError::Corrupt { line, .. }) => assert_eq!(line, 0),
            other => panic!("expected Corrupt, got: {:?}", other),
        }
    }
}
