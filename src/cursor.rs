// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Durable upload cursor.
//!
//! A small JSON state file holding the index of the next journal record to
//! upload, plus the rejected-attempt count for that record. Updates are
//! write-temp-then-rename so a crash between an upload and the cursor write
//! can only cause bounded redelivery, never a torn state file.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upload position state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Index of the next journal record to upload (records before this
    /// index have been confirmed delivered).
    pub position: u64,

    /// Rejected-attempt count for the record currently at `position`.
    #[serde(default)]
    pub reject_attempts: u32,
}

/// Cursor persistence errors.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt cursor file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Atomic cursor state file.
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    /// Create a cursor file handle for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// State file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cursor, defaulting to position 0 if the file does not exist.
    pub fn load(&self) -> Result<Cursor, CursorError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Cursor::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the cursor atomically: write a sibling temp file, fsync,
    /// then rename over the state file.
    pub fn store(&self, cursor: Cursor) -> Result<(), CursorError> {
        let tmp = self.path.with_extension("tmp");

        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(&cursor)?)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
