// crates/covenant-audit/src/backend.rs
// ============================================================================
// Module: Audit Backends
// Description: Durable and in-memory storage backends for audit events.
// Purpose: Persist NDJSON event lines and reload them for reconciliation.
// Dependencies: covenant-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Backends store committed audit events as newline-delimited JSON. The file
//! backend appends and fsyncs each line so durability precedes
//! acknowledgement; the memory backend supports tests and ephemeral runs.
//! Backends are dumb byte stores: chaining, sequencing, and verification are
//! the log's responsibility.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use covenant_core::AuditEvent;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backend storage errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Underlying I/O failure.
    #[error("audit backend io error: {0}")]
    Io(String),
    /// Stored line failed to decode as an audit event.
    #[error("audit backend corrupt line {line}: {detail}")]
    Corrupt {
        /// 1-based line number.
        line: usize,
        /// Decode failure detail.
        detail: String,
    },
}

// ============================================================================
// SECTION: Backend Trait
// ============================================================================

/// Storage backend for committed audit events.
pub trait AuditBackend: Send {
    /// Appends one committed event durably.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the event cannot be made durable.
    fn append(&mut self, event: &AuditEvent) -> Result<(), BackendError>;

    /// Loads every stored event in order.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when reading or decoding fails.
    fn load(&mut self) -> Result<Vec<AuditEvent>, BackendError>;

    /// Replaces the stored events wholesale (retention compaction).
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when rewriting fails.
    fn rewrite(&mut self, events: &[AuditEvent]) -> Result<(), BackendError>;
}

// ============================================================================
// SECTION: File Backend
// ============================================================================

/// NDJSON file backend: one JSON event per line, fsynced per append.
///
/// # Invariants
/// - The file is append-only between compactions.
pub struct FileBackend {
    /// Log file path.
    path: PathBuf,
    /// Open append handle.
    file: File,
}

impl FileBackend {
    /// Opens (creating if needed) the NDJSON log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] when the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| BackendError::Io(err.to_string()))?;
        }
        let file = Self::open_append(&path)?;
        Ok(Self {
            path,
            file,
        })
    }

    /// Opens the file in append mode.
    fn open_append(path: &Path) -> Result<File, BackendError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| BackendError::Io(err.to_string()))
    }
}

impl AuditBackend for FileBackend {
    fn append(&mut self, event: &AuditEvent) -> Result<(), BackendError> {
        let line =
            serde_json::to_string(event).map_err(|err| BackendError::Io(err.to_string()))?;
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .and_then(|()| self.file.sync_data())
            .map_err(|err| BackendError::Io(err.to_string()))
    }

    fn load(&mut self) -> Result<Vec<AuditEvent>, BackendError> {
        let file = File::open(&self.path).map_err(|err| BackendError::Io(err.to_string()))?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| BackendError::Io(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent =
                serde_json::from_str(&line).map_err(|err| BackendError::Corrupt {
                    line: index + 1,
                    detail: err.to_string(),
                })?;
            events.push(event);
        }
        Ok(events)
    }

    fn rewrite(&mut self, events: &[AuditEvent]) -> Result<(), BackendError> {
        let tmp_path = self.path.with_extension("ndjson.tmp");
        let mut tmp = File::create(&tmp_path).map_err(|err| BackendError::Io(err.to_string()))?;
        for event in events {
            let line =
                serde_json::to_string(event).map_err(|err| BackendError::Io(err.to_string()))?;
            tmp.write_all(line.as_bytes())
                .and_then(|()| tmp.write_all(b"\n"))
                .map_err(|err| BackendError::Io(err.to_string()))?;
        }
        tmp.sync_data().map_err(|err| BackendError::Io(err.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| BackendError::Io(err.to_string()))?;
        self.file = Self::open_append(&self.path)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Memory Backend
// ============================================================================

/// In-memory backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Stored events in append order.
    events: Vec<AuditEvent>,
}

impl AuditBackend for MemoryBackend {
    fn append(&mut self, event: &AuditEvent) -> Result<(), BackendError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn load(&mut self) -> Result<Vec<AuditEvent>, BackendError> {
        Ok(self.events.clone())
    }

    fn rewrite(&mut self, events: &[AuditEvent]) -> Result<(), BackendError> {
        self.events = events.to_vec();
        Ok(())
    }
}
