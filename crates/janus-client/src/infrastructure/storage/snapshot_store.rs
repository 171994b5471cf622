//! Snapshot sinks: where captured bytes end up.
//!
//! [`FileSnapshotStore`] lays images out as
//! `<output_dir>/<source_id>/<YYYYmmdd_HHMMSS>.jpg`.  Two captures of the same
//! source within one second get a `_1`, `_2`, … suffix rather than
//! overwriting each other.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use janus_core::SourceId;
use tracing::debug;

use crate::application::error::GatewayError;
use crate::application::ports::SnapshotSink;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Writes snapshots below one output directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates `<stem>.jpg`, or the first free `<stem>_<n>.jpg`, and writes
    /// `bytes` to it.  Creation is exclusive, so concurrent saves of the same
    /// second never share a file.
    fn write_new(dir: &Path, stem: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        for n in 0u32.. {
            let path = match n {
                0 => dir.join(format!("{stem}.jpg")),
                n => dir.join(format!("{stem}_{n}.jpg")),
            };
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };
            file.write_all(bytes)?;
            return Ok(path);
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for {stem}"),
        ))
    }
}

impl SnapshotSink for FileSnapshotStore {
    fn save(
        &self,
        source: SourceId,
        taken_at: DateTime<Local>,
        bytes: &[u8],
    ) -> Result<PathBuf, GatewayError> {
        let dir = self.root.join(source.to_string());
        std::fs::create_dir_all(&dir)
            .map_err(|e| GatewayError::Storage(format!("create {}: {e}", dir.display())))?;

        let stem = taken_at.format(TIMESTAMP_FORMAT).to_string();
        let path = Self::write_new(&dir, &stem, bytes).map_err(|e| {
            GatewayError::Storage(format!("write {}/{stem}.jpg: {e}", dir.display()))
        })?;

        debug!("stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }
}

/// Keeps snapshots in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    saved: Mutex<Vec<(SourceId, Vec<u8>)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far, in save order.
    pub fn saved(&self) -> Vec<(SourceId, Vec<u8>)> {
        self.saved.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl SnapshotSink for MemorySnapshotStore {
    fn save(
        &self,
        source: SourceId,
        taken_at: DateTime<Local>,
        bytes: &[u8],
    ) -> Result<PathBuf, GatewayError> {
        let mut saved = self.saved.lock().unwrap_or_else(|p| p.into_inner());
        saved.push((source, bytes.to_vec()));
        Ok(PathBuf::from(format!(
            "memory/{source}/{}.jpg",
            taken_at.format(TIMESTAMP_FORMAT)
        )))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
