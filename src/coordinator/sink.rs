//! Destinations for finished archives.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::capture::CaptureError;

/// The download facility: takes archive bytes and a suggested filename.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Store `bytes` as `filename`, returning where it ended up.
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, CaptureError>;
}

/// Writes archives into a directory.
///
/// Files are written to a temporary file first and then moved into place.
/// Unless `overwrite` is set, an existing `name.zip` makes the sink pick
/// `name (1).zip`, `name (2).zip`, and so on.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    overwrite: bool,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[async_trait]
impl ArchiveSink for DirectorySink {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, CaptureError> {
        let dir = self.dir.clone();
        let overwrite = self.overwrite;
        let filename = filename.to_string();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || write_into(&dir, &filename, &bytes, overwrite))
            .await
            .map_err(|e| CaptureError::Save(format!("save task failed: {}", e)))?
    }
}

fn write_into(
    dir: &Path,
    filename: &str,
    bytes: &[u8],
    overwrite: bool,
) -> Result<PathBuf, CaptureError> {
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;

    if overwrite {
        let path = dir.join(filename);
        tmp.persist(&path)
            .map_err(|e| CaptureError::Save(e.error.to_string()))?;
        return Ok(path);
    }

    // Another writer can take a free name between the check and the move;
    // persist_noclobber fails in that case and the next candidate is tried.
    let mut n = 0u32;
    loop {
        let path = dir.join(numbered(filename, n));
        if !path.exists() {
            match tmp.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => tmp = e.file,
                Err(e) => return Err(CaptureError::Save(e.error.to_string())),
            }
        }
        n = n
            .checked_add(1)
            .ok_or_else(|| CaptureError::Save(format!("no free name for {}", filename)))?;
    }
}

/// `name.zip` for 0, `name (n).zip` otherwise.
fn numbered(filename: &str, n: u32) -> String {
    if n == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", filename, n),
    }
}

/// Keeps saved archives in memory, keyed by filename.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    order: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<Vec<u8>> {
        self.saved.lock().get(filename).cloned()
    }

    /// Filenames in the order they were saved
    pub fn filenames(&self) -> Vec<String> {
        self.order.lock().clone()
    }
}

#[async_trait]
impl ArchiveSink for MemorySink {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, CaptureError> {
        self.saved.lock().insert(filename.to_string(), bytes.to_vec());
        self.order.lock().push(filename.to_string());
        Ok(PathBuf::from(filename))
    }
}
