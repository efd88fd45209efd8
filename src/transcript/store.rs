//! Session persistence: one JSON file per session, named by start time.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::PersistenceError;

use super::types::SessionRecord;

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistenceError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Write (or overwrite) the record's file. The filename is derived
    /// from the session start time, so autosaves and the final seal all
    /// land on the same file.
    pub fn save(&self, record: &SessionRecord) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(record);
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&path, json).map_err(|source| PersistenceError::Write {
            path: path.clone(),
            source,
        })?;
        info!(
            "Saved session {} ({} transcripts) to {}",
            record.id,
            record.transcripts.len(),
            path.display()
        );
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<SessionRecord, PersistenceError> {
        let bytes = fs::read(path).map_err(|source| PersistenceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Session files on disk, unordered.
    pub fn list(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect()
    }

    fn path_for(&self, record: &SessionRecord) -> PathBuf {
        self.dir.join(format!(
            "session-{}.json",
            record.start_time.format("%Y%m%d-%H%M%S")
        ))
    }
}
