use crate::storage::atomic::{remove_if_exists, write_atomically};
use crate::storage::{CheckpointStore, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable record of crawl progress
///
/// Serialized as JSON, e.g.
///
/// ```json
/// { "last_page": 6, "timestamp": "2024-11-19T10:22:03+00:00", "rows": 125, "target": "9f86d081884c7d65" }
/// ```
///
/// `rows` and `target` are optional so checkpoints holding only a page and a
/// timestamp still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Page the next run starts from
    pub last_page: u32,

    /// When the checkpoint was written
    pub timestamp: String,

    /// Dataset rows durably written when this checkpoint was saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,

    /// Identity of the crawl target this checkpoint belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time
    pub fn new(last_page: u32, rows: u64, target: impl Into<String>) -> Self {
        Self {
            last_page,
            timestamp: chrono::Utc::now().to_rfc3339(),
            rows: Some(rows),
            target: Some(target.into()),
        }
    }

    /// Returns true unless the checkpoint names a different target
    pub fn belongs_to(&self, target: &str) -> bool {
        self.target.as_deref().map_or(true, |t| t == target)
    }
}

/// Checkpoint stored as a small JSON file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::CheckpointIo {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let checkpoint =
            serde_json::from_str(&content).map_err(|e| StorageError::CorruptCheckpoint {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        Ok(Some(checkpoint))
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(checkpoint).map_err(|e| {
            StorageError::CorruptCheckpoint {
                path: self.path.clone(),
                message: e.to_string(),
            }
        })?;

        write_atomically(&self.path, |file| file.write_all(&json)).map_err(|e| self.io_error(e))?;

        tracing::trace!(
            "Checkpoint saved: page {} ({} rows)",
            checkpoint.last_page,
            checkpoint.rows.unwrap_or(0)
        );
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        remove_if_exists(&self.path).map_err(|e| self.io_error(e))
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
