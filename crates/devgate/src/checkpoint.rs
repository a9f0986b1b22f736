//! Durable per-thread snapshots of [`ThreadState`].
//!
//! The file store keeps one JSON document per thread. Writes go to a temp file in the same
//! directory and are renamed over the old checkpoint, so a crash leaves either the previous or
//! the new snapshot on disk. Saves to the same thread are serialized; different threads never
//! wait on each other.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::CheckpointError;
use crate::state::{Phase, ThreadState};

const MAX_THREAD_ID_LEN: usize = 128;

/// What a checkpoint looks like on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Per-thread write sequence, starting at 1
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub state: ThreadState,
}

/// A short description of a stored thread
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSummary {
    pub thread_id: String,
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub phase: Phase,
    pub messages: usize,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the latest snapshot, or None if the thread has never been saved
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, CheckpointError>;

    /// Durably record the state, returning the new revision
    async fn save(&self, state: &ThreadState) -> Result<u64, CheckpointError>;

    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError>;

    /// Forget a thread. Deleting an unknown thread is not an error.
    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;
}

/// Thread ids become file names, so keep them to a safe alphabet
pub fn validate_thread_id(thread_id: &str) -> Result<(), CheckpointError> {
    let valid = !thread_id.is_empty()
        && thread_id.len() <= MAX_THREAD_ID_LEN
        && !thread_id.starts_with('.')
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidThreadId(thread_id.to_string()))
    }
}

/// `~/.config/devgate/threads`
pub fn default_threads_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("devgate").join("threads"))
}

pub struct FileCheckpointStore {
    dir: PathBuf,
    /// One lock per thread, guarding the last revision written (None until known)
    locks: Mutex<HashMap<String, Arc<AsyncMutex<Option<u64>>>>>,
}

impl FileCheckpointStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", thread_id))
    }

    fn lock_for(&self, thread_id: &str) -> Arc<AsyncMutex<Option<u64>>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    async fn read_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(thread_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                reason: e.to_string(),
            })?;

        if checkpoint.thread_id != thread_id || checkpoint.state.thread_id != thread_id {
            return Err(CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                reason: format!("file belongs to thread '{}'", checkpoint.thread_id),
            });
        }
        checkpoint
            .state
            .check_consistency()
            .map_err(|reason| CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                reason,
            })?;

        Ok(Some(checkpoint))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, CheckpointError> {
        validate_thread_id(thread_id)?;
        let lock = self.lock_for(thread_id);
        let mut revision = lock.lock().await;

        let checkpoint = self.read_checkpoint(thread_id).await?;
        *revision = Some(checkpoint.as_ref().map_or(0, |c| c.revision));
        Ok(checkpoint.map(|c| c.state))
    }

    async fn save(&self, state: &ThreadState) -> Result<u64, CheckpointError> {
        validate_thread_id(&state.thread_id)?;
        let lock = self.lock_for(&state.thread_id);
        let mut revision = lock.lock().await;

        // A corrupt file is never overwritten; only delete clears it
        let previous = match *revision {
            Some(previous) => previous,
            None => self
                .read_checkpoint(&state.thread_id)
                .await?
                .map_or(0, |c| c.revision),
        };
        let next = previous + 1;

        let checkpoint = Checkpoint {
            thread_id: state.thread_id.clone(),
            revision: next,
            saved_at: Utc::now(),
            state: state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&checkpoint).map_err(|e| CheckpointError::Corrupt {
            thread_id: state.thread_id.clone(),
            reason: e.to_string(),
        })?;

        let dir = self.dir.clone();
        let path = self.path_for(&state.thread_id);
        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &bytes))
            .await
            .map_err(|e| CheckpointError::Io {
                path: self.path_for(&state.thread_id),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })??;

        *revision = Some(next);
        tracing::debug!(thread_id = %state.thread_id, revision = next, "saved checkpoint");
        Ok(next)
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut summaries = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(CheckpointError::Io {
                        path: self.dir.clone(),
                        source,
                    })
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(thread_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_thread_id(thread_id).is_err() {
                continue;
            }
            match self.read_checkpoint(thread_id).await {
                Ok(Some(checkpoint)) => summaries.push(CheckpointSummary {
                    thread_id: checkpoint.thread_id,
                    revision: checkpoint.revision,
                    saved_at: checkpoint.saved_at,
                    phase: checkpoint.state.phase(),
                    messages: checkpoint.state.history().len(),
                }),
                Ok(None) => {}
                Err(error) => tracing::warn!(%thread_id, %error, "skipping unreadable checkpoint"),
            }
        }

        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        validate_thread_id(thread_id)?;
        let lock = self.lock_for(thread_id);
        let mut revision = lock.lock().await;

        let path = self.path_for(thread_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CheckpointError::Io { path, source }),
        }
        *revision = Some(0);
        tracing::info!(%thread_id, "deleted checkpoint");
        Ok(())
    }
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let io_error = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(|source| CheckpointError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut temp = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(bytes).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
