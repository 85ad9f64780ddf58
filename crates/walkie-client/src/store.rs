//! Durable storage for the outbox.
//!
//! Entries are keyed by message id and listed in insertion order.
//! [`FileStore`] keeps a JSON array on disk and rewrites it atomically
//! (temp file + rename) after every change.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use walkie_common::StorageError;

use crate::outbox::OutboxEntry;

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert an entry, replacing any entry with the same id in place.
    async fn put(&self, entry: OutboxEntry) -> Result<(), StorageError>;

    /// Remove by id. Returns whether an entry was removed.
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;

    /// All entries, oldest first.
    async fn list(&self) -> Result<Vec<OutboxEntry>, StorageError>;
}

fn upsert(entries: &mut Vec<OutboxEntry>, entry: OutboxEntry) {
    match entries.iter_mut().find(|e| e.id() == entry.id()) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

fn remove_by_id(entries: &mut Vec<OutboxEntry>, id: &str) -> bool {
    let before = entries.len();
    entries.retain(|e| e.id() != id);
    entries.len() != before
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Non-persistent store, used when no data directory is available.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<OutboxEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn put(&self, entry: OutboxEntry) -> Result<(), StorageError> {
        upsert(&mut *self.entries.lock().await, entry);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        Ok(remove_by_id(&mut *self.entries.lock().await, id))
    }

    async fn list(&self) -> Result<Vec<OutboxEntry>, StorageError> {
        Ok(self.entries.lock().await.clone())
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Vec<OutboxEntry>>,
}

impl FileStore {
    /// Open (or create on first write) the store at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "Outbox opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &[OutboxEntry]) -> Result<(), StorageError> {
        let parent = self.path.parent().ok_or_else(|| {
            StorageError::PathUnavailable(self.path.display().to_string())
        })?;
        tokio::fs::create_dir_all(parent).await?;

        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for FileStore {
    async fn put(&self, entry: OutboxEntry) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        upsert(&mut entries, entry);
        self.persist(&entries).await
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock().await;
        if !remove_by_id(&mut entries, id) {
            return Ok(false);
        }
        self.persist(&entries).await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<OutboxEntry>, StorageError> {
        Ok(self.entries.lock().await.clone())
    }
}
