//! JSONL file-backed stores (persist across restarts).
//!
//! One JSON object per line. Malformed lines are skipped on read so a
//! partially written tail cannot make the whole log unreadable.

use async_trait::async_trait;
use custos_types::{
    AuditEntry, AuditLogFilter, AuditStore, AuditStoreError, RetryStore, RetryStoreError,
};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::DEFAULT_RING_CAPACITY;

async fn read_entries(path: &Path) -> std::io::Result<Vec<AuditEntry>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str(line) {
            out.push(entry);
        }
    }
    Ok(out)
}

async fn append_line(path: &Path, entry: &AuditEntry) -> std::io::Result<()> {
    let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
    let mut f = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    f.write_all(format!("{}\n", line).as_bytes()).await
}

async fn rewrite(path: &Path, entries: &[AuditEntry]) -> std::io::Result<()> {
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(&serde_json::to_string(entry).map_err(std::io::Error::other)?);
        buf.push('\n');
    }
    tokio::fs::write(path, buf).await
}

/// JSONL audit buffer with the same bounded-ring contract as the in-memory
/// store. The newest `capacity` lines are live; the file may hold up to
/// twice that before it is compacted, so steady-state appends write one
/// line instead of re-reading the log. `clear` renames the file to a
/// timestamped archive.
pub struct JsonlAuditStore {
    path: PathBuf,
    capacity: usize,
    /// Total line count of the file, lazily initialized from disk. Guards
    /// writes as well.
    line_count: Mutex<Option<usize>>,
}

impl JsonlAuditStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_capacity(path, DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            capacity,
            line_count: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        let mut cached = self.line_count.lock().await;
        let mut count = match *cached {
            Some(c) => c,
            None => read_entries(&self.path)
                .await
                .map_err(|e| AuditStoreError::Other(e.to_string()))?
                .len(),
        };

        append_line(&self.path, &entry)
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        count += 1;

        if count >= self.capacity.saturating_mul(2).max(2) {
            let entries = read_entries(&self.path)
                .await
                .map_err(|e| AuditStoreError::Other(e.to_string()))?;
            let keep = &entries[entries.len().saturating_sub(self.capacity)..];
            rewrite(&self.path, keep)
                .await
                .map_err(|e| AuditStoreError::Other(e.to_string()))?;
            count = keep.len();
        }

        *cached = Some(count);
        Ok(())
    }

    async fn list(&self, filter: &AuditLogFilter) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let entries = read_entries(&self.path)
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        // Lines past the ring bound are awaiting compaction; skip them.
        Ok(entries
            .into_iter()
            .rev()
            .take(self.capacity)
            .filter(|e| filter.matches(e))
            .collect())
    }

    async fn clear(&self) -> Result<usize, AuditStoreError> {
        let mut cached = self.line_count.lock().await;
        let entries = read_entries(&self.path)
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        if entries.is_empty() {
            *cached = Some(0);
            return Ok(0);
        }
        let archive = self.path.with_extension(format!(
            "{}.archived",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        tokio::fs::rename(&self.path, &archive)
            .await
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        *cached = Some(0);
        Ok(entries.len().min(self.capacity))
    }
}

/// JSONL failed-writes queue. Unbounded; drained by the retry queue.
pub struct JsonlRetryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRetryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl RetryStore for JsonlRetryStore {
    async fn enqueue(&self, entry: AuditEntry) -> Result<(), RetryStoreError> {
        let _guard = self.write_lock.lock().await;
        append_line(&self.path, &entry)
            .await
            .map_err(|e| RetryStoreError::Other(e.to_string()))
    }

    async fn take_all(&self) -> Result<Vec<AuditEntry>, RetryStoreError> {
        let _guard = self.write_lock.lock().await;
        let entries = read_entries(&self.path)
            .await
            .map_err(|e| RetryStoreError::Other(e.to_string()))?;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RetryStoreError::Other(e.to_string())),
        }
        Ok(entries)
    }

    async fn requeue(&self, entries: Vec<AuditEntry>) -> Result<(), RetryStoreError> {
        let _guard = self.write_lock.lock().await;
        for entry in &entries {
            append_line(&self.path, entry)
                .await
                .map_err(|e| RetryStoreError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, RetryStoreError> {
        let entries = read_entries(&self.path)
            .await
            .map_err(|e| RetryStoreError::Other(e.to_string()))?;
        Ok(entries.len())
    }
}
