//! In-memory store implementations (process lifetime only).

use async_trait::async_trait;
use custos_types::{
    AlertStore, AlertStoreError, AuditEntry, AuditLogFilter, AuditStore, AuditStoreError,
    RemoteSink, RemoteSinkError, RetryStore, RetryStoreError, SecurityAlert,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Default bound for the local ring buffer.
pub const DEFAULT_RING_CAPACITY: usize = 500;

struct RingState {
    live: VecDeque<AuditEntry>,
    /// Cleared entries are moved here, not dropped.
    archived: Vec<AuditEntry>,
}

/// Bounded ring buffer of recent entries. Oldest evicted first on overflow;
/// the remote sink is the unbounded system of record.
pub struct InMemoryAuditStore {
    state: RwLock<RingState>,
    capacity: usize,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(RingState {
                live: VecDeque::new(),
                archived: Vec::new(),
            }),
            capacity,
        }
    }

    /// Entries moved aside by `clear`, oldest first.
    pub async fn archived(&self) -> Vec<AuditEntry> {
        self.state.read().await.archived.clone()
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        let mut state = self.state.write().await;
        state.live.push_back(entry);
        while state.live.len() > self.capacity {
            state.live.pop_front();
        }
        Ok(())
    }

    async fn list(&self, filter: &AuditLogFilter) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let state = self.state.read().await;
        Ok(state
            .live
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<usize, AuditStoreError> {
        let mut state = self.state.write().await;
        let cleared: Vec<AuditEntry> = state.live.drain(..).collect();
        let count = cleared.len();
        state.archived.extend(cleared);
        Ok(count)
    }
}

/// Unbounded append-and-drain queue of entries awaiting redelivery.
pub struct InMemoryRetryStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryRetryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryRetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetryStore for InMemoryRetryStore {
    async fn enqueue(&self, entry: AuditEntry) -> Result<(), RetryStoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn take_all(&self) -> Result<Vec<AuditEntry>, RetryStoreError> {
        Ok(std::mem::take(&mut *self.entries.write().await))
    }

    async fn requeue(&self, entries: Vec<AuditEntry>) -> Result<(), RetryStoreError> {
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn len(&self) -> Result<usize, RetryStoreError> {
        Ok(self.entries.read().await.len())
    }
}

/// Append-only alert collection.
pub struct InMemoryAlertStore {
    alerts: RwLock<Vec<SecurityAlert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn append(&self, alert: SecurityAlert) -> Result<(), AlertStoreError> {
        self.alerts.write().await.push(alert);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SecurityAlert>, AlertStoreError> {
        Ok(self.alerts.read().await.clone())
    }
}

/// Remote sink fake: upsert keyed by entry id, with switchable failure
/// injection for exercising the retry path.
pub struct InMemoryRemoteSink {
    entries: RwLock<HashMap<String, AuditEntry>>,
    failing: AtomicBool,
}

impl InMemoryRemoteSink {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `send` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn delivered_count(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn get(&self, id: &str) -> Option<AuditEntry> {
        self.entries.read().await.get(id).cloned()
    }
}

impl Default for InMemoryRemoteSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSink for InMemoryRemoteSink {
    async fn send(&self, entry: &AuditEntry) -> Result<(), RemoteSinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteSinkError::Unavailable("injected failure".to_string()));
        }
        self.entries
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }
}
