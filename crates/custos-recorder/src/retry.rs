//! Failed-write retry queue: buffer entries the remote sink rejected and
//! resend them later.

use custos_types::{AuditEntry, RemoteSink, RetryStats, RetryStore};
use std::sync::Arc;

/// Queue of undelivered entries. `retry_all` is driven by the host
/// application (on a timer or on demand); there is no internal scheduler.
///
/// Re-invocation is idempotent: the sink upserts by entry id, so an entry
/// delivered late and retried again lands on the same record.
pub struct RetryQueue {
    store: Arc<dyn RetryStore>,
    sink: Arc<dyn RemoteSink>,
}

impl RetryQueue {
    pub fn new(store: Arc<dyn RetryStore>, sink: Arc<dyn RemoteSink>) -> Self {
        Self { store, sink }
    }

    /// Buffer an entry the sink rejected. Failures here are logged and
    /// swallowed; the retry queue sits inside the no-escape logging path.
    pub async fn enqueue(&self, entry: AuditEntry) {
        let entry_id = entry.id.clone();
        if let Err(e) = self.store.enqueue(entry).await {
            tracing::error!(entry_id = %entry_id, error = %e, "failed to queue audit entry for retry");
        }
    }

    /// Attempt to resend everything queued. Entries leave the queue only on
    /// confirmed delivery; repeat failures are requeued.
    pub async fn retry_all(&self) -> RetryStats {
        let queued = match self.store.take_all().await {
            Ok(q) => q,
            Err(e) => {
                tracing::error!(error = %e, "failed to drain retry queue");
                return RetryStats::default();
            }
        };

        let attempted = queued.len();
        let mut failed = Vec::new();
        for entry in queued {
            if let Err(e) = self.sink.send(&entry).await {
                tracing::warn!(entry_id = %entry.id, error = %e, "retry delivery failed");
                failed.push(entry);
            }
        }

        let still_queued = failed.len();
        if !failed.is_empty() {
            if let Err(e) = self.store.requeue(failed).await {
                tracing::error!(error = %e, "failed to requeue undelivered audit entries");
            }
        }

        RetryStats {
            attempted,
            delivered: attempted - still_queued,
            still_queued,
        }
    }

    /// Number of entries awaiting redelivery (the dashboard "pending retry"
    /// count).
    pub async fn pending(&self) -> usize {
        self.store.len().await.unwrap_or(0)
    }
}
