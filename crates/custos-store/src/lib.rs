//! Store implementations for the audit pipeline.
//!
//! In-memory stores cover process-lifetime buffering and tests; JSONL
//! stores persist across restarts. `HttpRemoteSink` talks to the remote
//! system of record.

mod http;
mod jsonl;
mod memory;

pub use http::HttpRemoteSink;
pub use jsonl::{JsonlAuditStore, JsonlRetryStore};
pub use memory::{
    InMemoryAlertStore, InMemoryAuditStore, InMemoryRemoteSink, InMemoryRetryStore,
    DEFAULT_RING_CAPACITY,
};
