//! Audit event recorder: the write side of the compliance pipeline.
//!
//! `AuditRecorder` turns caller intents into classified, enriched
//! `AuditEntry` records, persists them through a bounded local buffer plus
//! a remote sink, and raises alerts for high/critical events. Its cardinal
//! rule: no failure inside the logging path ever reaches the business
//! operation being audited.

mod export;
mod recorder;
mod report;
mod retry;

pub use export::{entries_to_csv, entries_to_json};
pub use recorder::{AuditRecorder, Details, RecorderError};
pub use report::generate_report;
pub use retry::RetryQueue;
