//! Core types and traits for the custos compliance audit pipeline.
//!
//! Entry/alert DTOs serialize to JSON for both the local JSONL collections
//! and the remote sink wire format.

mod dto;
mod traits;

pub use dto::*;
pub use traits::*;
