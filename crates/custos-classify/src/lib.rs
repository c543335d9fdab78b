//! Pure classification logic: risk taxonomy and PHI content detection.
//!
//! No I/O and no side effects; both halves are deterministic and
//! truth-table testable.

mod phi;
mod taxonomy;

pub use phi::{PhiDetector, PhiFinding, PHI_SCORE_THRESHOLD};
pub use taxonomy::{classify, Classification};
