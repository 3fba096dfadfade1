pub use crate::error::{CuResult, Error};
pub use crate::types::{BatchId, ListenSequenceNumber, SnapshotVersion, TargetId, Timestamp};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
