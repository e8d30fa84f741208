//! # Connection Identifiers
//!
//! Process-unique ids for pooled connections. Ids come from one global
//! counter, so they never repeat within a process and ascend in creation
//! order (the pool relies on this for its selection tie-break).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id value.
    pub const fn new(value: u64) -> Self {
        ConnectionId(value)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
