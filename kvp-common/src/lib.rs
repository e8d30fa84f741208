// kvp-common - Shared types for the KVPool connection pool
//
// This crate defines the error type, pool configuration, connection ids,
// pool events and the binary-safe payload codec shared by the client crates.

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod id;

// Re-export for convenience
pub use codec::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use id::*;
