//! # Error Types
//!
//! Purpose: One error enum for every failure the pool, its links and the
//! command façade can surface.
//!
//! ## Design Principles
//! 1. **Single Vocabulary**: Transport, protocol and pool errors share one type
//!    so `?` works across crate boundaries without conversions.
//! 2. **Fail Fast**: `PoolExhausted` is surfaced directly and never retried.
//! 3. **Binary-Safe Messages**: Server error replies keep their raw bytes.

use thiserror::Error;

use crate::id::ConnectionId;

/// Result type used across the workspace.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the pool, its links and the command façade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,
    /// Server returned an error reply.
    #[error("server error: {}", String::from_utf8_lossy(.message))]
    Server { message: Vec<u8> },
    /// Response type did not match the expected command response.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// Pool is at capacity and no free connection is available.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Pool was shut down.
    #[error("connection pool is closed")]
    PoolClosed,
    /// Address could not be used to open a link.
    #[error("invalid address")]
    InvalidAddress,
    /// Configuration failed validation or parsing.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The link no longer accepts commands.
    #[error("connection closed")]
    ConnectionClosed,
    /// The link went away while a command was outstanding.
    #[error("connection lost before a reply arrived")]
    ConnectionLost,
    /// No connection with this id exists in the pool.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    /// The connection is already checked out.
    #[error("connection {0} is already in use")]
    ConnectionBusy(ConnectionId),
    /// Binary payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ClientError {
    /// Returns true when the error means the link itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Protocol
                | ClientError::ConnectionClosed
                | ClientError::ConnectionLost
        )
    }
}
