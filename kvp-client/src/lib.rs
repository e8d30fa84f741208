//! # KVPool Client
//!
//! Purpose: Provide an async, pooled client for Redis-compatible backends
//! that multiplexes commands over a bounded set of links and dedicates one
//! link to pattern publish/subscribe.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse links within `minPool..=maxPool`, evict
//!    idle ones on a TTL and replace failed ones.
//! 2. **Strategy Pattern**: The pool drives any `Link`; `TcpLink` is the
//!    bundled RESP2 implementation.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod client;
mod link;
mod pool;
mod pubsub;
mod resp;
mod tcp;

pub use client::{PoolClient, Reply};
pub use link::{Link, LinkEvent, LinkEvents, LinkFactory, LinkState};
pub use pool::{PoolManager, PoolStats, PooledLink};
pub use resp::RespValue;
pub use tcp::{LinkOptions, TcpLink, TcpLinkFactory};

pub use kvp_common::{
    ClientError, ClientResult, ConnectionId, Payload, PoolConfig, PoolEvent, PubSubMessage,
};
