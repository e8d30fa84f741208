//! # Link Contract
//!
//! Purpose: Describe the minimal capability set the pool needs from one
//! backend connection, so any wire client can sit behind the pool.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: The pool only sees `Link`/`LinkFactory`; `TcpLink`
//!    is one implementation, test doubles are another.
//! 2. **Observe, Don't Drive**: Lifecycle transitions come from the link as
//!    `LinkEvent`s; the pool reacts but never forces a state.
//! 3. **Scheduling Input**: `pending()` exposes queue depth for least-busy
//!    selection.
//!
//! ## Lifecycle
//!
//! ```text
//! Created -> Connecting -> Ready <-> { Disconnected, Reconnecting }
//!                                  -> Closed | Failed
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use kvp_common::ClientResult;

use crate::resp::RespValue;

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Constructed, nothing attempted yet.
    Created,
    /// Opening the transport.
    Connecting,
    /// Accepting commands.
    Ready,
    /// Transport lost.
    Disconnected,
    /// Retrying the transport.
    Reconnecting,
    /// Closed on request (terminal).
    Closed,
    /// Gave up after a fatal error (terminal).
    Failed,
}

impl LinkState {
    /// Returns true for `Closed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Closed | LinkState::Failed)
    }
}

/// Events a link reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Transport is being opened.
    Connecting,
    /// Transport is established.
    Connected,
    /// Link accepts commands.
    Ready,
    /// Transport was lost; outstanding commands failed.
    Disconnected,
    /// Reconnect attempt `attempt` (1-based) is starting.
    Reconnecting { attempt: usize },
    /// Link gave up; no further events follow.
    Fatal(String),
    /// Link was closed on request; no further events follow.
    Closed,
    /// Pub/sub delivery frame.
    Push(RespValue),
}

/// Receiving side of a link's event stream.
pub type LinkEvents = mpsc::UnboundedReceiver<LinkEvent>;

/// One backend connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Issues one raw command and waits for its reply.
    async fn call(&self, args: Vec<Vec<u8>>) -> ClientResult<RespValue>;

    /// Commands issued but not yet answered.
    fn pending(&self) -> usize;

    /// Current lifecycle state.
    fn state(&self) -> LinkState;

    /// Closes the link; later calls fail with `ConnectionClosed`.
    async fn close(&self) -> ClientResult<()>;
}

/// Opens links. Implementations carry their own connection options and pass
/// them through untouched.
#[async_trait]
pub trait LinkFactory: Send + Sync + 'static {
    /// Opens a link and returns it with its event stream.
    ///
    /// Events emitted while opening (`Connecting`, `Connected`, `Ready`) are
    /// already queued on the returned stream.
    async fn open(&self) -> ClientResult<(Arc<dyn Link>, LinkEvents)>;
}
