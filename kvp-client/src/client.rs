//! # Async Client API
//!
//! Purpose: Expose the pool as a compact `run`/`subscribe`/`unsubscribe`
//! surface, with binary payloads shipped through the text codec.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `PoolClient` hides pooling, framing and the codec.
//! 2. **Release on Every Path**: Each call holds a `PooledLink` guard for the
//!    duration of one command, so errors and dropped futures release too.
//! 3. **Fail Fast**: Error replies surface as `ClientError::Server`.
//! 4. **Typed Payloads**: Arguments and results use `Payload`, so binary data
//!    never gets confused with text.

use std::sync::Arc;

use tokio::sync::broadcast;

use kvp_common::{
    decode_payload, encode_payload, ClientError, ClientResult, Payload, PoolConfig, PoolEvent,
    TextCodec,
};

use crate::link::LinkFactory;
use crate::pool::{PoolManager, PoolStats};
use crate::resp::RespValue;
use crate::tcp::{LinkOptions, TcpLinkFactory};

/// Decoded command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Null bulk string.
    Nil,
    /// Status reply such as `OK` or `PONG`.
    Status(String),
    /// Integer reply.
    Integer(i64),
    /// Bulk string, decoded through the codec when it carries the sentinel.
    Data(Payload),
    /// Array reply.
    Array(Vec<Reply>),
    /// Error element nested inside an array.
    Error(String),
}

impl Reply {
    /// Returns the payload of a data reply.
    pub fn as_payload(&self) -> Option<&Payload> {
        match self {
            Reply::Data(payload) => Some(payload),
            _ => None,
        }
    }

    /// Consumes a data reply and returns its payload.
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            Reply::Data(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns the value of an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text of a status reply.
    pub fn as_status(&self) -> Option<&str> {
        match self {
            Reply::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Returns true for a null reply.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }
}

/// Async client over a managed connection pool.
///
/// Each `run` checks out the least busy link, issues one command and hands
/// the link back. Pattern subscriptions live on one dedicated link and arrive
/// as `PoolEvent::Message` on `events()`.
#[derive(Clone)]
pub struct PoolClient {
    pool: PoolManager,
}

impl PoolClient {
    /// Connects a pool of `TcpLink`s to `options.addr`.
    pub async fn connect(config: PoolConfig, options: LinkOptions) -> ClientResult<Self> {
        Self::with_factory(config, Arc::new(TcpLinkFactory::new(options))).await
    }

    /// Builds a pool over any link factory.
    pub async fn with_factory(
        config: PoolConfig,
        factory: Arc<dyn LinkFactory>,
    ) -> ClientResult<Self> {
        let pool = PoolManager::new(config, factory).await?;
        Ok(PoolClient { pool })
    }

    /// Builds a pool with a custom binary-safe codec.
    pub async fn with_codec(
        config: PoolConfig,
        factory: Arc<dyn LinkFactory>,
        codec: Arc<dyn TextCodec>,
    ) -> ClientResult<Self> {
        let pool = PoolManager::with_codec(config, factory, codec).await?;
        Ok(PoolClient { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PoolManager) -> Self {
        PoolClient { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    /// Runs one command on a pooled link.
    ///
    /// Binary arguments are sent as sentinel-tagged codec text; bulk replies
    /// carrying the sentinel come back as `Payload::Binary`.
    pub async fn run<I, P>(&self, command: I) -> ClientResult<Reply>
    where
        I: IntoIterator<Item = P>,
        P: Into<Payload>,
    {
        let codec = Arc::clone(&self.pool.shared.codec);
        let args: Vec<Vec<u8>> = command
            .into_iter()
            .map(|arg| encode_payload(codec.as_ref(), &arg.into()))
            .collect();
        if args.is_empty() {
            return Err(ClientError::InvalidArgument("empty command"));
        }

        let link = self.pool.acquire().await?;
        let response = link.call(args).await;
        drop(link);

        match response? {
            RespValue::Error(message) => Err(ClientError::Server { message }),
            value => decode_reply(codec.as_ref(), value),
        }
    }

    /// Pings the backend. Returns the status text.
    pub async fn ping(&self) -> ClientResult<String> {
        match self.run(["PING"]).await? {
            Reply::Status(status) => Ok(status),
            Reply::Data(Payload::Text(text)) => Ok(text),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Publishes `payload` on `channel`. Returns the number of receivers.
    pub async fn publish(&self, channel: &str, payload: impl Into<Payload>) -> ClientResult<i64> {
        let command: [Payload; 3] = ["PUBLISH".into(), channel.into(), payload.into()];
        self.run(command)
            .await?
            .as_integer()
            .ok_or(ClientError::UnexpectedResponse)
    }

    /// Pattern-subscribes to `topics`.
    pub async fn subscribe<S: AsRef<str>>(&self, topics: &[S]) -> ClientResult<bool> {
        self.pool.subscribe(topics).await
    }

    /// Pattern-unsubscribes from `topics`.
    pub async fn unsubscribe<S: AsRef<str>>(&self, topics: &[S]) -> ClientResult<bool> {
        self.pool.unsubscribe(topics).await
    }

    /// Subscribes to pool lifecycle and message events.
    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.pool.events()
    }

    /// Snapshot of the underlying pool.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Closes every link; later calls fail with `PoolClosed`.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

fn decode_reply(codec: &dyn TextCodec, value: RespValue) -> ClientResult<Reply> {
    Ok(match value {
        RespValue::Simple(status) => Reply::Status(String::from_utf8_lossy(&status).into_owned()),
        RespValue::Error(message) => Reply::Error(String::from_utf8_lossy(&message).into_owned()),
        RespValue::Integer(value) => Reply::Integer(value),
        RespValue::Bulk(None) => Reply::Nil,
        RespValue::Bulk(Some(data)) => Reply::Data(decode_payload(codec, &data)?),
        RespValue::Array(items) => Reply::Array(
            items
                .into_iter()
                .map(|item| decode_reply(codec, item))
                .collect::<ClientResult<Vec<_>>>()?,
        ),
    })
}
