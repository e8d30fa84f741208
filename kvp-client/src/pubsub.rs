//! # Pub/Sub Router
//!
//! Purpose: Dedicate one pooled link to pattern subscriptions, keep the merged
//! pattern set, and turn inbound push frames into `PoolEvent::Message`.
//!
//! ## Design Principles
//! 1. **One Subscriber**: At most one link is designated; it is excluded from
//!    automatic selection while any pattern is active.
//! 2. **Serialized Changes**: Subscribe/unsubscribe run behind an async gate
//!    so two callers never race for the designated link.
//! 3. **Commit After Success**: The pattern set changes only once the backend
//!    confirmed the command.

use kvp_common::{
    decode_payload, ClientError, ClientResult, ConnectionId, PoolEvent, PubSubMessage, TextCodec,
};
use tracing::{info, trace, warn};

use crate::pool::{PoolManager, PooledLink};
use crate::resp::{eq_ignore_ascii_case, RespValue};

impl PoolManager {
    /// Pattern-subscribes to `topics` on the designated subscriber link,
    /// designating one first when none exists.
    pub async fn subscribe<S: AsRef<str>>(&self, topics: &[S]) -> ClientResult<bool> {
        let topics = to_owned_topics(topics);
        if topics.is_empty() {
            return Err(ClientError::InvalidArgument("no topics to subscribe"));
        }
        let _gate = self.shared.pubsub_gate.lock().await;
        self.subscribe_locked(topics).await
    }

    /// Removes every occurrence of `topics` and pattern-unsubscribes them.
    ///
    /// Returns `false` when no subscriber is designated. Once no pattern is
    /// left the subscriber goes back to the general pool.
    pub async fn unsubscribe<S: AsRef<str>>(&self, topics: &[S]) -> ClientResult<bool> {
        let topics = to_owned_topics(topics);
        if topics.is_empty() {
            return Err(ClientError::InvalidArgument("no topics to unsubscribe"));
        }
        let _gate = self.shared.pubsub_gate.lock().await;

        let Some(id) = self.subscriber() else {
            return Ok(false);
        };
        let link = self.acquire_id(id)?;
        let result = link.call(command(b"PUNSUBSCRIBE", &topics)).await;
        drop(link);
        result.and_then(check_confirmation)?;

        let mut state = self.shared.state.lock();
        if state.subscriber == Some(id) {
            state.topics.retain(|topic| !topics.contains(topic));
            if state.topics.is_empty() {
                state.subscriber = None;
            }
        }
        info!(id = %id, topics = ?topics, remaining = state.topics.len(), "unsubscribed");
        Ok(true)
    }

    async fn subscribe_locked(&self, topics: Vec<String>) -> ClientResult<bool> {
        let link: PooledLink = match self.subscriber() {
            Some(id) => self.acquire_id(id)?,
            None => self.acquire().await?,
        };
        let id = link.id();
        self.shared.state.lock().subscriber = Some(id);

        let result = link.call(command(b"PSUBSCRIBE", &topics)).await;
        drop(link);
        let result = result.and_then(check_confirmation);

        let mut state = self.shared.state.lock();
        match result {
            Ok(()) if state.subscriber == Some(id) => {
                state.topics.extend(topics.iter().cloned());
                info!(id = %id, topics = ?topics, total = state.topics.len(), "subscribed");
                Ok(true)
            }
            // The link failed while the command was in flight.
            Ok(()) => Err(ClientError::ConnectionLost),
            Err(err) => {
                if state.subscriber == Some(id) && state.topics.is_empty() {
                    state.subscriber = None;
                }
                Err(err)
            }
        }
    }

    /// Moves patterns orphaned by a failed subscriber onto a fresh link.
    pub(crate) async fn resubscribe(&self, failed: ConnectionId, topics: Vec<String>) {
        let _gate = self.shared.pubsub_gate.lock().await;
        let count = topics.len();
        match self.subscribe_locked(topics).await {
            Ok(_) => info!(failed = %failed, count, "re-subscribed patterns"),
            Err(err) => {
                warn!(failed = %failed, error = %err, "failed to re-subscribe patterns");
                self.emit(PoolEvent::Error {
                    id: failed,
                    error: format!("re-subscribe failed: {}", err),
                });
            }
        }
    }

    /// Decodes a push frame and emits it as a message event.
    pub(crate) fn route_push(&self, id: ConnectionId, frame: RespValue) {
        match decode_message(self.shared.codec.as_ref(), id, frame) {
            Ok(message) => {
                trace!(id = %id, topic = %message.topic, "message received");
                self.emit(PoolEvent::Message(message));
            }
            Err(err) => warn!(id = %id, error = %err, "dropping undecodable message"),
        }
    }
}

fn to_owned_topics<S: AsRef<str>>(topics: &[S]) -> Vec<String> {
    topics.iter().map(|topic| topic.as_ref().to_string()).collect()
}

fn command(name: &[u8], topics: &[String]) -> Vec<Vec<u8>> {
    let mut args = Vec::with_capacity(topics.len() + 1);
    args.push(name.to_vec());
    args.extend(topics.iter().map(|topic| topic.as_bytes().to_vec()));
    args
}

/// Accepts a (p)subscribe-family confirmation, surfacing error replies.
fn check_confirmation(reply: RespValue) -> ClientResult<()> {
    match reply {
        RespValue::Error(message) => Err(ClientError::Server { message }),
        RespValue::Array(items) => {
            for item in items {
                if let RespValue::Error(message) = item {
                    return Err(ClientError::Server { message });
                }
            }
            Ok(())
        }
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Decodes a `message`/`pmessage` frame. The payload is the last element.
pub(crate) fn decode_message(
    codec: &dyn TextCodec,
    id: ConnectionId,
    frame: RespValue,
) -> ClientResult<PubSubMessage> {
    let RespValue::Array(items) = frame else {
        return Err(ClientError::UnexpectedResponse);
    };
    let parts = items
        .into_iter()
        .map(|item| match item {
            RespValue::Bulk(Some(bytes)) | RespValue::Simple(bytes) => Ok(bytes),
            _ => Err(ClientError::UnexpectedResponse),
        })
        .collect::<ClientResult<Vec<Vec<u8>>>>()?;

    let (pattern, topic, payload) = match parts.as_slice() {
        [kind, pattern, topic, payload] if eq_ignore_ascii_case(kind, b"pmessage") => {
            (Some(lossy(pattern)), lossy(topic), payload)
        }
        [kind, topic, payload] if eq_ignore_ascii_case(kind, b"message") => {
            (None, lossy(topic), payload)
        }
        _ => return Err(ClientError::UnexpectedResponse),
    };

    Ok(PubSubMessage {
        connection_id: id,
        pattern,
        topic,
        data: decode_payload(codec, payload)?,
    })
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
