//! # Connection Pool
//!
//! Purpose: Keep a bounded set of backend links alive, hand them out to
//! commands, reclaim idle ones on a TTL and replace the ones that fail.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: `minPool <= |Pool| <= maxPool` at rest; links
//!    being opened hold a reservation so concurrent acquires cannot overshoot.
//! 2. **Minimal Locking**: One mutex guards all pool state and is never held
//!    across an `.await`; opening, calling and closing happen outside it.
//! 3. **Fail Fast**: A full pool returns `PoolExhausted` immediately.
//! 4. **RAII Release**: `PooledLink` clears the in-use mark on drop, so every
//!    exit path releases exactly once.
//! 5. **Self-Healing**: A watcher per link turns lifecycle events into pool
//!    events and replaces links that report a fatal error.
//!
//! ## Structure Overview
//!
//! ```text
//! PoolManager ── Arc<PoolShared> ──┬─ Mutex<PoolState> { connections, in_use,
//! PooledLink ─── Arc<PoolShared> ──┤                     subscriber, topics }
//! watcher/sweeper ── Weak ─────────┴─ broadcast::Sender<PoolEvent>
//! ```

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use kvp_common::{
    Base64Codec, ClientError, ClientResult, ConnectionId, PoolConfig, PoolEvent, TextCodec,
};

use crate::link::{Link, LinkEvent, LinkEvents, LinkFactory};
use crate::resp::RespValue;

/// One pooled link and its bookkeeping.
struct Slot {
    link: Arc<dyn Link>,
    last_used: Instant,
    watcher: JoinHandle<()>,
}

pub(crate) struct PoolState {
    /// Ordered by id, which is also insertion order.
    connections: BTreeMap<ConnectionId, Slot>,
    in_use: HashSet<ConnectionId>,
    pub(crate) subscriber: Option<ConnectionId>,
    pub(crate) topics: Vec<String>,
    /// Links being opened; they count against `max_pool`.
    creating: usize,
    closed: bool,
}

pub(crate) struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn LinkFactory>,
    pub(crate) codec: Arc<dyn TextCodec>,
    events: broadcast::Sender<PoolEvent>,
    pub(crate) state: Mutex<PoolState>,
    /// Serializes subscribe/unsubscribe so only one caller drives the
    /// subscriber link at a time.
    pub(crate) pubsub_gate: tokio::sync::Mutex<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
        for slot in self.state.get_mut().connections.values() {
            slot.watcher.abort();
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections in the pool.
    pub size: usize,
    /// Connections currently checked out.
    pub in_use: usize,
    /// Connections available to automatic selection.
    pub idle: usize,
    /// Designated pub/sub connection, if any.
    pub subscriber: Option<ConnectionId>,
    /// Active subscription patterns.
    pub topics: Vec<String>,
}

/// Pool handle. Clones share the same pool.
#[derive(Clone)]
pub struct PoolManager {
    pub(crate) shared: Arc<PoolShared>,
}

impl PoolManager {
    /// Builds a pool with the default base64 codec and opens `min_pool` links.
    pub async fn new(config: PoolConfig, factory: Arc<dyn LinkFactory>) -> ClientResult<Self> {
        Self::with_codec(config, factory, Arc::new(Base64Codec)).await
    }

    /// Builds a pool with a custom binary-safe codec.
    pub async fn with_codec(
        config: PoolConfig,
        factory: Arc<dyn LinkFactory>,
        codec: Arc<dyn TextCodec>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let manager = PoolManager {
            shared: Arc::new(PoolShared {
                config,
                factory,
                codec,
                events,
                state: Mutex::new(PoolState {
                    connections: BTreeMap::new(),
                    in_use: HashSet::new(),
                    subscriber: None,
                    topics: Vec::new(),
                    creating: 0,
                    closed: false,
                }),
                pubsub_gate: tokio::sync::Mutex::new(()),
                sweeper: Mutex::new(None),
            }),
        };

        for _ in 0..manager.shared.config.min_pool {
            manager.create().await?;
        }
        *manager.shared.sweeper.lock() = Some(spawn_sweeper(&manager.shared));

        info!(
            min_pool = manager.shared.config.min_pool,
            max_pool = manager.shared.config.max_pool,
            ttl_ms = manager.shared.config.ttl_ms,
            "connection pool ready"
        );
        Ok(manager)
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Subscribes to pool events.
    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Opens one more link and adds it to the pool.
    pub async fn create(&self) -> ClientResult<ConnectionId> {
        let reservation = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(ClientError::PoolClosed);
            }
            self.try_reserve(&mut state, self.shared.config.max_pool)
                .ok_or(ClientError::PoolExhausted)?
        };
        let (id, _) = self.open_reserved(reservation, false).await?;
        Ok(id)
    }

    /// Checks out the least busy free link, growing the pool if none is free.
    ///
    /// The designated subscriber and links already checked out are never
    /// selected, nor are links that already ended and await removal. Ties go
    /// to the oldest link.
    pub async fn acquire(&self) -> ClientResult<PooledLink> {
        let reservation = {
            let mut guard = self.shared.state.lock();
            if guard.closed {
                return Err(ClientError::PoolClosed);
            }
            let state = &mut *guard;
            let chosen = state
                .connections
                .iter()
                .filter(|(id, slot)| {
                    !state.in_use.contains(*id)
                        && state.subscriber != Some(**id)
                        && !slot.link.state().is_terminal()
                })
                .min_by_key(|(_, slot)| slot.link.pending())
                .map(|(id, slot)| (*id, Arc::clone(&slot.link)));

            if let Some((id, link)) = chosen {
                state.in_use.insert(id);
                trace!(id = %id, "connection acquired");
                return Ok(PooledLink::new(Arc::clone(&self.shared), id, link));
            }

            match self.try_reserve(state, self.shared.config.max_pool) {
                Some(reservation) => reservation,
                None => {
                    debug!(size = state.connections.len(), "connection pool exhausted");
                    return Err(ClientError::PoolExhausted);
                }
            }
        };

        let (id, link) = self.open_reserved(reservation, true).await?;
        Ok(PooledLink::new(Arc::clone(&self.shared), id, link))
    }

    /// Checks out a specific link the caller knows to be free.
    pub fn acquire_id(&self, id: ConnectionId) -> ClientResult<PooledLink> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(ClientError::PoolClosed);
        }
        let link = state
            .connections
            .get(&id)
            .map(|slot| Arc::clone(&slot.link))
            .ok_or(ClientError::UnknownConnection(id))?;
        if !state.in_use.insert(id) {
            return Err(ClientError::ConnectionBusy(id));
        }
        Ok(PooledLink::new(Arc::clone(&self.shared), id, link))
    }

    /// Returns a checked-out link to the pool.
    pub fn release(&self, link: PooledLink) {
        drop(link);
    }

    /// Closes links idle for at least the TTL while the pool stays at or
    /// above `min_pool`. Never touches the subscriber or links in use.
    ///
    /// Returns the number of links evicted.
    pub async fn evict(&self) -> usize {
        let now = Instant::now();
        let ttl = self.shared.config.ttl();
        let evicted: Vec<(ConnectionId, Slot)> = {
            let mut guard = self.shared.state.lock();
            if guard.closed {
                return 0;
            }
            let state = &mut *guard;
            let removable = state
                .connections
                .len()
                .saturating_sub(self.shared.config.min_pool);
            let expired: Vec<ConnectionId> = state
                .connections
                .iter()
                .filter(|(id, slot)| {
                    now.saturating_duration_since(slot.last_used) >= ttl
                        && !state.in_use.contains(*id)
                        && state.subscriber != Some(**id)
                })
                .map(|(id, _)| *id)
                .take(removable)
                .collect();
            expired
                .into_iter()
                .filter_map(|id| state.connections.remove(&id).map(|slot| (id, slot)))
                .collect()
        };

        for (id, slot) in &evicted {
            slot.watcher.abort();
            if let Err(err) = slot.link.close().await {
                warn!(id = %id, error = %err, "failed to close evicted connection");
            }
            debug!(id = %id, "evicted idle connection");
        }
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), size = self.size(), "idle sweep finished");
        }
        evicted.len()
    }

    /// Opens links until the pool is back at `min_pool`.
    ///
    /// Stops at the first failure; the next sweep tries again. Returns the
    /// number of links created.
    pub async fn replenish(&self) -> usize {
        let mut created = 0;
        loop {
            let reservation = {
                let mut state = self.shared.state.lock();
                if state.closed {
                    break;
                }
                match self.try_reserve(&mut state, self.shared.config.min_pool) {
                    Some(reservation) => reservation,
                    None => break,
                }
            };
            match self.open_reserved(reservation, false).await {
                Ok(_) => created += 1,
                Err(err) => {
                    warn!(error = %err, "failed to replenish connection pool");
                    break;
                }
            }
        }
        created
    }

    /// Stops the sweeper and closes every link. Later operations fail with
    /// `PoolClosed`.
    pub async fn shutdown(&self) {
        let slots = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.in_use.clear();
            state.subscriber = None;
            state.topics.clear();
            std::mem::take(&mut state.connections)
        };
        if let Some(sweeper) = self.shared.sweeper.lock().take() {
            sweeper.abort();
        }

        for (id, slot) in &slots {
            slot.watcher.abort();
            if let Err(err) = slot.link.close().await {
                warn!(id = %id, error = %err, "failed to close connection on shutdown");
            }
        }
        info!(closed = slots.len(), "connection pool shut down");
    }

    /// Number of links in the pool.
    pub fn size(&self) -> usize {
        self.shared.state.lock().connections.len()
    }

    /// Returns true when `id` is in the pool.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.shared.state.lock().connections.contains_key(&id)
    }

    /// Returns true when `id` is checked out.
    pub fn is_in_use(&self, id: ConnectionId) -> bool {
        self.shared.state.lock().in_use.contains(&id)
    }

    /// Ids of all pooled links, oldest first.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.shared.state.lock().connections.keys().copied().collect()
    }

    /// Designated pub/sub link, if any.
    pub fn subscriber(&self) -> Option<ConnectionId> {
        self.shared.state.lock().subscriber
    }

    /// Active subscription patterns.
    pub fn topics(&self) -> Vec<String> {
        self.shared.state.lock().topics.clone()
    }

    /// Returns true after `shutdown`.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Snapshot of pool size, checkouts and subscriptions.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let size = state.connections.len();
        let in_use = state.in_use.len();
        let reserved = state
            .subscriber
            .filter(|id| !state.in_use.contains(id))
            .map_or(0, |_| 1);
        PoolStats {
            size,
            in_use,
            idle: size.saturating_sub(in_use + reserved),
            subscriber: state.subscriber,
            topics: state.topics.clone(),
        }
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        // No receivers is fine; events are best effort.
        let _ = self.shared.events.send(event);
    }

    fn try_reserve(&self, state: &mut PoolState, limit: usize) -> Option<Reservation> {
        if state.connections.len() + state.creating >= limit {
            return None;
        }
        state.creating += 1;
        Some(Reservation {
            shared: Arc::clone(&self.shared),
            active: true,
        })
    }

    async fn open_reserved(
        &self,
        mut reservation: Reservation,
        in_use: bool,
    ) -> ClientResult<(ConnectionId, Arc<dyn Link>)> {
        let (link, events) = match self.shared.factory.open().await {
            Ok(opened) => opened,
            Err(err) => {
                warn!(error = %err, "failed to open connection");
                return Err(err);
            }
        };

        let (id, size) = {
            let mut state = self.shared.state.lock();
            reservation.complete(&mut state);
            // Allocated under the lock so id order matches insertion order.
            let id = ConnectionId::next();
            let size = if state.closed {
                None
            } else {
                // Spawned under the lock so a fatal event cannot beat the insert.
                let watcher = tokio::spawn(watch(Arc::downgrade(&self.shared), id, events));
                state.connections.insert(
                    id,
                    Slot {
                        link: Arc::clone(&link),
                        last_used: Instant::now(),
                        watcher,
                    },
                );
                if in_use {
                    state.in_use.insert(id);
                }
                Some(state.connections.len())
            };
            (id, size)
        };

        match size {
            Some(size) => {
                info!(id = %id, size, "connection created");
                Ok((id, link))
            }
            None => {
                let _ = link.close().await;
                Err(ClientError::PoolClosed)
            }
        }
    }

    /// Drops a failed link and heals the pool around it.
    async fn handle_fatal(&self, id: ConnectionId, reason: String) {
        warn!(id = %id, error = %reason, "connection failed");
        self.emit(PoolEvent::Error { id, error: reason });

        let orphaned = {
            let mut state = self.shared.state.lock();
            // Dropping the slot detaches this watcher's own handle.
            if state.connections.remove(&id).is_none() {
                return;
            }
            state.in_use.remove(&id);
            if state.subscriber == Some(id) {
                state.subscriber = None;
                std::mem::take(&mut state.topics)
            } else {
                Vec::new()
            }
        };

        let created = self.replenish().await;
        info!(id = %id, created, size = self.size(), "replaced failed connection");

        if !orphaned.is_empty() {
            self.resubscribe(id, orphaned).await;
        }
    }
}

/// A slot held open for a link being created.
struct Reservation {
    shared: Arc<PoolShared>,
    active: bool,
}

impl Reservation {
    fn complete(&mut self, state: &mut PoolState) {
        if self.active {
            state.creating = state.creating.saturating_sub(1);
            self.active = false;
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.active {
            let mut state = self.shared.state.lock();
            state.creating = state.creating.saturating_sub(1);
        }
    }
}

/// RAII checkout of one pooled link.
///
/// Dropping it clears the in-use mark and stamps the last-used time.
pub struct PooledLink {
    shared: Arc<PoolShared>,
    id: ConnectionId,
    link: Arc<dyn Link>,
}

impl PooledLink {
    fn new(shared: Arc<PoolShared>, id: ConnectionId, link: Arc<dyn Link>) -> Self {
        PooledLink { shared, id, link }
    }

    /// Id of the checked-out link.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Commands outstanding on the link.
    pub fn pending(&self) -> usize {
        self.link.pending()
    }

    /// Issues one raw command on the link.
    pub async fn call(&self, args: Vec<Vec<u8>>) -> ClientResult<RespValue> {
        self.touch();
        self.link.call(args).await
    }

    fn touch(&self) {
        if let Some(slot) = self.shared.state.lock().connections.get_mut(&self.id) {
            slot.last_used = Instant::now();
        }
    }
}

impl Drop for PooledLink {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.in_use.remove(&self.id);
        if let Some(slot) = state.connections.get_mut(&self.id) {
            slot.last_used = Instant::now();
        }
        trace!(id = %self.id, "connection released");
    }
}

type WatchFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Forwards one link's events into the pool until the link ends.
fn watch(shared: Weak<PoolShared>, id: ConnectionId, mut events: LinkEvents) -> WatchFuture {
    Box::pin(async move {
        while let Some(event) = events.recv().await {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let manager = PoolManager { shared };
            match event {
                LinkEvent::Connecting => trace!(id = %id, "connection opening"),
                LinkEvent::Connected => manager.emit(PoolEvent::Connect { id }),
                LinkEvent::Ready => manager.emit(PoolEvent::Ready { id }),
                LinkEvent::Disconnected => {
                    warn!(id = %id, "connection disconnected");
                    manager.emit(PoolEvent::Disconnect { id });
                }
                LinkEvent::Reconnecting { attempt } => {
                    debug!(id = %id, attempt, "connection reconnecting");
                    manager.emit(PoolEvent::Reconnecting { id, attempt });
                }
                LinkEvent::Push(frame) => manager.route_push(id, frame),
                LinkEvent::Closed => {
                    debug!(id = %id, "connection closed");
                    return;
                }
                LinkEvent::Fatal(reason) => {
                    manager.handle_fatal(id, reason).await;
                    return;
                }
            }
        }
    })
}

fn spawn_sweeper(shared: &Arc<PoolShared>) -> JoinHandle<()> {
    let weak = Arc::downgrade(shared);
    let period = shared.config.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(shared) = weak.upgrade() else {
                break;
            };
            let manager = PoolManager { shared };
            manager.evict().await;
            let created = manager.replenish().await;
            if created > 0 {
                debug!(created, size = manager.size(), "sweep replenished pool");
            }
        }
    })
}
