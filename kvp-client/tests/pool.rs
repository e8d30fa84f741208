use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Semaphore};
use tokio::time::{sleep, timeout};

use kvp_client::{
    ClientError, ClientResult, Link, LinkEvent, LinkEvents, LinkFactory, LinkState, Payload,
    PoolClient, PoolConfig, PoolEvent, Reply, RespValue,
};

/// In-process stand-in for a backend: every link it opens shares one
/// pattern registry so PUBLISH reaches subscribers on any link.
struct Broker {
    links: Mutex<Vec<Arc<MockLink>>>,
    fail_opens: AtomicBool,
    /// Permits released to `BLOCK` commands.
    gate: Arc<Semaphore>,
}

impl Broker {
    fn new() -> Arc<Self> {
        Arc::new(Broker {
            links: Mutex::new(Vec::new()),
            fail_opens: AtomicBool::new(false),
            gate: Arc::new(Semaphore::new(0)),
        })
    }

    fn link(&self, idx: usize) -> Arc<MockLink> {
        Arc::clone(&self.links.lock()[idx])
    }

    fn opened(&self) -> usize {
        self.links.lock().len()
    }

    fn closed(&self) -> usize {
        self.links
            .lock()
            .iter()
            .filter(|link| link.state() == LinkState::Closed)
            .count()
    }

    fn subscribed_link(&self) -> Option<Arc<MockLink>> {
        self.links
            .lock()
            .iter()
            .find(|link| !link.state().is_terminal() && !link.patterns.lock().is_empty())
            .cloned()
    }

    fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    fn publish(&self, channel: &[u8], payload: &[u8]) -> i64 {
        let mut delivered = 0;
        for link in self.links.lock().iter() {
            if link.state().is_terminal() {
                continue;
            }
            for pattern in link.patterns.lock().iter() {
                if glob_match(pattern.as_bytes(), channel) {
                    link.emit(LinkEvent::Push(RespValue::Array(vec![
                        bulk(b"pmessage"),
                        bulk(pattern.as_bytes()),
                        bulk(channel),
                        bulk(payload),
                    ])));
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

struct MockFactory {
    broker: Arc<Broker>,
}

#[async_trait]
impl LinkFactory for MockFactory {
    async fn open(&self) -> ClientResult<(Arc<dyn Link>, LinkEvents)> {
        if self.broker.fail_opens.load(Ordering::SeqCst) {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "backend down",
            )));
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (dead, _) = watch::channel(false);
        let link = Arc::new(MockLink {
            broker: Arc::downgrade(&self.broker),
            events: events_tx,
            patterns: Mutex::new(Vec::new()),
            pending: AtomicUsize::new(0),
            backlog: AtomicUsize::new(0),
            state: Mutex::new(LinkState::Ready),
            dead,
            calls: Mutex::new(Vec::new()),
        });
        link.emit(LinkEvent::Connecting);
        link.emit(LinkEvent::Connected);
        link.emit(LinkEvent::Ready);
        self.broker.links.lock().push(Arc::clone(&link));
        Ok((link as Arc<dyn Link>, events_rx))
    }
}

struct MockLink {
    broker: std::sync::Weak<Broker>,
    events: mpsc::UnboundedSender<LinkEvent>,
    patterns: Mutex<Vec<String>>,
    pending: AtomicUsize,
    /// Extra depth reported by `pending()`, to steer selection.
    backlog: AtomicUsize,
    state: Mutex<LinkState>,
    dead: watch::Sender<bool>,
    calls: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl MockLink {
    fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    fn kill(&self, reason: &str) {
        *self.state.lock() = LinkState::Failed;
        self.dead.send_replace(true);
        self.emit(LinkEvent::Disconnected);
        self.emit(LinkEvent::Fatal(reason.to_string()));
    }

    /// Ends the link without telling the pool.
    fn fail_silently(&self) {
        *self.state.lock() = LinkState::Failed;
        self.dead.send_replace(true);
    }

    fn set_backlog(&self, depth: usize) {
        self.backlog.store(depth, Ordering::SeqCst);
    }

    fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|args| String::from_utf8_lossy(&args[0]).to_uppercase())
            .collect()
    }

    fn confirm(kind: &[u8], topics: &[Vec<u8>], remaining: usize) -> RespValue {
        let mut replies: Vec<RespValue> = topics
            .iter()
            .map(|topic| {
                RespValue::Array(vec![
                    bulk(kind),
                    bulk(topic),
                    RespValue::Integer(remaining as i64),
                ])
            })
            .collect();
        if replies.len() == 1 {
            replies.remove(0)
        } else {
            RespValue::Array(replies)
        }
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        PendingGuard(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Link for MockLink {
    async fn call(&self, args: Vec<Vec<u8>>) -> ClientResult<RespValue> {
        if self.state().is_terminal() {
            return Err(ClientError::ConnectionClosed);
        }
        let _pending = PendingGuard::new(&self.pending);
        self.calls.lock().push(args.clone());

        let name = String::from_utf8_lossy(&args[0]).to_uppercase();
        match name.as_str() {
            "PING" => Ok(RespValue::Simple(b"PONG".to_vec())),
            "ECHO" => Ok(bulk(&args[1])),
            "FAIL" => Ok(RespValue::Error(b"ERR failed on purpose".to_vec())),
            "PSUBSCRIBE" => {
                let mut patterns = self.patterns.lock();
                for topic in &args[1..] {
                    patterns.push(String::from_utf8_lossy(topic).into_owned());
                }
                Ok(Self::confirm(b"psubscribe", &args[1..], patterns.len()))
            }
            "PUNSUBSCRIBE" => {
                let mut patterns = self.patterns.lock();
                patterns.retain(|pattern| !args[1..].iter().any(|topic| topic == pattern.as_bytes()));
                Ok(Self::confirm(b"punsubscribe", &args[1..], patterns.len()))
            }
            "PUBLISH" => {
                let broker = self.broker.upgrade().ok_or(ClientError::ConnectionClosed)?;
                Ok(RespValue::Integer(broker.publish(&args[1], &args[2])))
            }
            "BLOCK" => {
                let broker = self.broker.upgrade().ok_or(ClientError::ConnectionClosed)?;
                let gate = Arc::clone(&broker.gate);
                drop(broker);
                let permit = gate.acquire().await.map_err(|_| ClientError::ConnectionClosed)?;
                permit.forget();
                Ok(RespValue::Simple(b"OK".to_vec()))
            }
            "HANG" => {
                let mut dead = self.dead.subscribe();
                let _ = dead.wait_for(|dead| *dead).await;
                Err(ClientError::ConnectionLost)
            }
            _ => Ok(RespValue::Simple(b"OK".to_vec())),
        }
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst) + self.backlog.load(Ordering::SeqCst)
    }

    fn state(&self) -> LinkState {
        *self.state.lock()
    }

    async fn close(&self) -> ClientResult<()> {
        *self.state.lock() = LinkState::Closed;
        self.emit(LinkEvent::Closed);
        Ok(())
    }
}

fn bulk(raw: &[u8]) -> RespValue {
    RespValue::Bulk(Some(raw.to_vec()))
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.split_first(), text.split_first()) {
        (None, None) => true,
        (Some((&b'*', rest)), _) => {
            glob_match(rest, text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some((&b'?', rest)), Some((_, text_rest))) => glob_match(rest, text_rest),
        (Some((p, rest)), Some((t, text_rest))) if p == t => glob_match(rest, text_rest),
        _ => false,
    }
}

fn config(min_pool: usize, max_pool: usize) -> PoolConfig {
    PoolConfig::default()
        .with_min_pool(min_pool)
        .with_max_pool(max_pool)
}

async fn client_with(broker: &Arc<Broker>, config: PoolConfig) -> PoolClient {
    let factory = Arc::new(MockFactory {
        broker: Arc::clone(broker),
    });
    PoolClient::with_factory(config, factory).await.expect("pool")
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

async fn next_event(
    events: &mut broadcast::Receiver<PoolEvent>,
    wanted: impl Fn(&PoolEvent) -> bool,
) -> PoolEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event not received")
}

fn spawn_blocked(client: &PoolClient) -> tokio::task::JoinHandle<ClientResult<Reply>> {
    let client = client.clone();
    tokio::spawn(async move { client.run(["BLOCK"]).await })
}

#[tokio::test]
async fn construction_opens_min_pool_and_ping_releases() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;
    assert_eq!(client.stats().size, 1);

    let reply = client.run(["PING"]).await.expect("ping");
    assert_eq!(reply, Reply::Status("PONG".to_string()));

    let stats = client.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.idle, 1);
    assert_eq!(broker.link(0).commands(), vec!["PING"]);
}

#[tokio::test]
async fn pool_grows_when_all_connections_are_busy() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;

    let blocked = spawn_blocked(&client);
    wait_until(|| client.stats().in_use == 1).await;

    assert_eq!(client.ping().await.expect("ping"), "PONG");
    assert_eq!(client.stats().size, 2);
    assert_eq!(broker.link(1).commands(), vec!["PING"]);

    broker.gate.add_permits(1);
    let reply = blocked.await.expect("join").expect("block");
    assert_eq!(reply, Reply::Status("OK".to_string()));
    assert_eq!(client.stats().in_use, 0);
}

#[tokio::test]
async fn acquire_fails_fast_when_pool_is_full() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 1)).await;

    let blocked = spawn_blocked(&client);
    wait_until(|| client.stats().in_use == 1).await;

    let err = client.run(["PING"]).await.unwrap_err();
    assert!(matches!(err, ClientError::PoolExhausted));
    assert_eq!(broker.opened(), 1);

    broker.gate.add_permits(1);
    blocked.await.expect("join").expect("block");
    client.run(["PING"]).await.expect("ping after release");
}

#[tokio::test(start_paused = true)]
async fn idle_connections_are_swept_back_to_min_pool() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2).with_ttl(Duration::from_millis(1000))).await;

    let blocked = spawn_blocked(&client);
    wait_until(|| client.stats().in_use == 1).await;
    client.run(["PING"]).await.expect("ping");
    assert_eq!(client.stats().size, 2);

    broker.gate.add_permits(1);
    blocked.await.expect("join").expect("block");

    sleep(Duration::from_millis(2500)).await;
    assert_eq!(client.stats().size, 1);
    assert_eq!(broker.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_sweeps_converge_to_min_pool() {
    let broker = Broker::new();
    let client = client_with(&broker, config(2, 6).with_ttl(Duration::from_millis(500))).await;
    for _ in 0..4 {
        client.pool().create().await.expect("create");
    }
    assert_eq!(client.stats().size, 6);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(client.stats().size, 2);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(client.stats().size, 2);
}

#[tokio::test]
async fn evict_skips_busy_links_and_the_subscriber() {
    let broker = Broker::new();
    let config = config(1, 3)
        .with_ttl(Duration::ZERO)
        .with_sweep_interval(Duration::from_secs(3600));
    let client = client_with(&broker, config).await;
    let pool = client.pool();
    pool.create().await.expect("create");
    pool.create().await.expect("create");
    let ids = pool.connection_ids();

    let held = pool.acquire().await.expect("acquire");
    assert_eq!(held.id(), ids[0]);
    client.subscribe(&["a.*"]).await.expect("subscribe");
    assert_eq!(pool.subscriber(), Some(ids[1]));

    assert_eq!(pool.evict().await, 1);
    assert!(!pool.contains(ids[2]));
    assert_eq!(pool.evict().await, 0);

    pool.release(held);
    assert_eq!(pool.evict().await, 1);
    assert_eq!(pool.connection_ids(), vec![ids[1]]);
}

#[tokio::test]
async fn fatal_error_is_replaced_to_keep_min_pool() {
    let broker = Broker::new();
    let client = client_with(&broker, config(2, 4)).await;
    let mut events = client.events();
    let ids = client.pool().connection_ids();
    assert_eq!(ids.len(), 2);

    broker.link(0).kill("socket reset");

    let event = next_event(&mut events, |event| matches!(event, PoolEvent::Error { .. })).await;
    assert_eq!(event.connection_id(), ids[0]);
    wait_until(|| client.stats().size == 2 && !client.pool().contains(ids[0])).await;
    assert_eq!(broker.opened(), 3);
    assert!(client.pool().contains(ids[1]));
}

#[tokio::test]
async fn command_on_dying_link_fails_with_connection_lost() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 1)).await;

    let hanging = {
        let client = client.clone();
        tokio::spawn(async move { client.run(["HANG"]).await })
    };
    let link = broker.link(0);
    wait_until(|| link.pending() == 1).await;
    link.kill("gone");

    let err = hanging.await.expect("join").unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost));

    wait_until(|| broker.opened() == 2 && client.stats().size == 1).await;
    client.run(["PING"]).await.expect("ping on replacement");
}

#[tokio::test]
async fn failed_command_still_releases_connection() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;

    let err = client.run(["FAIL"]).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { .. }));
    assert_eq!(client.stats().in_use, 0);

    client.run(["PING"]).await.expect("ping");
    assert_eq!(broker.opened(), 1);
}

#[tokio::test]
async fn acquire_prefers_least_busy_then_oldest() {
    let broker = Broker::new();
    let client = client_with(&broker, config(2, 2)).await;
    let pool = client.pool();
    let ids = pool.connection_ids();

    let first = pool.acquire().await.expect("acquire");
    assert_eq!(first.id(), ids[0]);
    drop(first);

    broker.link(0).set_backlog(3);
    let second = pool.acquire().await.expect("acquire");
    assert_eq!(second.id(), ids[1]);
    drop(second);

    broker.link(1).set_backlog(5);
    let third = pool.acquire().await.expect("acquire");
    assert_eq!(third.id(), ids[0]);
}

#[tokio::test]
async fn acquire_skips_links_that_already_ended() {
    let broker = Broker::new();
    let client = client_with(&broker, config(2, 2)).await;
    let pool = client.pool();
    let ids = pool.connection_ids();

    broker.link(0).fail_silently();
    let chosen = pool.acquire().await.expect("acquire");
    assert_eq!(chosen.id(), ids[1]);
    drop(chosen);

    let reply = client.run(["PING"]).await.expect("ping");
    assert_eq!(reply, Reply::Status("PONG".to_string()));
    assert_eq!(broker.link(1).commands(), vec!["PING"]);
}

#[tokio::test]
async fn acquire_by_id_checks_membership_and_use() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;
    let pool = client.pool();
    let id = pool.connection_ids()[0];

    let held = pool.acquire_id(id).expect("acquire by id");
    assert!(pool.is_in_use(id));
    assert!(matches!(pool.acquire_id(id), Err(ClientError::ConnectionBusy(busy)) if busy == id));
    drop(held);
    assert!(!pool.is_in_use(id));

    pool.shutdown().await;
    assert!(matches!(pool.acquire_id(id), Err(ClientError::PoolClosed)));
}

#[tokio::test]
async fn subscribe_then_unsubscribe_returns_link_to_pool() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;
    let pool = client.pool();
    let id = pool.connection_ids()[0];

    assert!(client.subscribe(&["a.*"]).await.expect("subscribe"));
    let stats = client.stats();
    assert_eq!(stats.subscriber, Some(id));
    assert_eq!(stats.topics, vec!["a.*".to_string()]);
    assert_eq!(stats.idle, 0);

    // The subscriber is reserved, so a command opens a second link.
    client.run(["PING"]).await.expect("ping");
    assert_eq!(client.stats().size, 2);
    assert!(broker.link(0).commands().iter().all(|cmd| cmd != "PING"));

    assert!(client.unsubscribe(&["a.*"]).await.expect("unsubscribe"));
    let stats = client.stats();
    assert_eq!(stats.subscriber, None);
    assert!(stats.topics.is_empty());

    let link = pool.acquire().await.expect("acquire");
    assert_eq!(link.id(), id);
    drop(link);

    assert!(!client.unsubscribe(&["a.*"]).await.expect("no subscriber"));
}

#[tokio::test]
async fn subscribe_merges_topics_on_one_link() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 3)).await;

    client.subscribe(&["a.*", "b.*"]).await.expect("subscribe");
    client.subscribe(&["a.*"]).await.expect("subscribe again");
    let sub = client.stats().subscriber.expect("subscriber");
    assert_eq!(client.stats().topics, vec!["a.*", "b.*", "a.*"]);

    client.unsubscribe(&["a.*"]).await.expect("unsubscribe");
    let stats = client.stats();
    assert_eq!(stats.topics, vec!["b.*".to_string()]);
    assert_eq!(stats.subscriber, Some(sub));
    assert_eq!(
        broker.link(0).commands(),
        vec!["PSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE"]
    );
}

#[tokio::test]
async fn empty_arguments_are_rejected() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;

    let none: [&str; 0] = [];
    assert!(matches!(client.run(none).await, Err(ClientError::InvalidArgument(_))));
    assert!(matches!(client.subscribe(&none).await, Err(ClientError::InvalidArgument(_))));
    assert!(matches!(client.unsubscribe(&none).await, Err(ClientError::InvalidArgument(_))));
    assert_eq!(client.stats().subscriber, None);
}

#[tokio::test]
async fn binary_payload_round_trips_through_subscription() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;
    let mut events = client.events();

    client.subscribe(&["bin.*"]).await.expect("subscribe");
    let sub = client.stats().subscriber.expect("subscriber");

    let bytes = vec![0u8, 0xff, b'\r', b'\n', 0x80, 42];
    let delivered = client
        .publish("bin.raw", Payload::Binary(bytes.clone()))
        .await
        .expect("publish");
    assert_eq!(delivered, 1);

    let event = next_event(&mut events, |event| matches!(event, PoolEvent::Message(_))).await;
    let PoolEvent::Message(message) = event else {
        unreachable!()
    };
    assert_eq!(message.connection_id, sub);
    assert_eq!(message.pattern.as_deref(), Some("bin.*"));
    assert_eq!(message.topic, "bin.raw");
    assert_eq!(message.data, Payload::Binary(bytes));
}

#[tokio::test]
async fn binary_arguments_echo_back_as_binary() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;

    let bytes = vec![0xde, 0xad, 0xbe, 0xef];
    let reply = client
        .run([Payload::from("ECHO"), Payload::Binary(bytes.clone())])
        .await
        .expect("echo");
    assert_eq!(reply.into_payload(), Some(Payload::Binary(bytes)));
}

#[tokio::test]
async fn subscriber_failure_moves_patterns_to_fresh_link() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 3)).await;
    let mut events = client.events();

    client.subscribe(&["a.*", "b.*"]).await.expect("subscribe");
    let old = client.stats().subscriber.expect("subscriber");
    broker.subscribed_link().expect("subscribed link").kill("subscriber crashed");

    wait_until(|| {
        let stats = client.stats();
        stats.subscriber.is_some_and(|id| id != old) && stats.topics == vec!["a.*", "b.*"]
    })
    .await;
    let fresh = client.stats().subscriber.expect("subscriber");

    client.publish("b.7", "hello").await.expect("publish");
    let event = next_event(&mut events, |event| matches!(event, PoolEvent::Message(_))).await;
    assert_eq!(event.connection_id(), fresh);
    let PoolEvent::Message(message) = event else {
        unreachable!()
    };
    assert_eq!(message.pattern.as_deref(), Some("b.*"));
    assert_eq!(message.data, Payload::Text("hello".to_string()));
}

#[tokio::test(start_paused = true)]
async fn sweep_replenishes_after_failed_replacement() {
    let broker = Broker::new();
    let client = client_with(&broker, config(2, 4)).await;

    broker.set_fail_opens(true);
    broker.link(0).kill("backend restarting");
    wait_until(|| client.stats().size == 1).await;

    broker.set_fail_opens(false);
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(client.stats().size, 2);
}

#[tokio::test]
async fn construction_fails_when_backend_is_down() {
    let broker = Broker::new();
    broker.set_fail_opens(true);
    let factory = Arc::new(MockFactory {
        broker: Arc::clone(&broker),
    });
    let result = PoolClient::with_factory(config(1, 2), factory).await;
    assert!(matches!(result, Err(ClientError::Io(_))));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let broker = Broker::new();
    let factory = Arc::new(MockFactory {
        broker: Arc::clone(&broker),
    });
    let result = PoolClient::with_factory(config(3, 2), factory).await;
    assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    assert_eq!(broker.opened(), 0);
}

#[tokio::test]
async fn lifecycle_events_are_tagged_with_connection_id() {
    let broker = Broker::new();
    let client = client_with(&broker, config(1, 2)).await;
    let mut events = client.events();

    let id = client.pool().create().await.expect("create");
    let connect = next_event(&mut events, |event| event.connection_id() == id).await;
    assert_eq!(connect, PoolEvent::Connect { id });
    let ready = next_event(&mut events, |event| event.connection_id() == id).await;
    assert_eq!(ready, PoolEvent::Ready { id });
}

#[tokio::test]
async fn shutdown_closes_links_and_rejects_commands() {
    let broker = Broker::new();
    let client = client_with(&broker, config(2, 3)).await;

    client.shutdown().await;
    assert_eq!(client.stats().size, 0);
    assert_eq!(broker.closed(), 2);
    assert!(client.pool().is_closed());
    assert!(matches!(client.run(["PING"]).await, Err(ClientError::PoolClosed)));
    assert!(matches!(client.subscribe(&["a.*"]).await, Err(ClientError::PoolClosed)));
}
