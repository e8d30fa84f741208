//! # TCP Link
//!
//! Purpose: A `Link` over one TCP connection speaking RESP2, with request
//! multiplexing, push-frame routing and an optional reconnect policy.
//!
//! ## Design Principles
//! 1. **Single Owner**: One driver task owns the socket; callers talk to it
//!    over a channel and await a oneshot reply, so no lock guards the stream.
//! 2. **FIFO Replies**: RESP2 answers in order, so in-flight requests are a
//!    queue; subscribe-family commands wait for one reply per argument.
//! 3. **Fail Loud**: Losing the socket fails every outstanding request with
//!    `ConnectionLost` before any reconnect is attempted.
//! 4. **Buffer Reuse**: The read buffer and encode buffer live for a session.
//!
//! ## Structure Overview
//!
//! ```text
//! TcpLink::call ──Op::Call──► driver task ──write──► socket
//!        ▲                        │
//!        └──── oneshot reply ◄────┤◄──read/parse── socket
//!                                 └──LinkEvent::Push──► pool watcher
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use kvp_common::{ClientError, ClientResult};

use crate::link::{Link, LinkEvent, LinkEvents, LinkFactory, LinkState};
use crate::resp::{encode_command, eq_ignore_ascii_case, FrameDecoder, RespValue};

/// Connection options handed to every `TcpLink` the factory opens.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Retry the transport after it is lost.
    pub auto_reconnect: bool,
    /// Delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Attempts before the link reports a fatal error.
    pub max_reconnect_attempts: usize,
    /// Initial capacity of the read buffer.
    pub read_buffer_size: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            addr: "127.0.0.1:6379".to_string(),
            connect_timeout: Some(Duration::from_secs(5)),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            read_buffer_size: 8 * 1024,
        }
    }
}

impl LinkOptions {
    /// Options for `addr` with defaults elsewhere.
    pub fn new(addr: impl Into<String>) -> Self {
        LinkOptions {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable auto-reconnect
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set max reconnect attempts
    pub fn with_max_reconnect_attempts(mut self, attempts: usize) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

/// Opens `TcpLink`s with a fixed set of options.
#[derive(Debug, Clone)]
pub struct TcpLinkFactory {
    options: LinkOptions,
}

impl TcpLinkFactory {
    /// Creates a factory that passes `options` to every link.
    pub fn new(options: LinkOptions) -> Self {
        TcpLinkFactory { options }
    }

    /// Options used for new links.
    pub fn options(&self) -> &LinkOptions {
        &self.options
    }
}

#[async_trait]
impl LinkFactory for TcpLinkFactory {
    async fn open(&self) -> ClientResult<(Arc<dyn Link>, LinkEvents)> {
        let (link, events) = TcpLink::open(self.options.clone()).await?;
        Ok((link as Arc<dyn Link>, events))
    }
}

/// State shared by the link handle and its driver task.
struct Shared {
    state: Mutex<LinkState>,
    pending: AtomicUsize,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl Shared {
    fn emit(&self, event: LinkEvent) {
        // The receiver goes away when the pool detaches; that is not an error.
        let _ = self.events.send(event);
    }

    fn transition(&self, state: LinkState, event: LinkEvent) {
        *self.state.lock() = state;
        self.emit(event);
    }

    fn fail(&self, reason: String) {
        self.transition(LinkState::Failed, LinkEvent::Fatal(reason));
    }
}

/// Decrements the pending counter when a call finishes or is cancelled.
struct PendingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> PendingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        PendingGuard { counter }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

enum Op {
    Call {
        args: Vec<Vec<u8>>,
        reply: oneshot::Sender<ClientResult<RespValue>>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// RESP2 link over a single TCP connection.
pub struct TcpLink {
    ops: mpsc::UnboundedSender<Op>,
    shared: Arc<Shared>,
}

impl TcpLink {
    /// Connects and spawns the driver task.
    ///
    /// `Connecting`, `Connected` and `Ready` are queued on the returned
    /// event stream before this returns.
    pub async fn open(options: LinkOptions) -> ClientResult<(Arc<TcpLink>, LinkEvents)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(LinkState::Created),
            pending: AtomicUsize::new(0),
            events: events_tx,
        });

        shared.transition(LinkState::Connecting, LinkEvent::Connecting);
        let stream = match connect(&options).await {
            Ok(stream) => stream,
            Err(err) => {
                *shared.state.lock() = LinkState::Failed;
                return Err(err);
            }
        };
        shared.emit(LinkEvent::Connected);
        shared.transition(LinkState::Ready, LinkEvent::Ready);
        debug!(addr = %options.addr, "link connected");

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(stream, ops_rx, Arc::clone(&shared), options));

        Ok((
            Arc::new(TcpLink {
                ops: ops_tx,
                shared,
            }),
            events_rx,
        ))
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn call(&self, args: Vec<Vec<u8>>) -> ClientResult<RespValue> {
        if args.is_empty() {
            return Err(ClientError::InvalidArgument("empty command"));
        }
        let _pending = PendingGuard::new(&self.shared.pending);
        let (reply, response) = oneshot::channel();
        self.ops
            .send(Op::Call { args, reply })
            .map_err(|_| ClientError::ConnectionClosed)?;
        // A dropped sender means the driver went away with the request queued.
        response.await.unwrap_or(Err(ClientError::ConnectionLost))
    }

    fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    fn state(&self) -> LinkState {
        *self.shared.state.lock()
    }

    async fn close(&self) -> ClientResult<()> {
        let (done, closed) = oneshot::channel();
        if self.ops.send(Op::Close { done }).is_err() {
            return Ok(());
        }
        let _ = closed.await;
        Ok(())
    }
}

/// A request waiting for its reply frames.
struct Inflight {
    remaining: usize,
    replies: Vec<RespValue>,
    reply: Option<oneshot::Sender<ClientResult<RespValue>>>,
}

impl Inflight {
    fn new(expected: usize, reply: Option<oneshot::Sender<ClientResult<RespValue>>>) -> Self {
        Inflight {
            remaining: expected,
            replies: Vec::with_capacity(expected),
            reply,
        }
    }

    /// Records one frame; returns true once every expected frame arrived.
    fn accept(&mut self, frame: RespValue) -> bool {
        self.replies.push(frame);
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    fn finish(self) {
        let Inflight {
            mut replies, reply, ..
        } = self;
        if let Some(reply) = reply {
            let value = if replies.len() == 1 {
                replies.remove(0)
            } else {
                RespValue::Array(replies)
            };
            let _ = reply.send(Ok(value));
        }
    }

    fn fail(self, err: ClientError) {
        if let Some(reply) = self.reply {
            let _ = reply.send(Err(err));
        }
    }
}

/// Channels and patterns this link is subscribed to, replayed on reconnect.
#[derive(Debug, Default)]
struct Subscriptions {
    channels: Vec<Vec<u8>>,
    patterns: Vec<Vec<u8>>,
}

impl Subscriptions {
    fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.patterns.is_empty()
    }

    fn track(&mut self, args: &[Vec<u8>]) {
        let Some((cmd, targets)) = args.split_first() else {
            return;
        };
        if eq_ignore_ascii_case(cmd, b"PSUBSCRIBE") {
            self.patterns.extend(targets.iter().cloned());
        } else if eq_ignore_ascii_case(cmd, b"PUNSUBSCRIBE") {
            remove_all(&mut self.patterns, targets);
        } else if eq_ignore_ascii_case(cmd, b"SUBSCRIBE") {
            self.channels.extend(targets.iter().cloned());
        } else if eq_ignore_ascii_case(cmd, b"UNSUBSCRIBE") {
            remove_all(&mut self.channels, targets);
        }
    }

    fn replay_commands(&self) -> Vec<Vec<Vec<u8>>> {
        let mut commands = Vec::new();
        if !self.channels.is_empty() {
            let mut args = vec![b"SUBSCRIBE".to_vec()];
            args.extend(self.channels.iter().cloned());
            commands.push(args);
        }
        if !self.patterns.is_empty() {
            let mut args = vec![b"PSUBSCRIBE".to_vec()];
            args.extend(self.patterns.iter().cloned());
            commands.push(args);
        }
        commands
    }
}

fn remove_all(list: &mut Vec<Vec<u8>>, targets: &[Vec<u8>]) {
    if targets.is_empty() {
        list.clear();
    } else {
        list.retain(|item| !targets.contains(item));
    }
}

/// Number of reply frames a command produces.
fn expected_replies(args: &[Vec<u8>]) -> usize {
    match args.first() {
        Some(cmd) if is_subscribe_family(cmd) => args.len().saturating_sub(1).max(1),
        _ => 1,
    }
}

fn is_subscribe_family(cmd: &[u8]) -> bool {
    [
        &b"SUBSCRIBE"[..],
        b"UNSUBSCRIBE",
        b"PSUBSCRIBE",
        b"PUNSUBSCRIBE",
    ]
    .iter()
    .any(|name| eq_ignore_ascii_case(cmd, name))
}

/// Reports a driver that stops without reaching a terminal state, such as
/// after a panic, so the owner still sees `Fatal`.
struct DriverGuard {
    shared: Arc<Shared>,
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        let ended = self.shared.state.lock().is_terminal();
        if !ended {
            self.shared.fail("link driver stopped unexpectedly".to_string());
        }
    }
}

enum SessionEnd {
    Closed(Option<oneshot::Sender<()>>),
    Lost(String),
}

async fn drive(
    mut stream: TcpStream,
    mut ops: mpsc::UnboundedReceiver<Op>,
    shared: Arc<Shared>,
    options: LinkOptions,
) {
    let _guard = DriverGuard {
        shared: Arc::clone(&shared),
    };
    let mut inflight: VecDeque<Inflight> = VecDeque::new();
    let mut subscriptions = Subscriptions::default();

    loop {
        let end = run_session(
            &mut stream,
            &mut ops,
            &mut inflight,
            &mut subscriptions,
            &shared,
            options.read_buffer_size,
        )
        .await;

        match end {
            SessionEnd::Closed(done) => {
                let _ = stream.shutdown().await;
                fail_all(&mut inflight, || ClientError::ConnectionClosed);
                shared.transition(LinkState::Closed, LinkEvent::Closed);
                debug!(addr = %options.addr, "link closed");
                if let Some(done) = done {
                    let _ = done.send(());
                }
                return;
            }
            SessionEnd::Lost(reason) => {
                warn!(addr = %options.addr, %reason, "link lost its connection");
                fail_all(&mut inflight, || ClientError::ConnectionLost);
                shared.transition(LinkState::Disconnected, LinkEvent::Disconnected);

                if !options.auto_reconnect {
                    shared.fail(reason);
                    return;
                }
                match reconnect(&options, &shared).await {
                    Some(fresh) => {
                        stream = fresh;
                        replay_subscriptions(&mut stream, &subscriptions, &mut inflight).await;
                    }
                    None => {
                        shared.fail(format!(
                            "gave up after {} reconnect attempts: {}",
                            options.max_reconnect_attempts, reason
                        ));
                        return;
                    }
                }
            }
        }
    }
}

async fn run_session(
    stream: &mut TcpStream,
    ops: &mut mpsc::UnboundedReceiver<Op>,
    inflight: &mut VecDeque<Inflight>,
    subscriptions: &mut Subscriptions,
    shared: &Shared,
    buffer_size: usize,
) -> SessionEnd {
    let (mut reader, mut writer) = stream.split();
    let mut buf = BytesMut::with_capacity(buffer_size);
    let mut decoder = FrameDecoder::default();
    let mut out = Vec::with_capacity(256);

    loop {
        tokio::select! {
            op = ops.recv() => match op {
                // Every handle is gone; nobody can observe the link anymore.
                None => return SessionEnd::Closed(None),
                Some(Op::Close { done }) => return SessionEnd::Closed(Some(done)),
                Some(Op::Call { args, reply }) => {
                    out.clear();
                    encode_command(&args, &mut out);
                    if let Err(err) = writer.write_all(&out).await {
                        let _ = reply.send(Err(ClientError::ConnectionLost));
                        return SessionEnd::Lost(err.to_string());
                    }
                    subscriptions.track(&args);
                    inflight.push_back(Inflight::new(expected_replies(&args), Some(reply)));
                }
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => return SessionEnd::Lost("connection closed by peer".to_string()),
                Ok(_) => loop {
                    match decoder.decode(&mut buf) {
                        Ok(Some(frame)) => {
                            dispatch(frame, inflight, !subscriptions.is_empty(), shared)
                        }
                        Ok(None) => break,
                        Err(err) => return SessionEnd::Lost(err.to_string()),
                    }
                },
                Err(err) => return SessionEnd::Lost(err.to_string()),
            },
        }
    }
}

fn dispatch(
    frame: RespValue,
    inflight: &mut VecDeque<Inflight>,
    subscribed: bool,
    shared: &Shared,
) {
    if subscribed && frame.is_push() {
        shared.emit(LinkEvent::Push(frame));
        return;
    }
    match inflight.front_mut() {
        Some(front) => {
            if front.accept(frame) {
                if let Some(done) = inflight.pop_front() {
                    done.finish();
                }
            }
        }
        None => trace!("dropping unsolicited frame"),
    }
}

fn fail_all(inflight: &mut VecDeque<Inflight>, err: impl Fn() -> ClientError) {
    for request in inflight.drain(..) {
        request.fail(err());
    }
}

async fn reconnect(options: &LinkOptions, shared: &Shared) -> Option<TcpStream> {
    for attempt in 1..=options.max_reconnect_attempts {
        shared.transition(LinkState::Reconnecting, LinkEvent::Reconnecting { attempt });
        tokio::time::sleep(options.reconnect_delay).await;
        match connect(options).await {
            Ok(stream) => {
                shared.emit(LinkEvent::Connected);
                shared.transition(LinkState::Ready, LinkEvent::Ready);
                debug!(addr = %options.addr, attempt, "link reconnected");
                return Some(stream);
            }
            Err(err) => debug!(addr = %options.addr, attempt, error = %err, "reconnect attempt failed"),
        }
    }
    None
}

async fn replay_subscriptions(
    stream: &mut TcpStream,
    subscriptions: &Subscriptions,
    inflight: &mut VecDeque<Inflight>,
) {
    let mut out = Vec::new();
    for args in subscriptions.replay_commands() {
        out.clear();
        encode_command(&args, &mut out);
        // A failed write surfaces as a lost session on the next read.
        if let Err(err) = stream.write_all(&out).await {
            warn!(error = %err, "failed to replay subscriptions");
            return;
        }
        inflight.push_back(Inflight::new(expected_replies(&args), None));
    }
}

async fn connect(options: &LinkOptions) -> ClientResult<TcpStream> {
    if options.addr.is_empty() {
        return Err(ClientError::InvalidAddress);
    }
    let connecting = TcpStream::connect(options.addr.as_str());
    let stream = match options.connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
        None => connecting.await?,
    };
    // Disable Nagle to keep request latency low for small payloads.
    stream.set_nodelay(true)?;
    Ok(stream)
}
