//! Live metrics client: one logical session against the platform's push
//! metrics channel.
//!
//! The session opens the transport, authenticates with a signed assertion,
//! subscribes to the overall topic (admins only) and folds pushed updates
//! into an in-memory view. The dashboard only ever reads snapshots of that
//! view; all mutation happens on the session task. A periodic sweep drops
//! stream entries that have stopped updating. There is no automatic
//! reconnect; callers re-invoke [`MetricsClient::connect`] to retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::signer::{AssertionRequest, Signer};
use crate::types::{ClientMessage, NodeMetrics, OverallMetrics, ServerMessage, StreamMetrics};
use crate::ws;

/// Which timestamp the staleness sweep judges a stream entry by.
/// Deployments differ on which field their ingest keeps fresh, so both
/// the field and the threshold are tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleBy {
    /// The `last_segment_time` carried in the payload.
    Segment,
    /// The instant the entry was last merged locally.
    Received,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    pub stale_by: StaleBy,
    /// Entries older than this are dropped by the sweep.
    pub max_age: Duration,
    /// Sweep period while the connection is up.
    pub every: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            stale_by: StaleBy::Received,
            max_age: Duration::from_secs(30),
            every: Duration::from_secs(10),
        }
    }
}

/// Connection parameters for one metrics session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full WebSocket URL of the metrics channel (see
    /// [`crate::endpoints::metrics_url`]).
    pub url: String,
    /// Extra root CA for deployments with private TLS.
    pub tls_ca: Option<String>,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    AuthPending,
    /// Steady state after a successful auth reply. Non-admin sessions sit
    /// here too; they just never requested the overall topic.
    Live,
    Closed,
    Errored,
}

/// A collection entry plus the instant it was last merged.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    pub data: T,
    pub seen_at: Instant,
}

/// Everything one session knows, owned by the session task.
#[derive(Debug, Default)]
pub struct MetricsState {
    pub phase: Phase,
    pub connected: bool,
    pub authenticated: bool,
    pub is_admin: bool,
    pub last_error: Option<String>,
    pub overall: Option<OverallMetrics>,
    pub streams: Vec<Tracked<StreamMetrics>>,
    pub nodes: Vec<Tracked<NodeMetrics>>,
}

/// Read-only copy handed to the dashboard.
#[derive(Debug, Clone, Default)]
pub struct LiveView {
    pub phase: Phase,
    pub connected: bool,
    pub authenticated: bool,
    pub is_admin: bool,
    pub last_error: Option<String>,
    pub overall: Option<OverallMetrics>,
    pub streams: Vec<StreamMetrics>,
    pub nodes: Vec<NodeMetrics>,
}

impl MetricsState {
    pub fn snapshot(&self) -> LiveView {
        LiveView {
            phase: self.phase,
            connected: self.connected,
            authenticated: self.authenticated,
            is_admin: self.is_admin,
            last_error: self.last_error.clone(),
            overall: self.overall.clone(),
            streams: self.streams.iter().map(|e| e.data.clone()).collect(),
            nodes: self.nodes.iter().map(|e| e.data.clone()).collect(),
        }
    }

    pub fn on_open(&mut self) {
        self.connected = true;
        self.last_error = None;
        self.phase = Phase::AuthPending;
    }

    /// Folds one server message in, returning the control message to send
    /// back, if any.
    pub fn apply(&mut self, msg: ServerMessage, now: Instant) -> Option<ClientMessage> {
        match msg {
            ServerMessage::AuthResponse(reply) => {
                if !reply.success {
                    self.last_error = Some("Authentication failed".into());
                    self.phase = Phase::Errored;
                    return None;
                }
                self.authenticated = true;
                self.is_admin = reply.is_admin;
                self.phase = Phase::Live;
                // Only admins are offered the overall topic; nobody else
                // asks for it and the server never pushes it unsolicited.
                reply.is_admin.then_some(ClientMessage::SubscribeOverall)
            }
            ServerMessage::Overall(m) => {
                // Replaced wholesale; no field-level merge.
                self.overall = Some(m);
                None
            }
            ServerMessage::Stream(m) => {
                merge_keyed(&mut self.streams, m, now, |s| &s.stream_id);
                None
            }
            ServerMessage::Node(m) => {
                merge_keyed(&mut self.nodes, m, now, |n| &n.node_name);
                None
            }
            ServerMessage::Error(e) => {
                // Server-side complaint; the transport stays up.
                self.last_error = Some(e.message);
                None
            }
            ServerMessage::Unknown(kind) => {
                debug!(%kind, "ignoring unknown message kind");
                None
            }
        }
    }

    /// Parses and folds one raw text frame. Malformed frames are logged
    /// and dropped; they never disturb the collections or the phase.
    pub fn on_frame(&mut self, text: &str, now: Instant) -> Option<ClientMessage> {
        match ServerMessage::parse(text) {
            Ok(msg) => self.apply(msg, now),
            Err(err) => {
                warn!(%err, "dropping malformed frame");
                None
            }
        }
    }

    pub fn on_transport_error(&mut self, err: &str) {
        // Collections survive until the close event actually fires.
        self.last_error = Some(format!("Connection error: {err}"));
        self.phase = Phase::Errored;
    }

    /// Transport closed, either end, for any reason. Everything the
    /// session learned is discarded; `last_error` survives for display.
    pub fn on_close(&mut self) {
        self.connected = false;
        self.authenticated = false;
        self.is_admin = false;
        self.overall = None;
        self.streams.clear();
        self.nodes.clear();
        self.phase = Phase::Closed;
    }

    /// Drops stream entries that have stopped updating. Runs only while
    /// the connection is up; a close clears the collections outright.
    pub fn prune_stale(&mut self, cfg: &SweepConfig, now: Instant, wall: DateTime<Utc>) {
        if !self.connected {
            return;
        }
        let max_age = cfg.max_age;
        self.streams.retain(|e| match cfg.stale_by {
            StaleBy::Received => now.duration_since(e.seen_at) < max_age,
            // Unparseable or future timestamps never count as stale.
            StaleBy::Segment => match segment_age(&e.data.last_segment_time, wall) {
                Some(age) => age < max_age,
                None => true,
            },
        });
    }
}

fn segment_age(rfc3339: &str, wall: DateTime<Utc>) -> Option<Duration> {
    let t = DateTime::parse_from_rfc3339(rfc3339).ok()?.with_timezone(&Utc);
    (wall - t).to_std().ok()
}

// Replace-in-place keeps the entry's position in iteration order; only
// unseen keys append. Last message for a key wins, regardless of any
// timestamp in its payload.
fn merge_keyed<T>(
    items: &mut Vec<Tracked<T>>,
    incoming: T,
    now: Instant,
    key: impl Fn(&T) -> &String,
) {
    match items.iter_mut().find(|e| key(&e.data) == key(&incoming)) {
        Some(slot) => {
            slot.data = incoming;
            slot.seen_at = now;
        }
        None => items.push(Tracked {
            data: incoming,
            seen_at: now,
        }),
    }
}

/// Handle owning at most one live session. A new `connect` supersedes the
/// previous session entirely; an epoch counter makes sure anything the old
/// task does after that (a slow signer resolving, a straggling frame) is
/// discarded rather than applied to the new session's state.
pub struct MetricsClient {
    state: Arc<Mutex<MetricsState>>,
    epoch: Arc<AtomicU64>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for MetricsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MetricsState::default())),
            epoch: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> LiveView {
        self.state.lock().unwrap().snapshot()
    }

    /// Opens a fresh session, tearing down any previous one first.
    pub fn connect(&self, cfg: ClientConfig, signer: Arc<dyn Signer>) {
        self.teardown();
        let my_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(token.clone());
        {
            let mut st = self.state.lock().unwrap();
            *st = MetricsState::default();
            st.phase = Phase::Connecting;
        }
        let session = Session {
            state: self.state.clone(),
            epoch: self.epoch.clone(),
            my_epoch,
        };
        let handle = tokio::spawn(run_session(cfg, signer, session, token));
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Deliberate teardown: closes the transport and leaves an idle,
    /// disconnected view behind.
    pub fn disconnect(&self) {
        self.teardown();
        let mut st = self.state.lock().unwrap();
        *st = MetricsState::default();
        st.phase = Phase::Closed;
    }

    fn teardown(&self) {
        // Invalidate in-flight work before waking it up.
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
        self.task.lock().unwrap().take();
    }
}

impl Drop for MetricsClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct Session {
    state: Arc<Mutex<MetricsState>>,
    epoch: Arc<AtomicU64>,
    my_epoch: u64,
}

impl Session {
    /// Applies `f` unless a newer connect superseded this attempt; a late
    /// completion must not touch the replacement session's state.
    fn mutate<R>(&self, f: impl FnOnce(&mut MetricsState) -> R) -> Option<R> {
        if self.superseded() {
            return None;
        }
        let mut st = self.state.lock().unwrap();
        Some(f(&mut st))
    }

    fn superseded(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) != self.my_epoch
    }
}

async fn run_session(
    cfg: ClientConfig,
    signer: Arc<dyn Signer>,
    session: Session,
    cancel: CancellationToken,
) {
    let mut ws = tokio::select! {
        _ = cancel.cancelled() => return,
        res = ws::connect(&cfg.url, cfg.tls_ca.as_deref()) => match res {
            Ok(ws) => ws,
            Err(err) => {
                session.mutate(|st| {
                    st.on_transport_error(&err.to_string());
                    st.on_close();
                });
                return;
            }
        },
    };

    session.mutate(|st| st.on_open());

    // One signed assertion per attempt; a signer failure tears the
    // transport down with no automatic retry.
    let assertion = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = ws.close(None).await;
            return;
        }
        res = signer.sign(AssertionRequest::get(&cfg.url)) => res,
    };
    if session.superseded() {
        let _ = ws.close(None).await;
        return;
    }
    let auth = match assertion {
        Ok(a) => ClientMessage::Auth { token: a.token() },
        Err(err) => {
            let _ = ws.close(None).await;
            session.mutate(|st| {
                st.last_error = Some(format!("Authentication failed: {err}"));
                st.phase = Phase::Errored;
                st.on_close();
            });
            return;
        }
    };
    if ws.send(Message::Text(auth.to_frame())).await.is_err() {
        session.mutate(|st| {
            st.on_transport_error("send failed");
            st.on_close();
        });
        return;
    }

    let mut sweep = tokio::time::interval_at(
        tokio::time::Instant::now() + cfg.sweep.every,
        cfg.sweep.every,
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws.close(None).await;
                break;
            }
            _ = sweep.tick() => {
                session.mutate(|st| st.prune_stale(&cfg.sweep, Instant::now(), Utc::now()));
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = session
                        .mutate(|st| st.on_frame(&text, Instant::now()))
                        .flatten();
                    if let Some(msg) = reply {
                        if ws.send(Message::Text(msg.to_frame())).await.is_err() {
                            session.mutate(|st| st.on_transport_error("send failed"));
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong/binary: nothing to fold
                Some(Err(err)) => {
                    session.mutate(|st| st.on_transport_error(&err.to_string()));
                    break;
                }
            }
        }
    }

    session.mutate(|st| st.on_close());
}
