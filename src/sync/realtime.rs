//! Realtime sync client.
//!
//! Holds one push-channel connection at a time. While it is down the client
//! retries with capped exponential backoff and, in parallel, polls the full
//! snapshot at a fixed interval. At most one poller exists; it is stopped as
//! soon as the channel is back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::bus::{BoardEvent, ConnectionState, EventBus};
use super::events::{ClientFrame, PushMessage, decode_frame};
use super::optimistic::OptimisticUpdateManager;
use crate::board::status::StatusKey;
use crate::errors::SyncError;

/// One inbound unit from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    Text(String),
    /// Any non-text frame (pong, ping). Proves the link is alive.
    Heartbeat,
}

/// An open push channel.
#[async_trait]
pub trait PushChannel: Send {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError>;

    async fn ping(&mut self) -> Result<(), SyncError>;

    /// The next frame, or `None` once the channel is closed. Must be
    /// cancel-safe: it is polled inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<PushFrame, SyncError>>;
}

/// Opens push channels.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, SyncError>;
}

/// [`PushConnector`] over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    token: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, SyncError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SyncError::Connect(format!("{}: {}", self.url, e)))?;
        if let Some(ref token) = self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SyncError::Connect(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SyncError::Connect(e.to_string()))?;
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| SyncError::ChannelLost(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), SyncError> {
        self.stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| SyncError::ChannelLost(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<PushFrame, SyncError>> {
        match self.stream.next().await? {
            Ok(Message::Text(text)) => Some(Ok(PushFrame::Text(text))),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => Some(Ok(PushFrame::Text(text))),
                Err(_) => Some(Err(SyncError::MalformedFrame(
                    "binary frame is not UTF-8".to_string(),
                ))),
            },
            Ok(Message::Close(_)) => None,
            Ok(_) => Some(Ok(PushFrame::Heartbeat)),
            Err(e) => Some(Err(SyncError::ChannelLost(e.to_string()))),
        }
    }
}

/// Capped exponential backoff for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if secs.is_finite() && secs < self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Channel named in the subscribe frame.
    pub channel: String,
    pub poll_interval: Duration,
    /// No frame for this long means the channel is dead.
    pub keepalive_timeout: Duration,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// Fetch one snapshot after every successful connect.
    pub resync_on_connect: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            channel: "work_orders".to_string(),
            poll_interval: Duration::from_secs(15),
            keepalive_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
            resync_on_connect: true,
        }
    }
}

enum PumpExit {
    Shutdown,
    Lost(SyncError),
}

struct Poller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Poller {
    async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

pub struct RealtimeSyncClient<S: StatusKey> {
    manager: Arc<OptimisticUpdateManager<S>>,
    connector: Arc<dyn PushConnector>,
    bus: EventBus,
    settings: RealtimeSettings,
}

impl<S: StatusKey> RealtimeSyncClient<S> {
    pub fn new(
        manager: Arc<OptimisticUpdateManager<S>>,
        connector: Arc<dyn PushConnector>,
        bus: EventBus,
        settings: RealtimeSettings,
    ) -> Self {
        Self {
            manager,
            connector,
            bus,
            settings,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut failures: u32 = 0;
        let mut poller: Option<Poller> = None;

        while !shutdown.is_cancelled() {
            self.publish(ConnectionState::Connecting {
                attempt: failures + 1,
            });
            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.open() => result,
            };

            match connected {
                Ok(mut channel) => {
                    tracing::info!(channel = %self.settings.channel, "push channel connected");
                    failures = 0;
                    if let Some(active) = poller.take() {
                        active.stop().await;
                    }
                    self.publish(ConnectionState::Connected);
                    if self.settings.resync_on_connect {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = self.resync() => {}
                        }
                    }
                    match self.pump(channel.as_mut(), &shutdown).await {
                        PumpExit::Shutdown => break,
                        PumpExit::Lost(err) => {
                            tracing::warn!(error = %err, "push channel lost");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(attempt = failures + 1, error = %err, "push channel connect failed");
                }
            }

            failures = failures.saturating_add(1);
            if poller.is_none() {
                poller = Some(self.start_poller(&shutdown));
            }
            let retry_in = self.settings.backoff.delay(failures);
            self.publish(ConnectionState::Disconnected {
                attempt: failures,
                retry_in,
                polling: true,
            });
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(retry_in) => {}
            }
        }

        if let Some(active) = poller.take() {
            active.stop().await;
        }
        self.publish(ConnectionState::Closed);
        tracing::debug!("realtime client stopped");
    }

    fn publish(&self, state: ConnectionState) {
        self.bus.publish(BoardEvent::Connectivity(state));
    }

    async fn open(&self) -> Result<Box<dyn PushChannel>, SyncError> {
        let mut channel = tokio::time::timeout(self.settings.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| SyncError::Connect("timed out".to_string()))??;
        let subscribe = ClientFrame::Subscribe {
            channel: self.settings.channel.clone(),
        };
        channel.send_text(subscribe.to_text()?).await?;
        Ok(channel)
    }

    async fn resync(&self) {
        match self.manager.api().fetch_snapshot().await {
            Ok(cards) => {
                if let Err(e) = self.manager.ingest_snapshot(cards) {
                    tracing::debug!(error = %e, "resync snapshot not applied");
                }
            }
            Err(e) => tracing::warn!(error = %e, "resync snapshot failed"),
        }
    }

    async fn pump(&self, channel: &mut dyn PushChannel, shutdown: &CancellationToken) -> PumpExit {
        let keepalive = self.settings.keepalive_timeout;
        let mut ping = tokio::time::interval(keepalive / 2);
        // The first tick completes immediately.
        ping.tick().await;
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return PumpExit::Shutdown,
                _ = tokio::time::sleep_until(last_frame + keepalive) => {
                    return PumpExit::Lost(SyncError::ChannelLost(format!(
                        "no frame for {:?}",
                        keepalive
                    )));
                }
                _ = ping.tick() => {
                    if let Err(e) = channel.ping().await {
                        return PumpExit::Lost(e);
                    }
                }
                frame = channel.next_frame() => match frame {
                    None => {
                        return PumpExit::Lost(SyncError::ChannelLost("closed by server".to_string()));
                    }
                    Some(Err(SyncError::MalformedFrame(reason))) => {
                        last_frame = Instant::now();
                        tracing::warn!(%reason, "dropping malformed push frame");
                    }
                    Some(Err(e)) => return PumpExit::Lost(e),
                    Some(Ok(PushFrame::Heartbeat)) => last_frame = Instant::now(),
                    Some(Ok(PushFrame::Text(text))) => {
                        last_frame = Instant::now();
                        self.dispatch(&text);
                    }
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match decode_frame::<S>(text) {
            Ok(PushMessage::Board(event)) => {
                self.manager.handle_realtime(event);
            }
            Ok(PushMessage::Presence(_)) => tracing::debug!("presence update"),
            Ok(PushMessage::Ignored(kind)) => tracing::debug!(%kind, "ignoring push frame"),
            Err(e) => tracing::warn!(error = %e, "dropping push frame"),
        }
    }

    fn start_poller(&self, shutdown: &CancellationToken) -> Poller {
        let token = shutdown.child_token();
        let manager = Arc::clone(&self.manager);
        let interval = self.settings.poll_interval;
        tracing::info!(?interval, "starting snapshot poller");
        let handle = tokio::spawn(poll_snapshots(manager, interval, token.clone()));
        Poller { token, handle }
    }
}

async fn poll_snapshots<S: StatusKey>(
    manager: Arc<OptimisticUpdateManager<S>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the first poll is one interval out.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let fetched = tokio::select! {
            _ = token.cancelled() => break,
            result = manager.api().fetch_snapshot() => result,
        };
        match fetched {
            Ok(cards) => {
                if manager.ingest_snapshot(cards).is_err() {
                    // Board disposed.
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "snapshot poll failed"),
        }
    }
    tracing::debug!("snapshot poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::handle::BoardHandle;
    use crate::board::models::Card;
    use crate::board::status::WorkOrderStatus::{self, *};
    use crate::board::store::BoardStore;
    use crate::sync::mock::{MemoryConnector, MockBoardApi};
    use tokio::sync::broadcast;

    fn cards() -> Vec<Card<WorkOrderStatus>> {
        vec![
            Card::new("W-001", Pending),
            Card::new("W-002", InProgress),
            Card::new("W-004", Review),
        ]
    }

    fn settings() -> RealtimeSettings {
        RealtimeSettings {
            channel: "work_orders".to_string(),
            poll_interval: Duration::from_secs(5),
            keepalive_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(2),
            backoff: BackoffPolicy::default(),
            resync_on_connect: true,
        }
    }

    struct Harness {
        manager: Arc<OptimisticUpdateManager<WorkOrderStatus>>,
        api: Arc<MockBoardApi<WorkOrderStatus>>,
        connector: Arc<MemoryConnector>,
        rx: broadcast::Receiver<BoardEvent>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    }

    fn start(settings: RealtimeSettings) -> Harness {
        let api = Arc::new(MockBoardApi::new(cards()));
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let board = BoardHandle::new(BoardStore::from_cards(cards()));
        let manager = Arc::new(OptimisticUpdateManager::new(
            board,
            api.clone(),
            bus.clone(),
            Duration::from_secs(10),
        ));
        let connector = Arc::new(MemoryConnector::new());
        let client = RealtimeSyncClient::new(manager.clone(), connector.clone(), bus, settings);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(client.run(shutdown.clone()));
        Harness {
            manager,
            api,
            connector,
            rx,
            shutdown,
            task,
        }
    }

    async fn next_state(rx: &mut broadcast::Receiver<BoardEvent>) -> ConnectionState {
        loop {
            if let BoardEvent::Connectivity(state) = rx.recv().await.unwrap() {
                return state;
            }
        }
    }

    async fn wait_for(rx: &mut broadcast::Receiver<BoardEvent>, want: ConnectionState) {
        loop {
            if next_state(rx).await == want {
                return;
            }
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(6), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_never_shrinks() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            multiplier: 0.5,
        };
        assert_eq!(policy.delay(4), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_subscribes_and_resyncs() {
        let mut h = start(settings());
        let remote = h.connector.push_channel();
        wait_for(&mut h.rx, ConnectionState::Connected).await;

        let sent = remote.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("\"type\":\"subscribe\""));
        assert!(sent[0].contains("work_orders"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.api.snapshot_calls(), 1);

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_frames_reach_the_board() {
        let mut h = start(settings());
        let remote = h.connector.push_channel();
        wait_for(&mut h.rx, ConnectionState::Connected).await;

        remote.send(r#"{"type":"status_changed","data":{"id":"W-001","status":"review"}}"#);
        remote.send(r#"{"type":"presence_update","data":{}}"#);
        remote.send("garbage");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            h.manager.board().read(|s| s.status_of("W-001")),
            Some(Review)
        );
        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_starts_polling_and_backoff() {
        let mut h = start(settings());
        let remote = h.connector.push_channel();
        wait_for(&mut h.rx, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_connect = h.api.snapshot_calls();

        remote.close();
        assert_eq!(
            next_state(&mut h.rx).await,
            ConnectionState::Disconnected {
                attempt: 1,
                retry_in: Duration::from_secs(1),
                polling: true,
            }
        );

        // Every reconnect fails; retries back off while the poller runs.
        let mut delays = Vec::new();
        while delays.len() < 2 {
            if let ConnectionState::Disconnected { retry_in, .. } = next_state(&mut h.rx).await {
                delays.push(retry_in);
            }
        }
        assert_eq!(delays, [Duration::from_secs(2), Duration::from_secs(4)]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.api.snapshot_calls() > after_connect);

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fetches_at_interval_and_stops_on_reconnect() {
        let mut h = start(settings());
        // Nothing to connect to: the client polls.
        tokio::time::sleep(Duration::from_secs(21)).await;
        let polls = h.api.snapshot_calls();
        // One poller at 5s intervals: 4 polls in 21s.
        assert_eq!(polls, 4);

        let _remote = h.connector.push_channel();
        wait_for(&mut h.rx, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_connect = h.api.snapshot_calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.api.snapshot_calls(), after_connect);

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_polled_snapshot_updates_board() {
        let h = start(settings());
        let mut snapshot = cards();
        snapshot[2].status = Completed;
        h.api.set_snapshot(snapshot);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            h.manager.board().read(|s| s.status_of("W-004")),
            Some(Completed)
        );
        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_channel_is_dropped_after_keepalive() {
        let mut cfg = settings();
        cfg.keepalive_timeout = Duration::from_secs(20);
        let mut h = start(cfg);
        let _remote = h.connector.push_channel();
        wait_for(&mut h.rx, ConnectionState::Connected).await;

        let state = next_state(&mut h.rx).await;
        assert!(matches!(state, ConnectionState::Disconnected { attempt: 1, .. }));

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_publishes_closed() {
        let mut h = start(settings());
        h.shutdown.cancel();
        h.task.await.unwrap();
        wait_for(&mut h.rx, ConnectionState::Closed).await;
    }
}
