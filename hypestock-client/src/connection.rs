use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::protocol::{ClientFrame, RequestId, ServerFrame, StartupRequest};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Lifecycle of the backend websocket link.
///
/// `Connected` means the socket is open; `Ready` additionally means the backend
/// answered the startup handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Ready,
}

impl ConnectionState {
    /// Whether moving from this state to `next` is a legal lifecycle step.
    pub fn can_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Ready)
                | (Connected, Disconnected)
                | (Ready, Disconnected)
        )
    }
}

/// Outcome of waiting for the startup handshake.
///
/// `Degraded` means the grace period elapsed without an answer; the dashboard
/// opens anyway and requests fail individually until the backend responds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Degraded,
}

/// User-facing connection event, eg/ "Connected to backend".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Owns the websocket lifecycle: connect, handshake, reconnect with escalating
/// backoff, and frame transport in both directions.
#[derive(Debug)]
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawn the connection loop for `config` and return a cloneable handle plus
    /// the inbound frame stream.
    ///
    /// The loop retries failed connects with `reconnect_delay` pauses and gives
    /// up after `config.reconnect_attempts` consecutive failures, surfacing a
    /// "Failed to connect to backend" notice.
    pub fn connect(
        config: &ClientConfig,
    ) -> Result<(ConnectionHandle, mpsc::Receiver<ServerFrame>), ClientError> {
        let url = Url::parse(&config.ws_url)?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.channel_buffer_size);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_buffer_size);
        let (notice_tx, _) = broadcast::channel(32);

        let handle = ConnectionHandle {
            state_rx,
            outbound_tx,
            notice_tx: notice_tx.clone(),
        };

        tokio::spawn(run_connection_loop(
            url,
            config.clone(),
            state_tx,
            outbound_rx,
            inbound_tx,
            notice_tx,
        ));

        Ok((handle, inbound_rx))
    }
}

/// Cloneable view of a running connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    state_rx: watch::Receiver<ConnectionState>,
    outbound_tx: mpsc::Sender<ClientFrame>,
    notice_tx: broadcast::Sender<Notice>,
}

impl ConnectionHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether the socket is open (handshake answered or not).
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Ready
        )
    }

    /// Queue `frame` for transmission on the live socket.
    pub async fn send(&self, frame: ClientFrame) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// Subscribe to connection notices.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Publish a notice to every subscriber.
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        send_notice(&self.notice_tx, level, message);
    }

    /// Watch lifecycle state changes.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait up to `grace` for the startup handshake to complete.
    ///
    /// A missing answer degrades rather than fails: the caller proceeds with the
    /// dashboard and individual requests surface their own errors.
    pub async fn await_ready(&self, grace: Duration) -> Readiness {
        let mut state_rx = self.state_rx.clone();
        let handshake = state_rx.wait_for(|state| *state == ConnectionState::Ready);

        match tokio::time::timeout(grace, handshake).await {
            Ok(Ok(_)) => Readiness::Ready,
            Ok(Err(_)) => {
                warn!("connection loop ended before the startup handshake");
                Readiness::Degraded
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "no startup handshake answer, opening dashboard anyway"
                );
                Readiness::Degraded
            }
        }
    }
}

/// Build a handle backed by test-owned channels instead of a live socket.
#[cfg(test)]
pub(crate) fn test_handle(
    state: ConnectionState,
) -> (
    ConnectionHandle,
    mpsc::Receiver<ClientFrame>,
    watch::Sender<ConnectionState>,
) {
    let (state_tx, state_rx) = watch::channel(state);
    let (outbound_tx, outbound_rx) = mpsc::channel(32);
    let (notice_tx, _) = broadcast::channel(32);

    let handle = ConnectionHandle {
        state_rx,
        outbound_tx,
        notice_tx,
    };
    (handle, outbound_rx, state_tx)
}

async fn run_connection_loop(
    url: Url,
    config: ClientConfig,
    state_tx: watch::Sender<ConnectionState>,
    mut outbound_rx: mpsc::Receiver<ClientFrame>,
    inbound_tx: mpsc::Sender<ServerFrame>,
    notice_tx: broadcast::Sender<Notice>,
) {
    info!(%url, "starting backend connection loop");
    let mut attempt: u32 = 0;

    loop {
        advance(&state_tx, ConnectionState::Connecting);

        match tokio::time::timeout(config.connect_timeout, connect_async(url.clone())).await {
            Ok(Ok((stream, _response))) => {
                attempt = 0;
                advance(&state_tx, ConnectionState::Connected);
                send_notice(&notice_tx, NoticeLevel::Info, "Connected to backend");

                let end = run_session(stream, &state_tx, &mut outbound_rx, &inbound_tx).await;
                advance(&state_tx, ConnectionState::Disconnected);

                match end {
                    SessionEnd::Shutdown => {
                        info!("connection loop shut down");
                        return;
                    }
                    SessionEnd::Dropped => warn!("connection dropped, reconnecting"),
                }
            }
            Ok(Err(error)) => {
                error!(%error, "failed to connect to backend");
                advance(&state_tx, ConnectionState::Disconnected);
            }
            Err(_) => {
                warn!(
                    timeout_ms = config.connect_timeout.as_millis() as u64,
                    "connection attempt timed out"
                );
                advance(&state_tx, ConnectionState::Disconnected);
            }
        }

        attempt += 1;
        if attempt >= config.reconnect_attempts {
            error!(attempts = attempt, "exhausted connection attempts");
            send_notice(&notice_tx, NoticeLevel::Error, "Failed to connect to backend");
            return;
        }

        let delay = reconnect_delay(attempt);
        debug!(delay_ms = delay.as_millis() as u64, attempt, "waiting before reconnecting");
        tokio::time::sleep(delay).await;
    }
}

/// How an established session ended.
enum SessionEnd {
    /// Every handle was dropped; stop for good.
    Shutdown,
    /// The peer closed or the transport failed; reconnect.
    Dropped,
}

async fn run_session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    state_tx: &watch::Sender<ConnectionState>,
    outbound_rx: &mut mpsc::Receiver<ClientFrame>,
    inbound_tx: &mpsc::Sender<ServerFrame>,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();

    // Frames queued while disconnected belong to a dead session; drop them.
    while outbound_rx.try_recv().is_ok() {}

    let startup = ClientFrame::Startup(StartupRequest::now(RequestId::random()));
    if let Err(error) = send_frame(&mut sink, &startup).await {
        error!(%error, "failed to send startup frame");
        return SessionEnd::Dropped;
    }

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(error) = send_frame(&mut sink, &frame).await {
                        error!(%error, "failed to send frame");
                        return SessionEnd::Dropped;
                    }
                }
                None => {
                    debug!("all connection handles dropped, closing");
                    return SessionEnd::Shutdown;
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => match ServerFrame::decode(&text) {
                    Ok(ServerFrame::StartupResponse(response)) => {
                        debug!(status = %response.status, "backend handshake complete");
                        advance(state_tx, ConnectionState::Ready);
                    }
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            warn!("frame receiver dropped, closing");
                            return SessionEnd::Shutdown;
                        }
                    }
                    Err(error) => {
                        error!(%error, "failed to parse frame");
                        debug!(raw = %text, "raw frame");
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    info!("backend closed the connection");
                    return SessionEnd::Dropped;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Tungstenite answers pings itself.
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    error!(%error, "websocket transport error");
                    return SessionEnd::Dropped;
                }
                None => {
                    info!("websocket stream ended");
                    return SessionEnd::Dropped;
                }
            },
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: &ClientFrame) -> Result<(), ClientError> {
    let text = frame.encode()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

fn advance(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let current = *state_tx.borrow();
    if current == next {
        return;
    }
    if !current.can_transition(next) {
        warn!(from = ?current, to = ?next, "ignoring invalid connection state transition");
        return;
    }
    debug!(from = ?current, to = ?next, "connection state changed");
    let _ = state_tx.send(next);
}

fn send_notice(
    notice_tx: &broadcast::Sender<Notice>,
    level: NoticeLevel,
    message: impl Into<String>,
) {
    let _ = notice_tx.send(Notice {
        level,
        message: message.into(),
    });
}

/// Pause before reconnect attempt `attempt`: exponential from 200ms, plus up to
/// 250ms of jitter, capped at 5s.
fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(6);
    let base_ms = 200_u64.saturating_mul(1_u64 << exponent);
    let jitter_ms = rand::rng().random_range(0..250);
    Duration::from_millis((base_ms + jitter_ms).min(5_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transition_validity() {
        use ConnectionState::*;

        struct TestCase {
            from: ConnectionState,
            to: ConnectionState,
            valid: bool,
        }

        let cases = vec![
            TestCase { from: Disconnected, to: Connecting, valid: true },
            TestCase { from: Connecting, to: Connected, valid: true },
            TestCase { from: Connecting, to: Disconnected, valid: true },
            TestCase { from: Connected, to: Ready, valid: true },
            TestCase { from: Connected, to: Disconnected, valid: true },
            TestCase { from: Ready, to: Disconnected, valid: true },
            TestCase { from: Disconnected, to: Connected, valid: false },
            TestCase { from: Disconnected, to: Ready, valid: false },
            TestCase { from: Connecting, to: Ready, valid: false },
            TestCase { from: Ready, to: Connected, valid: false },
            TestCase { from: Ready, to: Connecting, valid: false },
            TestCase { from: Connected, to: Connecting, valid: false },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                test.from.can_transition(test.to),
                test.valid,
                "TC{index} failed: {:?} -> {:?}",
                test.from,
                test.to,
            );
        }
    }

    #[test]
    fn test_reconnect_delay_escalates_and_caps() {
        let first = reconnect_delay(1);
        assert!(first >= Duration::from_millis(400));
        assert!(first < Duration::from_millis(650));

        let second = reconnect_delay(2);
        assert!(second >= Duration::from_millis(800));
        assert!(second < Duration::from_millis(1_050));

        // Base alone exceeds the cap from the fifth attempt on.
        assert_eq!(reconnect_delay(5), Duration::from_millis(5_000));
        assert_eq!(reconnect_delay(40), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_await_ready_resolves_on_handshake() {
        let (handle, _outbound_rx, state_tx) = test_handle(ConnectionState::Connected);

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.await_ready(Duration::from_secs(1)).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        state_tx.send(ConnectionState::Ready).unwrap();

        assert_eq!(waiter.await.unwrap(), Readiness::Ready);
    }

    #[tokio::test]
    async fn test_await_ready_degrades_without_handshake() {
        let (handle, _outbound_rx, _state_tx) = test_handle(ConnectionState::Connected);
        let readiness = handle.await_ready(Duration::from_millis(30)).await;
        assert_eq!(readiness, Readiness::Degraded);
    }

    #[tokio::test]
    async fn test_send_requires_live_connection() {
        let (handle, mut outbound_rx, state_tx) = test_handle(ConnectionState::Ready);

        let frame = ClientFrame::Startup(StartupRequest::now(RequestId::random()));
        handle.send(frame.clone()).await.unwrap();
        assert_eq!(outbound_rx.recv().await, Some(frame.clone()));

        state_tx.send(ConnectionState::Disconnected).unwrap();
        let refused = handle.send(frame).await;
        assert!(matches!(refused, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_notices_reach_subscribers() {
        let (handle, _outbound_rx, _state_tx) = test_handle(ConnectionState::Ready);
        let mut notices = handle.notices();

        handle.notify(NoticeLevel::Info, "Connected to backend");

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(notice.message, "Connected to backend");
    }
}
