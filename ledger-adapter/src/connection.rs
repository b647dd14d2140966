//! Connection manager.
//!
//! Owns the lifecycle of the notification-stream subscription: connect,
//! auto-reconnect with backoff, intentional disconnect, and state
//! signaling. The supervisor task is the only owner of the socket; an
//! intentional disconnect is flagged through a watch channel so the close
//! that follows is never mistaken for endpoint loss.

use crate::events::EventDispatcher;
use crate::metrics::STREAM_RECONNECTS_TOTAL;
use crate::notifications::NotificationHandler;
use crate::requester::retry_policy;
use crate::{Error, Result, MAX_RETRY_DELAY_MS};
use backoff::backoff::Backoff;
use futures::{SinkExt, StreamExt};
use ledger_protocol::LedgerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No subscription is open or being opened
    Disconnected,
    /// A subscription is being established
    Connecting,
    /// The notification stream is open
    Connected,
}

struct ConnectionControl {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

pub(crate) struct ConnectionManager {
    state: Arc<RwLock<ConnectionState>>,
    control: Mutex<Option<ConnectionControl>>,
}

impl ConnectionManager {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            control: Mutex::new(None),
        }
    }

    pub(crate) async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Open the subscription stream. Idempotent: a no-op while connecting
    /// or connected. Resolves once the stream has opened for the first
    /// time; a failure before that surfaces as unreachable-endpoint.
    pub(crate) async fn connect(
        &self,
        ws_url: String,
        auth_header: String,
        notifications: Arc<NotificationHandler>,
        dispatcher: EventDispatcher,
    ) -> Result<()> {
        // State transition and supervisor installation happen under the
        // control lock so concurrent connect() calls cannot double-spawn.
        let mut control = self.control.lock().await;
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Disconnected {
                debug!(state = ?*state, "connect() is a no-op");
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (opened_tx, opened_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(
            ws_url,
            auth_header,
            Arc::clone(&self.state),
            notifications,
            dispatcher,
            shutdown_rx,
            opened_tx,
        ));
        *control = Some(ConnectionControl {
            shutdown: shutdown_tx,
            task,
        });
        drop(control);

        match opened_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.reap().await;
                Err(err)
            }
            Err(_) => {
                self.reap().await;
                Err(Error::UnreachableEndpoint(
                    "connection attempt aborted before the stream opened".to_string(),
                ))
            }
        }
    }

    /// Intentionally close the stream. Idempotent no-op when not
    /// connected; safe at any point of the supervisor's life, including
    /// mid-reconnect-attempt.
    pub(crate) async fn disconnect(&self) {
        let control = self.control.lock().await.take();
        let Some(control) = control else {
            debug!("disconnect() with no active subscription");
            return;
        };
        // Flag the intent first so the supervisor's close handling does
        // not treat the resulting stream close as endpoint loss.
        let _ = control.shutdown.send(true);
        let _ = control.task.await;
        *self.state.write().await = ConnectionState::Disconnected;
        info!("notification subscription released");
    }

    /// Reap a supervisor that failed before the stream ever opened.
    async fn reap(&self) {
        if let Some(control) = self.control.lock().await.take() {
            let _ = control.shutdown.send(true);
            let _ = control.task.await;
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }
}

/// Reconnect supervisor: sole owner of the socket for the subscription's
/// lifetime. Immediate first attempt, exponential backoff afterwards.
async fn supervise(
    ws_url: String,
    auth_header: String,
    state: Arc<RwLock<ConnectionState>>,
    notifications: Arc<NotificationHandler>,
    dispatcher: EventDispatcher,
    mut shutdown: watch::Receiver<bool>,
    opened: oneshot::Sender<Result<()>>,
) {
    let mut opened = Some(opened);
    let mut reconnect = retry_policy();

    loop {
        if *shutdown.borrow() {
            break;
        }
        STREAM_RECONNECTS_TOTAL.inc();

        let request = match client_request(&ws_url, &auth_header) {
            Ok(request) => request,
            Err(err) => {
                if let Some(tx) = opened.take() {
                    let _ = tx.send(Err(err));
                }
                break;
            }
        };

        // The attempt itself is raced against the shutdown flag so an
        // intentional disconnect does not wait out a hanging handshake.
        let attempt = tokio::select! {
            attempt = connect_async(request) => attempt,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        match attempt {
            Ok((stream, _response)) => {
                info!(url = %ws_url, "notification stream open");
                *state.write().await = ConnectionState::Connected;
                dispatcher.emit(LedgerEvent::Connect).await;
                if let Some(tx) = opened.take() {
                    let _ = tx.send(Ok(()));
                }
                reconnect.reset();

                let intentional = read_frames(stream, &notifications, &mut shutdown).await;

                *state.write().await = ConnectionState::Disconnected;
                dispatcher.emit(LedgerEvent::Disconnect).await;
                if intentional {
                    debug!("notification stream closed intentionally");
                    break;
                }
                warn!(url = %ws_url, "notification stream lost, reconnecting");
                *state.write().await = ConnectionState::Connecting;
            }
            Err(err) => {
                if let Some(tx) = opened.take() {
                    // A stream-level error before the first successful open
                    // aborts the pending connect().
                    *state.write().await = ConnectionState::Disconnected;
                    let _ = tx.send(Err(Error::UnreachableEndpoint(format!(
                        "{ws_url}: {err}"
                    ))));
                    return;
                }
                warn!(url = %ws_url, error = %err, "reconnect attempt failed");
            }
        }

        let delay = reconnect
            .next_backoff()
            .unwrap_or(Duration::from_millis(MAX_RETRY_DELAY_MS));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    *state.write().await = ConnectionState::Disconnected;
}

/// Pump frames into the notification handler until the stream closes.
/// Returns true when the close was intentional.
async fn read_frames(
    stream: WsStream,
    notifications: &NotificationHandler,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let (mut sink, mut frames) = stream.split();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return true;
                }
            }
            frame = frames.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Err(err) = notifications.handle(&text).await {
                        // Escalated validation failures are logged here; the
                        // remote sender cannot act on a report.
                        warn!(error = %err, kind = err.kind(), "ignoring notification");
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return *shutdown.borrow(),
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "notification stream error");
                    return *shutdown.borrow();
                }
            }
        }
    }
}

fn client_request(ws_url: &str, auth_header: &str) -> Result<Request> {
    let mut request = ws_url.into_client_request().map_err(|err| {
        Error::UnreachableEndpoint(format!("invalid subscription url {ws_url}: {err}"))
    })?;
    let value = HeaderValue::from_str(auth_header)
        .map_err(|err| Error::InvalidFields(format!("authorization header: {err}")))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}
