//! Command deck WebSocket client: connect, heartbeat, bounded reconnect, dispatch to the bus.
//!
//! One supervisor task owns the socket. It multiplexes inbound frames, outbound frames,
//! the heartbeat timer and the shutdown signal; when the socket drops it runs the
//! reconnect schedule and resumes with the new socket, or reports `Exhausted`.

use super::backoff::ReconnectPolicy;
use super::bus::EventBus;
use super::protocol::Envelope;
use crate::config::{self, Config, TransportConfig};
use crate::session::TokenStore;
use crate::util::lock;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no session token; log in first")]
    NoToken,
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("not connected")]
    NotConnected,
    #[error("encoding frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Observable socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts ran out; nothing retries until `connect()` is called again.
    Exhausted,
}

/// Handle to the command deck socket. Clones share one connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    ws_base: String,
    tokens: Arc<dyn TokenStore>,
    bus: EventBus,
    policy: ReconnectPolicy,
    heartbeat: Duration,
    status: watch::Sender<ConnectionStatus>,
    running: Mutex<Option<Running>>,
    connect_lock: tokio::sync::Mutex<()>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

impl Transport {
    pub fn new(
        ws_base: impl Into<String>,
        tokens: Arc<dyn TokenStore>,
        bus: EventBus,
        settings: &TransportConfig,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                ws_base: ws_base.into().trim_end_matches('/').to_string(),
                tokens,
                bus,
                policy: ReconnectPolicy::from_config(settings),
                heartbeat: settings.heartbeat_interval().max(Duration::from_millis(1)),
                status,
                running: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn from_config(config: &Config, tokens: Arc<dyn TokenStore>, bus: EventBus) -> Self {
        Self::new(config::resolve_ws_url(config), tokens, bus, &config.transport)
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Open the socket. Resolves once it is open; fails without a stored token or when the
    /// handshake fails. A no-op when already connected.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        self.stop_supervisor();
        self.inner.status.send_replace(ConnectionStatus::Connecting);

        let ws = match open_socket(&self.inner).await {
            Ok(ws) => ws,
            Err(e) => {
                self.inner.status.send_replace(ConnectionStatus::Disconnected);
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.inner.status.send_replace(ConnectionStatus::Connected);
        log::info!("command deck socket connected to {}", self.inner.ws_base);

        let task = tokio::spawn(supervise(self.inner.clone(), ws, shutdown_rx, outbound_rx));
        *lock(&self.inner.running) = Some(Running {
            shutdown: shutdown_tx,
            outbound: outbound_tx,
            task,
        });
        Ok(())
    }

    /// Close the socket and stop heartbeat and reconnect timers. Idempotent.
    pub fn disconnect(&self) {
        if let Some(running) = lock(&self.inner.running).take() {
            running.shutdown.send_replace(true);
            log::info!("command deck socket disconnecting");
        }
        self.inner.status.send_replace(ConnectionStatus::Disconnected);
    }

    /// Queue a frame for the open socket.
    pub fn send(&self, env: &Envelope) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let text = serde_json::to_string(env)?;
        let guard = lock(&self.inner.running);
        let running = guard.as_ref().ok_or(TransportError::NotConnected)?;
        running
            .outbound
            .send(text)
            .map_err(|_| TransportError::NotConnected)
    }

    fn stop_supervisor(&self) {
        if let Some(stale) = lock(&self.inner.running).take() {
            stale.shutdown.send_replace(true);
            stale.task.abort();
        }
    }
}

/// `<ws base>/ws/command_deck?token=<token>`.
pub fn socket_url(ws_base: &str, token: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(ws_base).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidUrl(format!("{} cannot be a base", ws_base)))?
        .pop_if_empty()
        .extend(["ws", "command_deck"]);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

async fn open_socket(inner: &Inner) -> Result<WsStream, TransportError> {
    let token = inner.tokens.token().ok_or(TransportError::NoToken)?;
    let url = socket_url(&inner.ws_base, &token)?;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    Ok(ws)
}

async fn supervise(
    inner: Arc<Inner>,
    mut ws: WsStream,
    mut shutdown: watch::Receiver<bool>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    loop {
        match run_session(&inner, &mut ws, &mut shutdown, &mut outbound).await {
            SessionEnd::Shutdown => {
                inner.status.send_replace(ConnectionStatus::Disconnected);
                log::info!("command deck socket closed");
                return;
            }
            SessionEnd::Dropped(reason) => {
                log::warn!("command deck socket dropped: {}", reason);
            }
        }
        match reconnect(&inner, &mut shutdown).await {
            Some(next) => ws = next,
            None => return,
        }
    }
}

async fn run_session(
    inner: &Inner,
    ws: &mut WsStream,
    shutdown: &mut watch::Receiver<bool>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> SessionEnd {
    let period = inner.heartbeat;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ping = serde_json::to_string(&Envelope::ping()).unwrap_or_else(|_| r#"{"type":"ping"}"#.to_string());

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = ws.close(None).await;
                    return SessionEnd::Shutdown;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(e) = ws.send(Message::Text(ping.clone())).await {
                    return SessionEnd::Dropped(format!("heartbeat failed: {}", e));
                }
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = ws.send(Message::Text(text)).await {
                    return SessionEnd::Dropped(format!("send failed: {}", e));
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(&inner.bus, &text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => dispatch(&inner.bus, &text),
                    Err(_) => log::warn!("dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return SessionEnd::Dropped(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}

/// Run the backoff schedule. Returns the new socket, or `None` after shutdown or exhaustion.
async fn reconnect(inner: &Inner, shutdown: &mut watch::Receiver<bool>) -> Option<WsStream> {
    for (i, delay) in inner.policy.schedule().enumerate() {
        let attempt = i as u32 + 1;
        inner
            .status
            .send_replace(ConnectionStatus::Reconnecting { attempt });
        log::info!(
            "reconnecting in {:?} (attempt {}/{})",
            delay,
            attempt,
            inner.policy.max_attempts
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                inner.status.send_replace(ConnectionStatus::Disconnected);
                return None;
            }
        }
        match open_socket(inner).await {
            Ok(mut ws) => {
                if *shutdown.borrow() {
                    let _ = ws.close(None).await;
                    inner.status.send_replace(ConnectionStatus::Disconnected);
                    return None;
                }
                inner.status.send_replace(ConnectionStatus::Connected);
                log::info!("command deck socket reconnected on attempt {}", attempt);
                return Some(ws);
            }
            Err(e) => log::warn!("reconnect attempt {} failed: {}", attempt, e),
        }
    }
    inner.status.send_replace(ConnectionStatus::Exhausted);
    log::error!(
        "command deck socket: giving up after {} reconnect attempts",
        inner.policy.max_attempts
    );
    None
}

fn dispatch(bus: &EventBus, text: &str) {
    match Envelope::parse(text) {
        Ok(env) => bus.emit(&env),
        Err(e) => {
            let preview: String = text.chars().take(120).collect();
            log::warn!("dropping malformed frame ({}): {}", e, preview);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryTokenStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn socket_url_appends_path_and_encoded_token() {
        let url = socket_url("ws://127.0.0.1:8000", "a b/c").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:8000/ws/command_deck?token=a+b%2Fc"
        );
        let url = socket_url("wss://aura.example.com/backend/", "t").unwrap();
        assert_eq!(url.as_str(), "wss://aura.example.com/backend/ws/command_deck?token=t");
    }

    #[test]
    fn malformed_frames_are_dropped_and_valid_ones_dispatched() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        bus.on("system_log", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        dispatch(&bus, "{not json");
        dispatch(&bus, r#"{"content":"missing type"}"#);
        dispatch(&bus, r#"{"type":"system_log","content":"hello"}"#);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_without_token_fails_and_stays_disconnected() {
        let transport = Transport::new(
            "ws://127.0.0.1:9",
            Arc::new(MemoryTokenStore::new()),
            EventBus::new(),
            &TransportConfig::default(),
        );
        assert!(matches!(transport.connect().await, Err(TransportError::NoToken)));
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
        assert!(matches!(
            transport.send(&Envelope::ping()),
            Err(TransportError::NotConnected)
        ));
        transport.disconnect();
        transport.disconnect();
        assert!(!transport.is_connected());
    }
}
