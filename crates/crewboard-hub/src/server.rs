//! WebSocket endpoint and per-connection pumps around the hub actor.

use crate::auth::TokenVerifier;
use crate::hub::{Hub, HubEvent, HubHandle, PeerHandle, OUTBOUND_BUFFER};
use crate::peer::RateLimiter;
use crate::sequencer::Sequencer;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use crewboard_core::protocol::{self, Message, MAX_MESSAGE_BYTES};
use crewboard_store::BoardService;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const AUTH_DEADLINE: Duration = Duration::from_secs(5);
const WRITE_WAIT: Duration = Duration::from_secs(10);
const PONG_WAIT: Duration = Duration::from_secs(30);
const PING_PERIOD: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("binding {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// When exposed through a public tunnel the Origin check is skipped; the
    /// bearer token is the real gate.
    pub public: bool,
}

struct AppState {
    hub: HubHandle,
    verifier: Arc<dyn TokenVerifier>,
    public: bool,
    conn_counter: AtomicU64,
    shutdown: watch::Receiver<bool>,
}

pub struct Server {
    pub local_addr: SocketAddr,
    pub sequencer: Arc<Sequencer>,
    hub_task: JoinHandle<()>,
    serve_task: JoinHandle<()>,
}

impl Server {
    /// Bind, start the hub actor and the HTTP acceptor, and return once the
    /// listener is live. The returned value reports the actual bound address
    /// (port 0 resolves here).
    pub async fn start(
        service: BoardService,
        verifier: Arc<dyn TokenVerifier>,
        config: ServerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Server, ServerError> {
        let sequencer = Arc::new(Sequencer::new());
        let (hub, handle) = Hub::new(service, sequencer.clone());
        let hub_task = tokio::spawn(hub.run(shutdown.clone()));

        let state = Arc::new(AppState {
            hub: handle,
            verifier,
            public: config.public,
            conn_counter: AtomicU64::new(0),
            shutdown: shutdown.clone(),
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(|| async { "ok" }))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.addr,
            source,
        })?;

        let mut serve_shutdown = shutdown;
        let serve_task = tokio::spawn(async move {
            let graceful = async move {
                let _ = serve_shutdown.changed().await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
            {
                warn!(event = "server_error", error = %err);
            }
        });

        info!(event = "server_listening", addr = %local_addr);
        Ok(Server {
            local_addr,
            sequencer,
            hub_task,
            serve_task,
        })
    }

    /// Wait for the acceptor and hub actor to finish after shutdown.
    pub async fn wait(self) {
        let _ = self.serve_task.await;
        let _ = self.hub_task.await;
    }
}

/// Local binds only accept browser connections from loopback; a missing
/// Origin means a non-browser client and passes. Public (tunneled) mode
/// skips the check entirely.
pub fn origin_allowed(origin: Option<&str>, public: bool) -> bool {
    if public {
        return true;
    }
    let Some(origin) = origin else {
        return true;
    };
    let Ok(parsed) = url::Url::parse(origin) else {
        return false;
    };
    match parsed.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
        Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let origin = headers.get("origin").and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, state.public) {
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Deserialize)]
struct AuthFrame {
    token: String,
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    // The peer has 5 seconds to present a bearer token.
    let token = match tokio::time::timeout(AUTH_DEADLINE, read_text(&mut stream)).await {
        Ok(Some(text)) => match serde_json::from_str::<AuthFrame>(&text) {
            Ok(frame) => frame.token,
            Err(_) => {
                let _ = send_error(&mut sink, "expected auth message").await;
                return;
            }
        },
        _ => {
            let _ = send_error(&mut sink, "expected auth message").await;
            return;
        }
    };

    let username = match state.verifier.verify(&token).await {
        Ok(username) => username,
        Err(err) => {
            warn!(event = "auth_failed", error = %err);
            let _ = send_error(&mut sink, "authentication failed").await;
            return;
        }
    };

    let peer_id = state.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    state
        .hub
        .send(HubEvent::Register(PeerHandle {
            id: peer_id,
            username: username.clone(),
            sender: tx.clone(),
        }))
        .await;

    let write_task = tokio::spawn(write_pump(rx, sink));

    read_pump(&state, peer_id, &username, tx, &mut stream).await;

    state.hub.send(HubEvent::Unregister(peer_id)).await;
    let _ = write_task.await;
}

async fn read_text(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    loop {
        match stream.next().await? {
            Ok(WsMessage::Text(text)) => return Some(text),
            Ok(WsMessage::Binary(bytes)) => return String::from_utf8(bytes).ok(),
            Ok(WsMessage::Close(_)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

async fn send_error(sink: &mut SplitSink<WebSocket, WsMessage>, reason: &str) -> bool {
    let frame = format!("{{\"error\": \"{reason}\"}}");
    sink.send(WsMessage::Text(frame)).await.is_ok()
}

/// Read side: size cap, rate limiting, decode, forward to the hub. Any frame
/// (including pongs) resets the liveness deadline; silence past the pong
/// deadline closes the connection.
async fn read_pump(
    state: &Arc<AppState>,
    peer_id: u64,
    username: &str,
    tx: mpsc::Sender<String>,
    stream: &mut SplitStream<WebSocket>,
) {
    let mut limiter = RateLimiter::new(Instant::now());
    let mut shutdown = state.shutdown.clone();

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return,
            frame = tokio::time::timeout(PONG_WAIT, stream.next()) => frame,
        };

        let data = match frame {
            Err(_) => {
                warn!(event = "peer_timeout", peer = %username);
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(err))) => {
                warn!(event = "peer_read_error", peer = %username, error = %err);
                return;
            }
            Ok(Some(Ok(WsMessage::Text(text)))) => text.into_bytes(),
            Ok(Some(Ok(WsMessage::Binary(bytes)))) => bytes,
            Ok(Some(Ok(WsMessage::Close(_)))) => return,
            Ok(Some(Ok(_))) => continue,
        };

        if data.len() > MAX_MESSAGE_BYTES {
            warn!(event = "message_too_large", peer = %username, size = data.len());
            continue;
        }

        if !limiter.allow(Instant::now()) {
            if let Ok(reject) = Message::new(
                protocol::MSG_SYNC_REJECT,
                "server",
                &protocol::SyncRejectPayload {
                    reason: "rate limited".to_string(),
                },
            ) {
                if let Ok(text) = serde_json::to_string(&reject) {
                    let _ = tx.try_send(text);
                }
            }
            continue;
        }

        let Ok(mut msg) = serde_json::from_slice::<Message>(&data) else {
            continue;
        };
        msg.sender = username.to_string();

        state
            .hub
            .send(HubEvent::Incoming {
                peer: peer_id,
                message: msg,
            })
            .await;
    }
}

/// Write side: drains the outbound buffer with a write deadline and pings on
/// a fixed period. Ends when every sender is gone (hub shutdown or peer
/// removal), closing the socket.
async fn write_pump(mut rx: mpsc::Receiver<String>, mut sink: SplitSink<WebSocket, WsMessage>) {
    let mut ping = tokio::time::interval(PING_PERIOD);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(text) = frame else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return;
                };
                let send = sink.send(WsMessage::Text(text));
                match tokio::time::timeout(WRITE_WAIT, send).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
            _ = ping.tick() => {
                let send = sink.send(WsMessage::Ping(Vec::new()));
                match tokio::time::timeout(WRITE_WAIT, send).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_policy_matrix() {
        let cases = [
            // (public, origin, allowed)
            (false, None, true),
            (false, Some("http://localhost:3000"), true),
            (false, Some("http://127.0.0.1:3000"), true),
            (false, Some("http://[::1]:3000"), true),
            (false, Some("https://evil.example.com"), false),
            (false, Some("not a url"), false),
            (true, None, true),
            (true, Some("http://localhost:3000"), true),
            (true, Some("https://abc.tunnel.example"), true),
            (true, Some("https://evil.example.com"), true),
        ];
        for (public, origin, want) in cases {
            assert_eq!(
                origin_allowed(origin, public),
                want,
                "origin={origin:?} public={public}"
            );
        }
    }
}
