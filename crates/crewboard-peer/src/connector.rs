//! Outbound hub connection: dial, authenticate, pump frames both ways.

use crate::offline::OfflineQueue;
use crewboard_core::protocol::Message;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connecting to {addr}: {detail}")]
    Connect { addr: String, detail: String },
    #[error("sending auth: {0}")]
    Auth(String),
    #[error("connection closed")]
    Closed,
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Turn a user-supplied address into the hub's WebSocket URL. Accepts bare
/// `host:port`, `http(s)://` origins (as printed by tunnel providers) and
/// already-formed `ws(s)://` URLs.
pub fn build_ws_url(addr: &str) -> String {
    let addr = addr.trim().trim_end_matches('/');
    if let Some(rest) = addr.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = addr.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else if addr.starts_with("ws://") || addr.starts_with("wss://") {
        format!("{addr}/ws")
    } else {
        format!("ws://{addr}/ws")
    }
}

pub struct Connector {
    addr: String,
    token: String,
}

/// A live, authenticated hub session. Incoming envelopes arrive on
/// `incoming`; `send` enqueues outbound envelopes for the write task.
pub struct Connection {
    pub incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Sender<Message>,
}

impl Connection {
    pub fn send(&self, msg: Message) -> Result<(), ConnectorError> {
        self.outgoing.try_send(msg).map_err(|_| ConnectorError::Closed)
    }

    /// Replay an offline queue in order. The queue is cleared up front
    /// (all-or-nothing drain); the hub deduplicates on the messages' own
    /// idempotent semantics.
    pub fn replay(&self, queue: &OfflineQueue) -> usize {
        let batch = queue.drain();
        let replayed = batch.len();
        for queued in batch {
            if self.send(queued.message).is_err() {
                warn!(event = "replay_send_failed");
                break;
            }
        }
        if replayed > 0 {
            info!(event = "offline_queue_replayed", count = replayed);
        }
        replayed
    }
}

impl Connector {
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: token.into(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Dial the hub, present the bearer token, and start the read/write
    /// pumps. The shutdown signal closes the socket, which unblocks the
    /// blocking read on the other side of the split.
    pub async fn connect(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Connection, ConnectorError> {
        let url = build_ws_url(&self.addr);
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|err| ConnectorError::Connect {
                addr: self.addr.clone(),
                detail: err.to_string(),
            })?;
        let (mut sink, mut stream) = ws.split();

        let auth = format!("{{\"token\": {}}}", serde_json::to_string(&self.token)?);
        sink.send(WsMessage::Text(auth))
            .await
            .map_err(|err| ConnectorError::Auth(err.to_string()))?;

        let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(256);
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(256);

        let mut read_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = read_shutdown.changed() => return,
                    frame = stream.next() => frame,
                };
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        let Ok(msg) = serde_json::from_str::<Message>(&text) else {
                            continue;
                        };
                        if incoming_tx.send(msg).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!(event = "hub_connection_closed");
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(event = "hub_read_error", error = %err);
                        return;
                    }
                }
            }
        });

        let mut write_shutdown = shutdown;
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = write_shutdown.changed() => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return;
                    }
                    msg = outgoing_rx.recv() => msg,
                };
                let Some(msg) = msg else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return;
                };
                let Ok(text) = serde_json::to_string(&msg) else {
                    continue;
                };
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    return;
                }
            }
        });

        Ok(Connection {
            incoming: incoming_rx,
            outgoing: outgoing_tx,
        })
    }

    /// Connect with exponential backoff: 500 ms doubling to a 10 s cap, a
    /// little jitter on every wait so a crowd of reconnecting peers spreads
    /// out.
    pub async fn connect_with_retry(
        &self,
        max_attempts: u32,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Connection, ConnectorError> {
        let mut backoff = Duration::from_millis(500);
        let mut last_err = ConnectorError::Closed;
        for attempt in 0..max_attempts {
            match self.connect(shutdown.clone()).await {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    warn!(event = "hub_connect_retry", attempt, error = %err);
                    last_err = err;
                }
            }
            let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4);
            tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
            backoff = (backoff * 2).min(Duration::from_secs(10));
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_from_every_address_shape() {
        assert_eq!(build_ws_url("127.0.0.1:8080"), "ws://127.0.0.1:8080/ws");
        assert_eq!(build_ws_url("http://127.0.0.1:8080"), "ws://127.0.0.1:8080/ws");
        assert_eq!(
            build_ws_url("https://abc.tunnel.example"),
            "wss://abc.tunnel.example/ws"
        );
        assert_eq!(
            build_ws_url("https://abc.tunnel.example/"),
            "wss://abc.tunnel.example/ws"
        );
        assert_eq!(build_ws_url("ws://host:1"), "ws://host:1/ws");
    }
}
