//! The hub actor. A single task owns the clients map and drains three
//! channels (register, unregister, incoming), so shared state needs no lock.
//! Every accepted mutation is applied to the store first and only then
//! stamped with the next sequence number; an observer that re-reads the
//! store after seeing sequence N is guaranteed to see that mutation.

use crate::sequencer::Sequencer;
use crewboard_core::protocol::{self, Message};
use crewboard_core::{AgentStatus, TaskStatus};
use crewboard_store::BoardService;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

pub type PeerId = u64;

/// Outbound frames are pre-serialized; the write pump only moves text.
pub type OutboundTx = mpsc::Sender<String>;

/// Capacity of each peer's outbound buffer. A peer that cannot drain this
/// many frames is closed rather than ever blocking the hub.
pub const OUTBOUND_BUFFER: usize = 256;

pub struct PeerHandle {
    pub id: PeerId,
    pub username: String,
    pub sender: OutboundTx,
}

pub enum HubEvent {
    Register(PeerHandle),
    Unregister(PeerId),
    Incoming { peer: PeerId, message: Message },
}

#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    pub async fn send(&self, event: HubEvent) {
        let _ = self.tx.send(event).await;
    }
}

pub struct Hub {
    service: BoardService,
    sequencer: Arc<Sequencer>,
    clients: HashMap<PeerId, PeerHandle>,
    rx: mpsc::Receiver<HubEvent>,
}

impl Hub {
    pub fn new(service: BoardService, sequencer: Arc<Sequencer>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(256);
        (
            Self {
                service,
                sequencer,
                clients: HashMap::new(),
                rx,
            },
            HubHandle { tx },
        )
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    // Dropping the senders ends every write pump, which
                    // closes the sockets and unblocks the read pumps.
                    self.clients.clear();
                    return;
                }
                event = self.rx.recv() => {
                    let Some(event) = event else { return };
                    match event {
                        HubEvent::Register(peer) => self.register(peer),
                        HubEvent::Unregister(id) => self.unregister(id),
                        HubEvent::Incoming { peer, message } => self.handle_message(peer, message),
                    }
                }
            }
        }
    }

    fn register(&mut self, peer: PeerHandle) {
        let username = peer.username.clone();
        let id = peer.id;
        self.clients.insert(id, peer);
        info!(event = "peer_joined", peer = %username, total = self.clients.len());

        self.send_full_sync(id);
        self.broadcast_except(
            id,
            protocol::MSG_PEER_JOIN,
            &protocol::PeerPayload { username },
        );
    }

    fn unregister(&mut self, id: PeerId) {
        let Some(peer) = self.clients.remove(&id) else {
            return;
        };
        info!(event = "peer_left", peer = %peer.username, remaining = self.clients.len());
        self.broadcast_all(
            protocol::MSG_PEER_LEAVE,
            &protocol::PeerPayload {
                username: peer.username,
            },
        );
    }

    fn handle_message(&mut self, peer_id: PeerId, mut msg: Message) {
        match msg.kind.as_str() {
            protocol::MSG_TASK_CREATE => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskCreatePayload>() else {
                    return;
                };
                match self.service.create_task(&payload.title, &payload.description) {
                    Ok(task) => {
                        msg.seq = self.sequencer.next();
                        // Broadcast the full task so peers learn the id and
                        // position the store assigned.
                        msg.payload = serde_json::to_value(&task).unwrap_or(Value::Null);
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_TASK_MOVE => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskMovePayload>() else {
                    return;
                };
                let Ok(status) = payload.to_column.parse::<TaskStatus>() else {
                    self.send_reject(peer_id, "invalid status");
                    return;
                };
                match self.service.move_task(&payload.task_id, status) {
                    Ok(()) => {
                        msg.seq = self.sequencer.next();
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_TASK_UPDATE => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskUpdatePayload>() else {
                    return;
                };
                match self.service.update_task_fields(&payload.task_id, &payload.patch) {
                    Ok(()) => {
                        msg.seq = self.sequencer.next();
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_TASK_DELETE => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskDeletePayload>() else {
                    return;
                };
                match self.service.delete_task(&payload.task_id) {
                    Ok(()) => {
                        msg.seq = self.sequencer.next();
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_TASK_CLAIM => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskClaimPayload>() else {
                    return;
                };
                // The authenticated username wins over whatever the payload
                // claims.
                let assignee = self
                    .clients
                    .get(&peer_id)
                    .map(|p| p.username.clone())
                    .unwrap_or(payload.assignee);
                match self.service.claim_task(&payload.task_id, &assignee) {
                    Ok(()) => {
                        msg.seq = self.sequencer.next();
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_TASK_UNCLAIM => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskUnclaimPayload>() else {
                    return;
                };
                match self.service.unclaim_task(&payload.task_id) {
                    Ok(()) => {
                        msg.seq = self.sequencer.next();
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_AGENT_STATUS => {
                let Ok(payload) = msg.decode_payload::<protocol::AgentStatusPayload>() else {
                    return;
                };
                let Ok(status) = payload.status.parse::<AgentStatus>() else {
                    self.send_reject(peer_id, "invalid agent status");
                    return;
                };
                let outcome = self.service.get_task(&payload.task_id).and_then(|mut task| {
                    task.agent_status = status;
                    self.service.update_task(&task)
                });
                match outcome {
                    Ok(()) => {
                        msg.seq = self.sequencer.next();
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_COMMENT_ADD => {
                let Ok(mut payload) = msg.decode_payload::<protocol::CommentAddPayload>() else {
                    return;
                };
                if payload.id.is_empty() {
                    payload.id = Uuid::new_v4().to_string();
                }
                match self.service.add_comment_with_id(
                    &payload.id,
                    &payload.task_id,
                    &payload.author,
                    &payload.body,
                ) {
                    Ok(_) => {
                        msg.seq = self.sequencer.next();
                        msg.payload = serde_json::to_value(&payload).unwrap_or(Value::Null);
                        self.broadcast_raw(&msg);
                    }
                    Err(err) => self.send_reject(peer_id, &err.to_string()),
                }
            }
            protocol::MSG_PING => {
                self.send_to(peer_id, &Message::bare(protocol::MSG_PONG, "server"));
            }
            other => {
                warn!(event = "unhandled_message", kind = other);
            }
        }
    }

    /// Snapshot for a freshly registered peer: every task in status+position
    /// order, stamped with the current sequence as the catch-up marker.
    fn send_full_sync(&mut self, peer_id: PeerId) {
        let tasks = match self.service.list_tasks() {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(event = "sync_full_failed", error = %err);
                return;
            }
        };
        let mut msg = match Message::new(protocol::MSG_SYNC_FULL, "server", &tasks) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(event = "sync_full_encode_failed", error = %err);
                return;
            }
        };
        msg.seq = self.sequencer.current();
        self.send_to(peer_id, &msg);
    }

    fn send_reject(&mut self, peer_id: PeerId, reason: &str) {
        let Ok(msg) = Message::new(
            protocol::MSG_SYNC_REJECT,
            "server",
            &protocol::SyncRejectPayload {
                reason: reason.to_string(),
            },
        ) else {
            return;
        };
        self.send_to(peer_id, &msg);
    }

    fn send_to(&mut self, peer_id: PeerId, msg: &Message) {
        let Ok(text) = serde_json::to_string(msg) else {
            return;
        };
        let dead = match self.clients.get(&peer_id) {
            Some(peer) => peer.sender.try_send(text).is_err(),
            None => false,
        };
        if dead {
            self.drop_slow_peer(peer_id);
        }
    }

    fn broadcast_all<P: serde::Serialize>(&mut self, kind: &str, payload: &P) {
        let Ok(mut msg) = Message::new(kind, "server", payload) else {
            return;
        };
        msg.seq = self.sequencer.next();
        self.broadcast_raw(&msg);
    }

    fn broadcast_except<P: serde::Serialize>(&mut self, except: PeerId, kind: &str, payload: &P) {
        let Ok(mut msg) = Message::new(kind, "server", payload) else {
            return;
        };
        msg.seq = self.sequencer.next();
        self.broadcast_filtered(&msg, Some(except));
    }

    fn broadcast_raw(&mut self, msg: &Message) {
        self.broadcast_filtered(msg, None);
    }

    /// Fan a frame out to every connected peer. A peer whose outbound buffer
    /// is full is dropped on the spot; the hub never waits for a slow
    /// consumer.
    fn broadcast_filtered(&mut self, msg: &Message, except: Option<PeerId>) {
        let Ok(text) = serde_json::to_string(msg) else {
            return;
        };
        let mut dead: Vec<PeerId> = Vec::new();
        for (id, peer) in &self.clients {
            if Some(*id) == except {
                continue;
            }
            if peer.sender.try_send(text.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            self.drop_slow_peer(id);
        }
    }

    fn drop_slow_peer(&mut self, id: PeerId) {
        if let Some(peer) = self.clients.remove(&id) {
            warn!(event = "peer_dropped", peer = %peer.username, reason = "send_buffer_full");
        }
    }
}
