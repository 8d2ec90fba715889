//! Wire protocol for hub/peer synchronization. Every WebSocket frame is one
//! JSON [`Message`] envelope; `seq` is assigned by the hub for broadcasts and
//! zero on client requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on a single wire frame.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

pub const MSG_SYNC_FULL: &str = "sync.full";
pub const MSG_SYNC_ACK: &str = "sync.ack";
pub const MSG_SYNC_REJECT: &str = "sync.reject";
pub const MSG_TASK_CREATE: &str = "task.create";
pub const MSG_TASK_UPDATE: &str = "task.update";
pub const MSG_TASK_MOVE: &str = "task.move";
pub const MSG_TASK_DELETE: &str = "task.delete";
pub const MSG_TASK_CLAIM: &str = "task.claim";
pub const MSG_TASK_UNCLAIM: &str = "task.unclaim";
pub const MSG_AGENT_STATUS: &str = "task.agent_status";
pub const MSG_COMMENT_ADD: &str = "comment.add";
pub const MSG_PEER_JOIN: &str = "peer.join";
pub const MSG_PEER_LEAVE: &str = "peer.leave";
pub const MSG_LEADER_PROMOTE: &str = "leader.promote";
pub const MSG_PING: &str = "ping";
pub const MSG_PONG: &str = "pong";

/// Wire envelope. The payload stays opaque until the type tag has been
/// matched, so unknown message types pass through decode without error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub seq: i64,
    #[serde(default)]
    pub sender: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Message {
    /// Build an envelope with a serialized payload and no sequence assigned.
    pub fn new<P: Serialize>(kind: &str, sender: &str, payload: &P) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.to_string(),
            seq: 0,
            sender: sender.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Build a payload-less envelope (ping/pong).
    pub fn bare(kind: &str, sender: &str) -> Self {
        Self {
            kind: kind.to_string(),
            seq: 0,
            sender: sender.to_string(),
            payload: Value::Null,
        }
    }

    pub fn decode_payload<P: for<'de> Deserialize<'de>>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCreatePayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskMovePayload {
    pub task_id: String,
    #[serde(default)]
    pub from_column: String,
    pub to_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDeletePayload {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskClaimPayload {
    pub task_id: String,
    #[serde(default)]
    pub assignee: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskUnclaimPayload {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskUpdatePayload {
    pub task_id: String,
    pub patch: crate::TaskPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatusPayload {
    pub task_id: String,
    pub status: String,
}

/// Comments are content-addressed on the wire: the sender mints the id so a
/// replay after reconnect inserts the same row instead of a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentAddPayload {
    #[serde(default)]
    pub id: String,
    pub task_id: String,
    pub author: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerPayload {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRejectPayload {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskPatch;

    #[test]
    fn envelope_round_trip() {
        let msg = Message::new(
            MSG_TASK_MOVE,
            "mira",
            &TaskMovePayload {
                task_id: "abc".to_string(),
                from_column: "planning".to_string(),
                to_column: "in_progress".to_string(),
            },
        )
        .unwrap();

        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);

        let payload: TaskMovePayload = decoded.decode_payload().unwrap();
        assert_eq!(payload.to_column, "in_progress");
    }

    #[test]
    fn bare_message_omits_payload() {
        let encoded = serde_json::to_string(&Message::bare(MSG_PING, "mira")).unwrap();
        assert!(!encoded.contains("payload"));
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.kind, MSG_PING);
        assert!(decoded.payload.is_null());
    }

    #[test]
    fn payloads_round_trip() {
        fn check<P: Serialize + for<'de> Deserialize<'de> + PartialEq + std::fmt::Debug>(p: P) {
            let encoded = serde_json::to_string(&p).unwrap();
            let decoded: P = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, p);
        }

        check(TaskCreatePayload {
            title: "wire the hub".to_string(),
            description: "see notes".to_string(),
        });
        check(TaskDeletePayload {
            task_id: "abc".to_string(),
        });
        check(TaskClaimPayload {
            task_id: "abc".to_string(),
            assignee: "mira".to_string(),
        });
        check(TaskUnclaimPayload {
            task_id: "abc".to_string(),
        });
        check(TaskUpdatePayload {
            task_id: "abc".to_string(),
            patch: TaskPatch {
                branch_name: Some("feat/hub".to_string()),
                ..Default::default()
            },
        });
        check(AgentStatusPayload {
            task_id: "abc".to_string(),
            status: "active".to_string(),
        });
        check(CommentAddPayload {
            id: "c-1".to_string(),
            task_id: "abc".to_string(),
            author: "mira".to_string(),
            body: "looks good".to_string(),
        });
        check(PeerPayload {
            username: "mira".to_string(),
        });
        check(SyncRejectPayload {
            reason: "rate limited".to_string(),
        });
    }

    #[test]
    fn unknown_message_type_still_decodes() {
        let decoded: Message =
            serde_json::from_str(r#"{"type":"future.thing","seq":9,"sender":"x","payload":{"a":1}}"#)
                .unwrap();
        assert_eq!(decoded.kind, "future.thing");
        assert_eq!(decoded.seq, 9);
    }
}
