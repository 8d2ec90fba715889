//! Client-side board state, folded from sequenced hub broadcasts. The hub's
//! sequence is the only ordering authority: a frame at or below the last
//! applied sequence is a duplicate or a reordering and is dropped; the full
//! snapshot re-anchors the sequence after a reconnect.

use crewboard_core::protocol::{self, Message};
use crewboard_core::{AgentStatus, Task, TaskStatus};
use tracing::debug;

#[derive(Debug, Default)]
pub struct BoardReducer {
    tasks: Vec<Task>,
    last_seq: i64,
}

impl BoardReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn last_seq(&self) -> i64 {
        self.last_seq
    }

    /// Fold one hub frame into the board. Returns true when the board
    /// changed.
    pub fn apply(&mut self, msg: &Message) -> bool {
        if msg.kind == protocol::MSG_SYNC_FULL {
            let Ok(tasks) = msg.decode_payload::<Vec<Task>>() else {
                return false;
            };
            self.tasks = tasks;
            self.last_seq = msg.seq;
            return true;
        }

        // Sequenced mutations: anything not strictly newer has been seen.
        if msg.seq != 0 && msg.seq <= self.last_seq {
            debug!(event = "stale_frame_dropped", seq = msg.seq, last = self.last_seq);
            return false;
        }

        let changed = match msg.kind.as_str() {
            protocol::MSG_TASK_CREATE => {
                let Ok(task) = msg.decode_payload::<Task>() else {
                    return false;
                };
                if self.tasks.iter().any(|t| t.id == task.id) {
                    false
                } else {
                    self.tasks.push(task);
                    true
                }
            }
            protocol::MSG_TASK_MOVE => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskMovePayload>() else {
                    return false;
                };
                let Ok(status) = payload.to_column.parse::<TaskStatus>() else {
                    return false;
                };
                let next_pos = self.next_position(status);
                match self.tasks.iter_mut().find(|t| t.id == payload.task_id) {
                    Some(task) => {
                        task.status = status;
                        task.position = next_pos;
                        true
                    }
                    None => false,
                }
            }
            protocol::MSG_TASK_DELETE => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskDeletePayload>() else {
                    return false;
                };
                let before = self.tasks.len();
                self.tasks.retain(|t| t.id != payload.task_id);
                self.tasks.len() != before
            }
            protocol::MSG_TASK_CLAIM => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskClaimPayload>() else {
                    return false;
                };
                let assignee = if payload.assignee.is_empty() {
                    msg.sender.clone()
                } else {
                    payload.assignee
                };
                let next_pos = self.next_position(TaskStatus::Brainstorm);
                match self.tasks.iter_mut().find(|t| t.id == payload.task_id) {
                    Some(task) => {
                        task.assignee = assignee;
                        task.status = TaskStatus::Brainstorm;
                        task.position = next_pos;
                        true
                    }
                    None => false,
                }
            }
            protocol::MSG_TASK_UNCLAIM => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskUnclaimPayload>() else {
                    return false;
                };
                let next_pos = self.next_position(TaskStatus::Backlog);
                match self.tasks.iter_mut().find(|t| t.id == payload.task_id) {
                    Some(task) => {
                        task.assignee.clear();
                        task.agent_name.clear();
                        task.agent_status = AgentStatus::Idle;
                        task.branch_name.clear();
                        task.status = TaskStatus::Backlog;
                        task.position = next_pos;
                        true
                    }
                    None => false,
                }
            }
            protocol::MSG_TASK_UPDATE => {
                let Ok(payload) = msg.decode_payload::<protocol::TaskUpdatePayload>() else {
                    return false;
                };
                match self.tasks.iter_mut().find(|t| t.id == payload.task_id) {
                    Some(task) => {
                        let patch = payload.patch;
                        if let Some(v) = patch.title {
                            task.title = v;
                        }
                        if let Some(v) = patch.description {
                            task.description = v;
                        }
                        if let Some(v) = patch.status {
                            task.status = v;
                        }
                        if let Some(v) = patch.assignee {
                            task.assignee = v;
                        }
                        if let Some(v) = patch.branch_name {
                            task.branch_name = v;
                        }
                        if let Some(v) = patch.pr_url {
                            task.pr_url = v;
                        }
                        if let Some(v) = patch.pr_number {
                            task.pr_number = v;
                        }
                        if let Some(v) = patch.enrichment_status {
                            task.enrichment_status = v;
                        }
                        if let Some(v) = patch.enrichment_agent_name {
                            task.enrichment_agent_name = v;
                        }
                        true
                    }
                    None => false,
                }
            }
            protocol::MSG_AGENT_STATUS => {
                let Ok(payload) = msg.decode_payload::<protocol::AgentStatusPayload>() else {
                    return false;
                };
                let Ok(status) = payload.status.parse::<AgentStatus>() else {
                    return false;
                };
                match self.tasks.iter_mut().find(|t| t.id == payload.task_id) {
                    Some(task) => {
                        task.agent_status = status;
                        true
                    }
                    None => false,
                }
            }
            // Comments and peer presence do not change the task list.
            _ => false,
        };

        if msg.seq != 0 {
            self.last_seq = msg.seq;
        }
        changed
    }

    fn next_position(&self, status: TaskStatus) -> i64 {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.position)
            .max()
            .map_or(0, |p| p + 1)
    }
}
