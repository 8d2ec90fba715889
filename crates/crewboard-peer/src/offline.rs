use crewboard_core::protocol::Message;
use std::sync::Mutex;
use uuid::Uuid;

/// Messages composed while disconnected from the hub. Each entry carries an
/// idempotency key minted at enqueue time; replay preserves order, and the
/// hub tolerates duplicates because mutations are idempotent at the state
/// level or content-addressed.
#[derive(Debug, Default)]
pub struct OfflineQueue {
    messages: Mutex<Vec<QueuedMessage>>,
}

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub idempotency_key: String,
    pub message: Message,
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, message: Message) {
        let mut messages = self.messages.lock().unwrap();
        messages.push(QueuedMessage {
            idempotency_key: Uuid::new_v4().to_string(),
            message,
        });
    }

    /// Take everything, in order. All-or-nothing: the queue is empty after
    /// this call regardless of what the caller does with the batch.
    pub fn drain(&self) -> Vec<QueuedMessage> {
        let mut messages = self.messages.lock().unwrap();
        std::mem::take(&mut *messages)
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewboard_core::protocol;

    fn msg(kind: &str) -> Message {
        Message::bare(kind, "mira")
    }

    #[test]
    fn drain_preserves_order_and_clears() {
        let queue = OfflineQueue::new();
        queue.enqueue(msg(protocol::MSG_TASK_CREATE));
        queue.enqueue(msg(protocol::MSG_TASK_MOVE));
        queue.enqueue(msg(protocol::MSG_COMMENT_ADD));
        assert_eq!(queue.len(), 3);

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].message.kind, protocol::MSG_TASK_CREATE);
        assert_eq!(drained[1].message.kind, protocol::MSG_TASK_MOVE);
        assert_eq!(drained[2].message.kind, protocol::MSG_COMMENT_ADD);
        assert!(queue.is_empty());
    }

    #[test]
    fn idempotency_keys_are_unique() {
        let queue = OfflineQueue::new();
        for _ in 0..50 {
            queue.enqueue(msg(protocol::MSG_PING));
        }
        let drained = queue.drain();
        let keys: std::collections::HashSet<_> =
            drained.iter().map(|m| m.idempotency_key.clone()).collect();
        assert_eq!(keys.len(), 50);
    }
}
