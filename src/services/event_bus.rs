use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum SystemEvent {
    DocumentIndexed {
        upload_document_id: i32,
        chunk_count: usize,
        timestamp: DateTime<Utc>,
    },
    DocumentReindexed {
        upload_document_id: i32,
        old_chunk_count: usize,
        new_chunk_count: usize,
        timestamp: DateTime<Utc>,
    },
    ChatMessageCreated {
        session_id: i32,
        message_id: i32,
        ai_model_used: String,
        timestamp: DateTime<Utc>,
    },
}

pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: SystemEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("No event subscribers: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }
}
