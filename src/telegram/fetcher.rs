use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::api::TelegramClient;
use super::queue::MessageQueue;
use super::InboundMessage;

/// Long-polls getUpdates and owns the update offset cursor.
pub struct UpdateFetcher {
    client: Arc<TelegramClient>,
    poll_timeout_secs: u64,
    last_update_id: AtomicI64,
}

impl UpdateFetcher {
    pub fn new(client: Arc<TelegramClient>, poll_timeout_secs: u64) -> Self {
        Self {
            client,
            poll_timeout_secs,
            last_update_id: AtomicI64::new(0),
        }
    }

    pub fn last_update_id(&self) -> i64 {
        self.last_update_id.load(Ordering::SeqCst)
    }

    /// One long-poll round trip. Every failure degrades to "no updates".
    pub async fn fetch_and_enqueue(&self, queue: &MessageQueue) {
        let body = match self
            .client
            .get_updates(self.poll_timeout_secs, self.last_update_id())
            .await
        {
            Ok(body) => body,
            Err(e) => {
                error!("getUpdates failed: {:#}", e);
                return;
            }
        };

        if !body.is_empty() {
            self.parse_updates(&body, queue);
        }
    }

    /// Returns the number of messages handed to the queue.
    fn parse_updates(&self, body: &str, queue: &MessageQueue) -> usize {
        let root: Value = match serde_json::from_str(body) {
            Ok(root) => root,
            Err(e) => {
                error!("Failed to parse getUpdates response: {}", e);
                return 0;
            }
        };

        if root.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = root
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            warn!("getUpdates returned not ok: {}", description);
            return 0;
        }

        let Some(updates) = root.get("result").and_then(Value::as_array) else {
            return 0;
        };

        let mut enqueued = 0;
        for update in updates {
            let update_id = update.get("update_id").and_then(Value::as_i64);
            if let Some(id) = update_id {
                self.last_update_id.fetch_max(id, Ordering::SeqCst);
            }

            let Some(message) = update.get("message") else {
                debug!("Update without message skipped");
                continue;
            };

            let msg = InboundMessage {
                chat_id: message
                    .pointer("/chat/id")
                    .and_then(Value::as_i64)
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                text: message
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                sender_name: message
                    .pointer("/from/first_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                update_id: update_id.unwrap_or_else(|| self.last_update_id()),
            };

            if queue.push(msg) {
                enqueued += 1;
            }
        }

        debug!(
            "Fetched {} updates, {} enqueued, offset now {}",
            updates.len(),
            enqueued,
            self.last_update_id()
        );
        enqueued
    }
}
