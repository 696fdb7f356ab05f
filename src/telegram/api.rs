use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::transport::Transport;

/// Percent-encodes `value` for a form body. ASCII alphanumerics and `-_.~`
/// pass through, every other byte becomes `%XX` with uppercase hex.
pub fn url_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Masks a bot token for safe logging: first 7 chars + "***" + last 4 chars.
/// Tokens of 11 chars or fewer are fully masked.
pub fn mask_token(token: &str) -> String {
    let len = token.len();
    if len <= 11 || !token.is_char_boundary(7) || !token.is_char_boundary(len - 4) {
        return "***".to_string();
    }
    format!("{}***{}", &token[..7], &token[len - 4..])
}

/// Thin client over the Bot API methods this bot uses.
pub struct TelegramClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, token: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// getUpdates URL; the offset is left out until an update has been seen.
    pub fn updates_url(&self, timeout_secs: u64, last_update_id: i64) -> String {
        let mut url = format!("{}?timeout={}", self.method_url("getUpdates"), timeout_secs);
        if last_update_id > 0 {
            url.push_str(&format!("&offset={}", last_update_id + 1));
        }
        url
    }

    /// Raw getUpdates response body.
    pub async fn get_updates(&self, timeout_secs: u64, last_update_id: i64) -> Result<String> {
        self.transport
            .get(&self.updates_url(timeout_secs, last_update_id))
            .await
    }

    /// Sends `text` to `chat_id` in HTML parse mode. Returns whether the API
    /// answered `ok: true`; transport and parse failures count as `false`.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> bool {
        let body = format!(
            "chat_id={}&text={}&parse_mode=HTML",
            url_encode(chat_id),
            url_encode(text)
        );

        let response = match self
            .transport
            .post_form(&self.method_url("sendMessage"), body)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("sendMessage to {} failed: {:#}", chat_id, e);
                return false;
            }
        };

        match serde_json::from_str::<Value>(&response) {
            Ok(root) => {
                let ok = root.get("ok").and_then(Value::as_bool) == Some(true);
                if !ok {
                    let description = root
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("no description");
                    warn!("sendMessage to {} rejected: {}", chat_id, description);
                } else {
                    debug!("Message delivered to {}", chat_id);
                }
                ok
            }
            Err(e) => {
                error!("sendMessage response is not JSON: {}", e);
                false
            }
        }
    }
}
