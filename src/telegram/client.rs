//! Telegram Bot API client.
//!
//! Implements [`RemoteFeed`] on top of `getUpdates` and `sendMessage`.
//! Update bookkeeping (the next `offset`) is kept here so repeated long
//! polls never see the same update twice.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bridge::RemoteFeed;
use crate::common::error::{FeedError, FeedResult};
use crate::config::TelegramConfig;
use crate::telegram::types::{ApiResponse, Update};

/// Extra time granted to the HTTP request on top of the long-poll timeout.
const REQUEST_GRACE: Duration = Duration::from_secs(10);

/// Telegram bot client using long polling.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    /// Next `offset` to request; everything below it has been acknowledged.
    next_offset: Mutex<Option<i64>>,
}

impl TelegramClient {
    /// Create a new client for the configured bot.
    pub fn new(config: &TelegramConfig) -> FeedResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(REQUEST_GRACE)
            .build()?;
        let base_url = format!(
            "{}/bot{}",
            config.api_url.trim_end_matches('/'),
            config.token
        );

        Ok(Self {
            http,
            base_url,
            next_offset: Mutex::new(None),
        })
    }

    /// Offset the next poll will request.
    pub async fn next_offset(&self) -> Option<i64> {
        *self.next_offset.lock().await
    }

    /// Call a Bot API method and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> FeedResult<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response: ApiResponse<T> = self
            .http
            .post(&url)
            .timeout(timeout + REQUEST_GRACE)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(FeedError::Api {
                code: response.error_code.unwrap_or_default(),
                description: response
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }

        response.result.ok_or_else(|| FeedError::Decode {
            message: format!("{} response has no result", method),
        })
    }

    /// Fetch updates starting at `offset` and advance the stored offset.
    ///
    /// Each update is decoded on its own; a malformed one is skipped but
    /// still acknowledged so it cannot wedge the feed.
    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> FeedResult<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }

        let raw: Vec<Value> = self.call("getUpdates", body, timeout).await?;

        let mut highest = None;
        let mut updates = Vec::with_capacity(raw.len());
        for value in raw {
            let Some(update_id) = value.get("update_id").and_then(Value::as_i64) else {
                warn!("Dropping update without update_id: {}", value);
                continue;
            };
            highest = highest.max(Some(update_id));

            match serde_json::from_value::<Update>(value) {
                Ok(update) => updates.push(update),
                Err(e) => warn!(update_id, "Malformed Telegram update skipped: {}", e),
            }
        }

        let mut next_offset = self.next_offset.lock().await;
        let candidate = highest.map(|id| id + 1).or(offset);
        if candidate > *next_offset {
            *next_offset = candidate;
        }
        debug!(count = updates.len(), next_offset = ?*next_offset, "Fetched Telegram updates");

        Ok(updates)
    }
}

#[async_trait]
impl RemoteFeed for TelegramClient {
    async fn fetch_updates(&self, cursor: Option<i64>) -> FeedResult<Vec<Update>> {
        self.get_updates(cursor.map(|c| c + 1), Duration::ZERO).await
    }

    async fn poll_updates(&self, timeout: Duration) -> FeedResult<Vec<Update>> {
        let offset = self.next_offset().await;
        self.get_updates(offset, timeout).await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> FeedResult<()> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        let _: Value = self.call("sendMessage", body, Duration::ZERO).await?;
        debug!(chat_id, "Sent message to Telegram");
        Ok(())
    }
}
