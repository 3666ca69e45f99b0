//! The two networks as seen by the relay core.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::common::error::FeedResult;
use crate::common::Origin;
use crate::telegram::types::Update;

/// The long-polled remote feed (Telegram).
#[async_trait]
pub trait RemoteFeed: Send + Sync {
    /// One-shot fetch of everything after `cursor`. Passing a cursor also
    /// acknowledges it, so updates at or before it are never delivered again.
    async fn fetch_updates(&self, cursor: Option<i64>) -> FeedResult<Vec<Update>>;

    /// Blocking long poll for new updates, waiting up to `timeout`.
    async fn poll_updates(&self, timeout: Duration) -> FeedResult<Vec<Update>>;

    async fn send_message(&self, chat_id: i64, text: &str) -> FeedResult<()>;
}

/// The synchronous channel network (IRC).
pub trait LocalNetwork: Send + Sync {
    /// Inject a message as if it had been received on `channel` from `author`.
    fn feed_incoming(&self, channel: &str, author: &str, text: &str, origin: Origin);

    /// Queue a message for delivery to `channel`.
    fn enqueue_outgoing(&self, channel: &str, text: &str, origin: Origin);

    /// Channels currently joined.
    fn channels_joined(&self) -> HashSet<String>;

    /// Telegram chat id configured for `channel`, 0 when unbound.
    fn configured_chat_id(&self, channel: &str) -> i64;
}
