//! IRC -> Telegram forwarding.
//!
//! Reacts to channel messages and topic changes on the local event bus.
//! Send failures are returned to the caller and not retried.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::common::error::FeedResult;
use crate::common::{LocalEvent, LocalMessage};

use super::guard::FeedbackGuard;
use super::mapper::ChannelMapper;
use super::network::{LocalNetwork, RemoteFeed};

/// Telegram line for an IRC channel message.
pub fn format_message(message: &LocalMessage) -> String {
    if message.is_action() {
        format!("* {} {}", message.nick, message.text)
    } else {
        format!("{}> {}", message.nick, message.text)
    }
}

/// Telegram line for an IRC topic change.
pub fn format_topic(channel: &str, topic: &str) -> String {
    format!("{}: {}", channel, topic)
}

/// Forwards local channel activity to the mapped Telegram chat.
pub struct OutboundForwarder {
    feed: Arc<dyn RemoteFeed>,
    local: Arc<dyn LocalNetwork>,
    guard: FeedbackGuard,
}

impl OutboundForwarder {
    pub fn new(feed: Arc<dyn RemoteFeed>, local: Arc<dyn LocalNetwork>, guard: FeedbackGuard) -> Self {
        Self { feed, local, guard }
    }

    fn chat_for(&self, channel: &str) -> Option<i64> {
        ChannelMapper::snapshot(self.local.as_ref()).chat_for_channel(channel)
    }

    /// Forward a channel message. Returns whether anything was sent.
    pub async fn on_message(&self, message: &LocalMessage) -> FeedResult<bool> {
        if self.guard.is_relay_origin(message) {
            return Ok(false);
        }
        if message.error {
            debug!(channel = %message.channel, "Not forwarding error message");
            return Ok(false);
        }
        let Some(chat_id) = self.chat_for(&message.channel) else {
            return Ok(false);
        };

        let line = format_message(message);
        debug!(chat_id, channel = %message.channel, "IRC -> Telegram: {}", line);
        self.feed.send_message(chat_id, &line).await?;
        Ok(true)
    }

    /// Forward a topic change to the chat bound to its channel.
    pub async fn on_topic(&self, channel: &str, topic: &str) -> FeedResult<bool> {
        let Some(chat_id) = self.chat_for(channel) else {
            return Ok(false);
        };

        let line = format_topic(channel, topic);
        debug!(chat_id, channel, "IRC topic -> Telegram: {}", line);
        self.feed.send_message(chat_id, &line).await?;
        Ok(true)
    }

    pub async fn on_event(&self, event: &LocalEvent) -> FeedResult<bool> {
        match event {
            LocalEvent::Message(message) => self.on_message(message).await,
            LocalEvent::Topic { channel, topic } => self.on_topic(channel, topic).await,
        }
    }

    /// Consume the local event bus until it closes or shutdown is signalled.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<LocalEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Outbound forwarder running");
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = shutdown_rx.changed() => break,
            };

            match event {
                Ok(event) => {
                    if let Err(e) = self.on_event(&event).await {
                        error!("Failed to forward to Telegram: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Outbound forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Outbound forwarder stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{FakeFeed, FakeLocal};
    use crate::common::Origin;

    fn forwarder(feed: Arc<FakeFeed>, local: Arc<FakeLocal>) -> OutboundForwarder {
        OutboundForwarder::new(feed, local, FeedbackGuard::new(1000))
    }

    #[test]
    fn test_format_message() {
        let msg = LocalMessage::privmsg("#general", "alice", "hello");
        assert_eq!(format_message(&msg), "alice> hello");

        let msg = LocalMessage::action("#general", "alice", "waves");
        assert_eq!(format_message(&msg), "* alice waves");
    }

    #[test]
    fn test_format_topic() {
        assert_eq!(format_topic("#general", "Release day"), "#general: Release day");
    }

    #[tokio::test]
    async fn test_message_forwarded_to_mapped_chat() {
        let feed = Arc::new(FakeFeed::default());
        let local = Arc::new(FakeLocal::new(&[("#general", 42)]));
        let fwd = forwarder(feed.clone(), local);

        let sent = fwd
            .on_message(&LocalMessage::privmsg("#general", "alice", "hello"))
            .await
            .unwrap();

        assert!(sent);
        assert_eq!(feed.sent(), vec![(42, "alice> hello".to_string())]);
    }

    #[tokio::test]
    async fn test_relay_origin_never_forwarded() {
        let feed = Arc::new(FakeFeed::default());
        let local = Arc::new(FakeLocal::new(&[("#general", 42)]));
        let fwd = forwarder(feed.clone(), local);

        let msg = LocalMessage::privmsg("#general", "bob", "/weather@mybot London")
            .with_origin(Origin::Relay);
        assert!(!fwd.on_message(&msg).await.unwrap());
        assert!(feed.sent().is_empty());
    }

    #[tokio::test]
    async fn test_error_message_not_forwarded() {
        let feed = Arc::new(FakeFeed::default());
        let local = Arc::new(FakeLocal::new(&[("#general", 42)]));
        let fwd = forwarder(feed.clone(), local);

        let mut msg = LocalMessage::privmsg("#general", "tgbridge", "Error: no such command");
        msg.error = true;
        assert!(!fwd.on_message(&msg).await.unwrap());
        assert!(feed.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unbound_and_unjoined_channels_dropped() {
        let feed = Arc::new(FakeFeed::default());
        let local = Arc::new(FakeLocal::new(&[("#quiet", 0), ("#general", 42)]));
        local.part("#general");
        let fwd = forwarder(feed.clone(), local);

        let quiet = LocalMessage::privmsg("#quiet", "alice", "hi");
        let parted = LocalMessage::privmsg("#general", "alice", "hi");
        assert!(!fwd.on_message(&quiet).await.unwrap());
        assert!(!fwd.on_message(&parted).await.unwrap());
        assert!(feed.sent().is_empty());
    }

    #[tokio::test]
    async fn test_topic_uses_channel_chat() {
        let feed = Arc::new(FakeFeed::default());
        let local = Arc::new(FakeLocal::new(&[("#general", 42), ("#dev", 43)]));
        let fwd = forwarder(feed.clone(), local);

        let event = LocalEvent::Topic {
            channel: "#dev".to_string(),
            topic: "Sprint 12".to_string(),
        };
        assert!(fwd.on_event(&event).await.unwrap());
        assert_eq!(feed.sent(), vec![(43, "#dev: Sprint 12".to_string())]);
    }

    #[tokio::test]
    async fn test_topic_for_unbound_channel_dropped() {
        let feed = Arc::new(FakeFeed::default());
        let local = Arc::new(FakeLocal::new(&[("#general", 42)]));
        let fwd = forwarder(feed.clone(), local);

        assert!(!fwd.on_topic("#elsewhere", "x").await.unwrap());
        assert!(feed.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_propagates() {
        let feed = Arc::new(FakeFeed::failing_sends());
        let local = Arc::new(FakeLocal::new(&[("#general", 42)]));
        let fwd = forwarder(feed, local);

        let result = fwd
            .on_message(&LocalMessage::privmsg("#general", "alice", "hi"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_consumes_bus_until_shutdown() {
        let feed = Arc::new(FakeFeed::default());
        let local = Arc::new(FakeLocal::new(&[("#general", 42)]));
        let fwd = forwarder(feed.clone(), local);
        let (events_tx, events_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(fwd.run(events_rx, shutdown_rx));
        events_tx
            .send(LocalEvent::Message(
                LocalMessage::privmsg("#general", "bob", "echo").with_origin(Origin::Relay),
            ))
            .unwrap();
        events_tx
            .send(LocalEvent::Message(LocalMessage::action("#general", "alice", "waves")))
            .unwrap();

        for _ in 0..100 {
            if !feed.sent().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(feed.sent(), vec![(42, "* alice waves".to_string())]);
    }
}
