//! Telegram -> IRC relay loop.
//!
//! A single background task drains stale updates, then long-polls the feed
//! forever. Each update is deduplicated, checked against the feedback
//! guard, translated, mapped to a channel and written to IRC line by line.
//! A failed cycle is logged and retried after a fixed pause; nothing the
//! loop encounters ends it except [`RelayLoop::stop`].

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::common::error::FeedResult;
use crate::common::Origin;
use crate::config::Config;
use crate::irc::format::colorize_nick;
use crate::telegram::types::{Message, Update};

use super::cursor::{drain, UpdateCursor};
use super::guard::FeedbackGuard;
use super::mapper::ChannelMapper;
use super::network::{LocalNetwork, RemoteFeed};
use super::translator::{rewrite_bot_command, translate_message};

/// Everything the relay task needs, shared with it via `Arc`.
pub struct RelayContext {
    feed: Arc<dyn RemoteFeed>,
    local: Arc<dyn LocalNetwork>,
    guard: FeedbackGuard,
    color_nicks: bool,
    poll_timeout: Duration,
    retry_delay: Duration,
}

impl RelayContext {
    pub fn new(
        feed: Arc<dyn RemoteFeed>,
        local: Arc<dyn LocalNetwork>,
        guard: FeedbackGuard,
        config: &Config,
    ) -> Self {
        Self {
            feed,
            local,
            guard,
            color_nicks: config.irc.color_nicks,
            poll_timeout: config.telegram.poll_timeout(),
            retry_delay: config.relay.retry_delay(),
        }
    }

    /// Fixed delays between failed cycles, unbounded.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ConstantBuilder::default()
            .with_delay(self.retry_delay)
            .with_max_times(usize::MAX)
            .build()
    }

    /// Relay one message to its channel, if it should be relayed at all.
    ///
    /// Returns the number of lines written to IRC.
    pub fn handle_message(&self, message: &Message) -> usize {
        let chat_id = message.chat.id;
        let Some(translated) = translate_message(message) else {
            debug!(chat_id, "Message without sender, skipping");
            return 0;
        };
        if self.guard.is_self_authored(translated.author_id) {
            debug!(chat_id, "Ignoring message from myself");
            return 0;
        }
        if translated.text.is_empty() {
            debug!(chat_id, "Nothing to relay in message");
            return 0;
        }

        let mapper = ChannelMapper::snapshot(self.local.as_ref());
        let Some(channel) = mapper.channel_for_chat(chat_id) else {
            return 0;
        };

        let author = translated.author;
        let tag = if self.color_nicks {
            colorize_nick(&author)
        } else {
            author.clone()
        };

        let mut relayed = 0;
        for line in translated.text.lines() {
            let irc_text = format!("{}> {}", tag, line);
            debug!(channel, "Telegram -> IRC: {}", irc_text);
            self.local.enqueue_outgoing(channel, &irc_text, Origin::Relay);
            self.local
                .feed_incoming(channel, &author, &rewrite_bot_command(line), Origin::Relay);
            relayed += 1;
        }
        relayed
    }

    /// Relay a polled batch in feed order, skipping already-seen updates.
    fn handle_batch(&self, cursor: &mut UpdateCursor, updates: Vec<Update>) {
        for update in updates {
            if !cursor.accept(update.update_id) {
                debug!(update_id = update.update_id, "Skipping already-seen update");
                continue;
            }
            match update.message {
                Some(message) => {
                    self.handle_message(&message);
                }
                None => debug!(update_id = update.update_id, "Update without message"),
            }
        }
    }

    /// Drain the feed, retrying until it works. `None` means shutdown won.
    async fn drain_until_ready(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<Option<i64>> {
        let mut backoff = self.backoff();
        loop {
            let result = tokio::select! {
                result = drain(self.feed.as_ref()) => result,
                _ = shutdown_rx.changed() => return None,
            };
            match result {
                Ok(cursor) => return Some(cursor),
                Err(e) => {
                    debug!("Draining stale updates failed: {:?}", e);
                    error!("Draining stale updates failed: {}", e);
                }
            }
            if !self.pause(&mut backoff, shutdown_rx).await {
                return None;
            }
        }
    }

    /// Sleep for the next backoff delay. Returns false if shutdown arrived.
    async fn pause(
        &self,
        backoff: &mut impl Iterator<Item = Duration>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let delay = backoff.next().unwrap_or(self.retry_delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown_rx.changed() => false,
        }
    }

    /// Relay the results of one long poll.
    fn cycle(&self, cursor: &mut UpdateCursor, updates: FeedResult<Vec<Update>>) -> FeedResult<()> {
        let updates = updates?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "Received Telegram updates");
        }
        self.handle_batch(cursor, updates);
        Ok(())
    }

    /// Body of the background task.
    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let Some(last) = self.drain_until_ready(&mut shutdown_rx).await else {
            info!("Relay loop stopped before draining");
            return;
        };
        let mut cursor = UpdateCursor::new(last);
        let mut backoff = self.backoff();
        info!(cursor = ?cursor.last(), "Relay loop running");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let polled = tokio::select! {
                result = self.feed.poll_updates(self.poll_timeout) => result,
                _ = shutdown_rx.changed() => break,
            };

            if let Err(e) = self.cycle(&mut cursor, polled) {
                debug!("Relay cycle failed: {:?}", e);
                error!("Relay cycle failed: {}", e);
                if !self.pause(&mut backoff, &mut shutdown_rx).await {
                    break;
                }
            }
        }

        info!("Relay loop stopped");
    }
}

/// Lifecycle of the relay task.
enum RelayState {
    Stopped,
    Running {
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
}

/// Owns the background relay task.
pub struct RelayLoop {
    context: Arc<RelayContext>,
    state: RelayState,
}

impl RelayLoop {
    pub fn new(context: RelayContext) -> Self {
        Self {
            context: Arc::new(context),
            state: RelayState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RelayState::Running { .. })
    }

    /// Spawn the relay task and return immediately.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Relay loop already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self.context).run(shutdown_rx));
        self.state = RelayState::Running { shutdown_tx, task };
        info!("Relay loop started");
    }

    /// Signal the task to stop. The task exits at its next suspension point,
    /// interrupting an in-flight long poll. Returns the task handle so the
    /// caller may wait for it.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        match std::mem::replace(&mut self.state, RelayState::Stopped) {
            RelayState::Running { shutdown_tx, task } => {
                if shutdown_tx.send(true).is_err() {
                    debug!("Relay task already gone");
                }
                Some(task)
            }
            RelayState::Stopped => None,
        }
    }

    /// Stop and wait up to `timeout` for the task to finish.
    pub async fn shutdown(&mut self, timeout: Duration) {
        let Some(task) = self.stop() else {
            return;
        };
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(())) => debug!("Relay task joined"),
            Ok(Err(e)) => warn!("Relay task panicked: {}", e),
            Err(_) => warn!("Relay task did not stop within {:?}", timeout),
        }
    }
}

impl Drop for RelayLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
