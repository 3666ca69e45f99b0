//! Chat id <-> channel name lookup.
//!
//! A mapper is a snapshot of the joined channels and their configured chat
//! ids. It is rebuilt for every message because channel membership changes
//! at runtime.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use super::network::LocalNetwork;

/// Bidirectional lookup between Telegram chat ids and IRC channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelMapper {
    /// Lowercased channel name -> chat id (bound channels only).
    by_channel: HashMap<String, i64>,
    /// Chat id -> channel name as joined.
    by_chat: HashMap<i64, String>,
    /// Chat ids bound to more than one channel.
    ambiguous: HashSet<i64>,
}

impl ChannelMapper {
    /// Build a mapper from the current state of the local network.
    pub fn snapshot(local: &dyn LocalNetwork) -> Self {
        Self::from_bindings(
            local
                .channels_joined()
                .into_iter()
                .map(|channel| {
                    let chat_id = local.configured_chat_id(&channel);
                    (channel, chat_id)
                }),
        )
    }

    /// Build a mapper from `(channel, chat_id)` pairs. A chat id of 0 is unbound.
    pub fn from_bindings(bindings: impl IntoIterator<Item = (String, i64)>) -> Self {
        let mut mapper = Self::default();

        for (channel, chat_id) in bindings {
            if chat_id == 0 {
                continue;
            }
            mapper.by_channel.insert(channel.to_lowercase(), chat_id);
            if let Some(previous) = mapper.by_chat.insert(chat_id, channel.clone()) {
                error!(
                    chat_id,
                    "Telegram chat is bound to both {} and {}; ignoring it",
                    previous,
                    channel
                );
                mapper.ambiguous.insert(chat_id);
            }
        }

        mapper
    }

    /// Channel bound to a Telegram chat, if any.
    pub fn channel_for_chat(&self, chat_id: i64) -> Option<&str> {
        if self.ambiguous.contains(&chat_id) {
            return None;
        }
        match self.by_chat.get(&chat_id) {
            Some(channel) => {
                debug!(chat_id, channel = %channel, "Resolved Telegram chat");
                Some(channel.as_str())
            }
            None => {
                info!(chat_id, "Got message from unknown Telegram chat");
                None
            }
        }
    }

    /// Chat bound to a channel, if any.
    pub fn chat_for_channel(&self, channel: &str) -> Option<i64> {
        let chat_id = self.by_channel.get(&channel.to_lowercase()).copied();
        match chat_id {
            Some(id) if !self.ambiguous.contains(&id) => Some(id),
            _ => {
                debug!(channel, "Bridge not configured for channel");
                None
            }
        }
    }
}
