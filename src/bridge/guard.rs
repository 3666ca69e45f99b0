//! Feedback loop suppression.
//!
//! Two kinds of message must never be relayed: Telegram messages written
//! by the bot itself, and IRC lines the relay produced.

use crate::common::error::ConfigError;
use crate::common::{LocalMessage, Origin};
use crate::config::parse_bot_id;

/// Decides whether a message originated from the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackGuard {
    /// The bot's own Telegram user id.
    bot_id: i64,
}

impl FeedbackGuard {
    pub fn new(bot_id: i64) -> Self {
        Self { bot_id }
    }

    /// Derive the bot identity from a `<id>:<secret>` token.
    pub fn from_token(token: &str) -> Result<Self, ConfigError> {
        parse_bot_id(token).map(Self::new)
    }

    pub fn bot_id(&self) -> i64 {
        self.bot_id
    }

    /// True for Telegram messages sent by the bot itself.
    pub fn is_self_authored(&self, user_id: i64) -> bool {
        user_id == self.bot_id
    }

    /// True for IRC messages written by the relay.
    pub fn is_relay_origin(&self, message: &LocalMessage) -> bool {
        message.origin == Origin::Relay
    }
}
