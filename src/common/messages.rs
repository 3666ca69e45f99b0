//! Canonical message types for the local (IRC) side of the bridge.
//!
//! These are the values exchanged on the local event bus between the IRC
//! client and the outbound forwarder.

/// Who produced a local message.
///
/// `Relay` marks lines written by the bridge itself; they must never be
/// forwarded back to Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// Seen on, or sent by someone on, the local network.
    #[default]
    Local,
    /// Produced by the relay loop from a Telegram update.
    Relay,
}

/// Flavour of a channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain PRIVMSG.
    Privmsg,
    /// CTCP ACTION (`/me`).
    Action,
}

/// A chat message observed on the local network.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub channel: String,
    pub nick: String,
    pub text: String,
    pub kind: MessageKind,
    /// Server-originated system notices; never relayed.
    pub error: bool,
    pub origin: Origin,
}

impl LocalMessage {
    /// A plain channel message from the local network.
    pub fn privmsg(channel: impl Into<String>, nick: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            nick: nick.into(),
            text: text.into(),
            kind: MessageKind::Privmsg,
            error: false,
            origin: Origin::Local,
        }
    }

    /// An action (`/me waves`) from the local network.
    pub fn action(channel: impl Into<String>, nick: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Action,
            ..Self::privmsg(channel, nick, text)
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn is_action(&self) -> bool {
        self.kind == MessageKind::Action
    }
}

/// Events published on the local event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    /// A channel message, seen or sent.
    Message(LocalMessage),
    /// A channel topic change.
    Topic { channel: String, topic: String },
}
