//! Telegram Bot API payload types.
//!
//! Raw messages arrive with one optional field per media kind. They are
//! folded into [`MessagePayload`] on deserialization so the rest of the
//! bridge never has to probe optional fields.

use serde::Deserialize;

/// One envelope from `getUpdates`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

/// A Telegram chat (group, supergroup or private).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Message author.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A decoded chat message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(from = "RawMessage")]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub payload: MessagePayload,
}

/// What a message carries.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// Non-empty text.
    Text(String),
    /// The highest-priority media attachment present.
    Media(MediaKind),
    /// Nothing the bridge knows how to show.
    Empty,
}

/// Media kinds in relay priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Sticker {
        emoji: Option<String>,
    },
    Contact {
        first_name: Option<String>,
        last_name: Option<String>,
        phone_number: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Venue,
    Voice,
    Game,
    Document,
}

impl MediaKind {
    /// Lowercase Bot API field name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Sticker { .. } => "sticker",
            Self::Contact { .. } => "contact",
            Self::Location { .. } => "location",
            Self::Venue => "venue",
            Self::Voice => "voice",
            Self::Game => "game",
            Self::Document => "document",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSticker {
    #[serde(default)]
    emoji: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContact {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude: f64,
    longitude: f64,
}

/// Wire shape of a message, one optional field per media kind.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    photo: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    video: Option<serde_json::Value>,
    #[serde(default)]
    audio: Option<serde_json::Value>,
    #[serde(default)]
    sticker: Option<RawSticker>,
    #[serde(default)]
    contact: Option<RawContact>,
    #[serde(default)]
    location: Option<RawLocation>,
    #[serde(default)]
    venue: Option<serde_json::Value>,
    #[serde(default)]
    voice: Option<serde_json::Value>,
    #[serde(default)]
    game: Option<serde_json::Value>,
    #[serde(default)]
    document: Option<serde_json::Value>,
}

impl RawMessage {
    /// First populated media kind, in priority order.
    fn media(self) -> Option<MediaKind> {
        let present = |v: &Option<serde_json::Value>| v.as_ref().is_some_and(|v| !v.is_null());

        if self.photo.as_ref().is_some_and(|p| !p.is_empty()) {
            return Some(MediaKind::Photo);
        }
        if present(&self.video) {
            return Some(MediaKind::Video);
        }
        if present(&self.audio) {
            return Some(MediaKind::Audio);
        }
        if let Some(sticker) = self.sticker {
            return Some(MediaKind::Sticker {
                emoji: sticker.emoji,
            });
        }
        if let Some(contact) = self.contact {
            return Some(MediaKind::Contact {
                first_name: contact.first_name,
                last_name: contact.last_name,
                phone_number: contact.phone_number,
            });
        }
        if let Some(location) = self.location {
            return Some(MediaKind::Location {
                latitude: location.latitude,
                longitude: location.longitude,
            });
        }
        if present(&self.venue) {
            return Some(MediaKind::Venue);
        }
        if present(&self.voice) {
            return Some(MediaKind::Voice);
        }
        if present(&self.game) {
            return Some(MediaKind::Game);
        }
        if present(&self.document) {
            return Some(MediaKind::Document);
        }
        None
    }
}

impl From<RawMessage> for Message {
    fn from(mut raw: RawMessage) -> Self {
        let message_id = raw.message_id;
        let chat = raw.chat.clone();
        let from = raw.from.take();
        let payload = match raw.text.take().filter(|t| !t.is_empty()) {
            Some(text) => MessagePayload::Text(text),
            None => raw
                .media()
                .map(MessagePayload::Media)
                .unwrap_or(MessagePayload::Empty),
        };

        Self {
            message_id,
            chat,
            from,
            payload,
        }
    }
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error_code: Option<i64>,
    pub description: Option<String>,
}
