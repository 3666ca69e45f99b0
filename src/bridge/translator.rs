//! Telegram message -> relay text translation.
//!
//! Text messages pass through untouched. Everything else is rendered as a
//! short placeholder such as `<photo>` or `<sticker 😀>`.

use std::borrow::Cow;
use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::telegram::types::{MediaKind, Message, MessagePayload, User};

/// `/cmd@botname` at the start of a line.
static BOT_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([^\s@]+)(?:@\w+)").expect("bot command pattern is valid"));

/// A Telegram message reduced to what the relay needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated {
    pub author_id: i64,
    pub author: String,
    pub text: String,
}

/// Translate a message that has a sender. Returns `None` for anonymous posts.
pub fn translate_message(message: &Message) -> Option<Translated> {
    let user = message.from.as_ref()?;
    let (author_id, author) = author(user);
    Some(Translated {
        author_id,
        author,
        text: translate(message),
    })
}

/// Text of a message, or a placeholder for its media, or `""`.
pub fn translate(message: &Message) -> String {
    match &message.payload {
        MessagePayload::Text(text) => text.clone(),
        MessagePayload::Media(kind) => render_media(kind),
        MessagePayload::Empty => String::new(),
    }
}

/// Placeholder text for a media attachment.
pub fn render_media(kind: &MediaKind) -> String {
    match kind {
        MediaKind::Sticker { emoji } => format!("<sticker {}>", emoji.as_deref().unwrap_or("")),
        MediaKind::Location {
            latitude,
            longitude,
        } => format!(
            "<location http://www.google.com/maps/place/{0:?},{1:?}/@{0:?},{1:?},17z>",
            latitude, longitude
        ),
        MediaKind::Contact {
            first_name,
            last_name,
            phone_number,
        } => format!(
            "<contact {} {} {}>",
            first_name.as_deref().unwrap_or(""),
            last_name.as_deref().unwrap_or(""),
            phone_number.as_deref().unwrap_or("")
        ),
        other => format!("<{}>", other.name()),
    }
}

/// `(id, display name)` for a Telegram user.
///
/// The username wins; otherwise first and last name are joined with no
/// separator, with the numeric id standing in for a missing first name.
pub fn author(user: &User) -> (i64, String) {
    if let Some(username) = &user.username {
        return (user.id, username.clone());
    }

    let first = user
        .first_name
        .clone()
        .unwrap_or_else(|| user.id.to_string());
    let last = user.last_name.as_deref().unwrap_or("");
    (user.id, first + last)
}

/// Rewrite `/cmd@bot args` into `|cmd args` so the addressed bot command
/// reads as a local command once fed into the channel.
pub fn rewrite_bot_command(text: &str) -> Cow<'_, str> {
    BOT_COMMAND.replace(text, "|$1")
}
