//! Telegram side of the bridge.
//!
//! The Bot API is only reachable through a long-polled update feed;
//! outgoing messages are plain `sendMessage` calls.

pub mod client;
pub mod types;

pub use client::TelegramClient;
