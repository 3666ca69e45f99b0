//! IRC side of the bridge.
//!
//! - `message`: Line parsing and serialisation
//! - `codec`: CRLF framing over the TCP stream
//! - `format`: mIRC colour helpers
//! - `client`: Registration, channel tracking and the local event bus

pub mod client;
pub mod codec;
pub mod format;
pub mod message;

pub use client::new_client;
