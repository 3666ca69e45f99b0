//! Relay core between Telegram and IRC.
//!
//! ## Module Structure
//!
//! - `network`: The two network seams (`RemoteFeed`, `LocalNetwork`)
//! - `mapper`: Chat id <-> channel lookup
//! - `translator`: Telegram message -> relay text
//! - `guard`: Feedback loop suppression
//! - `cursor`: Update cursor and startup drain
//! - `relay`: Telegram -> IRC background loop (`RelayLoop`)
//! - `outbound`: IRC -> Telegram forwarding (`OutboundForwarder`)

pub mod cursor;
pub mod guard;
pub mod mapper;
pub mod network;
pub mod outbound;
pub mod relay;
pub mod translator;

#[cfg(test)]
pub mod testing;

pub use guard::FeedbackGuard;
pub use network::{LocalNetwork, RemoteFeed};
pub use outbound::OutboundForwarder;
pub use relay::{RelayContext, RelayLoop};
