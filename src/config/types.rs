//! Configuration type definitions.

use std::time::Duration;

use serde::Deserialize;

/// Default Telegram Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub irc: IrcConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token in `<id>:<secret>` form.
    pub token: String,
    /// Long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub timeout: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// IRC server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    pub host: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    pub nick: String,
    pub user: Option<String>,
    pub realname: Option<String>,
    /// Wrap relayed author names in mIRC colour codes.
    #[serde(default)]
    pub color_nicks: bool,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// Binds an IRC channel to a Telegram chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// IRC channel name, including the `#` or `&` prefix.
    pub name: String,
    /// Telegram chat id; absent or 0 leaves the channel unbound.
    pub chat_id: Option<i64>,
}

/// Relay loop tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Fixed pause after a failed polling cycle.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_irc_port() -> u16 {
    6667
}

fn default_retry_delay() -> u64 {
    1
}

impl TelegramConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl IrcConfig {
    /// Configured chat id for a channel, 0 when unbound or unknown.
    ///
    /// IRC channel names compare case-insensitively.
    pub fn chat_id_for(&self, channel: &str) -> i64 {
        self.channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(channel))
            .and_then(|c| c.chat_id)
            .unwrap_or(0)
    }

    /// Channels to join on connect.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or(&self.nick)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nick)
    }
}

impl RelayConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
