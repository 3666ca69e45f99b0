//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `TGBRIDGE_TELEGRAM_TOKEN` - Telegram bot token
//! - `TGBRIDGE_TELEGRAM_TIMEOUT` - Long-poll timeout in seconds
//! - `TGBRIDGE_IRC_HOST` - IRC server host
//! - `TGBRIDGE_IRC_PORT` - IRC server port
//! - `TGBRIDGE_IRC_NICK` - IRC nickname

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "TGBRIDGE";

/// Apply environment variable overrides to a config.
///
/// This allows the bot token to be kept out of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_TELEGRAM_TOKEN", ENV_PREFIX)) {
        config.telegram.token = token;
    }
    if let Ok(timeout) = env::var(format!("{}_TELEGRAM_TIMEOUT", ENV_PREFIX)) {
        if let Ok(timeout) = timeout.parse() {
            config.telegram.timeout = timeout;
        }
    }

    if let Ok(host) = env::var(format!("{}_IRC_HOST", ENV_PREFIX)) {
        config.irc.host = host;
    }
    if let Ok(port) = env::var(format!("{}_IRC_PORT", ENV_PREFIX)) {
        if let Ok(port) = port.parse() {
            config.irc.port = port;
        }
    }
    if let Ok(nick) = env::var(format!("{}_IRC_NICK", ENV_PREFIX)) {
        config.irc.nick = nick;
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `TGBRIDGE_CONFIG`, otherwise returns "tgbridge.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "tgbridge.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn make_test_config() -> Config {
        Config {
            telegram: TelegramConfig {
                token: "1:original".to_string(),
                timeout: 30,
                api_url: DEFAULT_API_URL.to_string(),
            },
            irc: IrcConfig {
                host: "localhost".to_string(),
                port: 6667,
                nick: "tgbridge".to_string(),
                user: None,
                realname: None,
                color_nicks: false,
                channels: Vec::new(),
            },
            relay: RelayConfig::default(),
        }
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "TGBRIDGE");
    }

    #[test]
    fn test_get_config_path_default() {
        env::remove_var("TGBRIDGE_CONFIG");
        assert_eq!(get_config_path(), "tgbridge.conf");
    }

    #[test]
    fn test_apply_env_overrides_no_vars() {
        env::remove_var("TGBRIDGE_TELEGRAM_TOKEN");
        env::remove_var("TGBRIDGE_IRC_NICK");

        let result = apply_env_overrides(make_test_config());

        assert_eq!(result.telegram.token, "1:original");
        assert_eq!(result.irc.nick, "tgbridge");
    }
}
