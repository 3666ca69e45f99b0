//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::collections::HashMap;
use std::path::Path;

use crate::common::error::ConfigError;
use crate::config::env::apply_env_overrides;
use crate::config::parser::load_config;
use crate::config::types::Config;

/// Placeholder shipped in the sample configuration.
const TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN_HERE";

/// Load a config file, apply environment overrides and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let config = apply_env_overrides(load_config(path)?);
    validate_config(&config)?;
    Ok(config)
}

/// Extract the bot's numeric user id from a `<id>:<secret>` token.
pub fn parse_bot_id(token: &str) -> Result<i64, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        field: "telegram.token".to_string(),
        message: format!("{} (expected <ID>:<SECRET>)", message),
    };

    let (id, secret) = token
        .split_once(':')
        .ok_or_else(|| invalid("missing ':' separator"))?;
    if secret.is_empty() {
        return Err(invalid("empty secret"));
    }
    id.parse::<i64>()
        .map_err(|_| invalid("bot id is not numeric"))
}

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Telegram
    if config.telegram.token.is_empty() {
        errors.push("telegram.token is required".to_string());
    } else if config.telegram.token == TOKEN_PLACEHOLDER {
        errors.push("telegram.token has not been configured (still using placeholder)".to_string());
    } else if let Err(e) = parse_bot_id(&config.telegram.token) {
        errors.push(e.to_string());
    }
    if config.telegram.timeout == 0 {
        errors.push("telegram.timeout must be non-zero".to_string());
    }

    // IRC
    if config.irc.host.is_empty() {
        errors.push("irc.host is required".to_string());
    }
    if config.irc.port == 0 {
        errors.push("irc.port must be non-zero".to_string());
    }
    if config.irc.nick.is_empty() {
        errors.push("irc.nick is required".to_string());
    }

    // Channel mappings: the chat id -> channel direction must stay unambiguous
    let mut seen: HashMap<i64, &str> = HashMap::new();
    for (i, channel) in config.irc.channels.iter().enumerate() {
        if !channel.name.starts_with('#') && !channel.name.starts_with('&') {
            errors.push(format!(
                "irc.channels[{}].name '{}' must start with '#' or '&'",
                i, channel.name
            ));
        }
        let chat_id = channel.chat_id.unwrap_or(0);
        if chat_id == 0 {
            continue;
        }
        if let Some(previous) = seen.insert(chat_id, &channel.name) {
            errors.push(format!(
                "irc.channels[{}]: chat_id {} is already bound to '{}'",
                i, chat_id, previous
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
