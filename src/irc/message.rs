//! IRC message lines.
//!
//! `[:prefix] COMMAND param1 param2 ... [:trailing]`

use std::fmt;

const CTCP_DELIM: char = '\x01';

/// A parsed IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn new(command: &str, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.to_string(),
            params,
        }
    }

    /// Parse one line (without the line terminator). Returns `None` for
    /// blank or commandless lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, tail) = stripped.split_once(' ')?;
                rest = tail.trim_start();
                Some(prefix.to_string())
            }
            None => None,
        };

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    /// True when the prefix names a server rather than `nick!user@host`.
    /// Nicks cannot contain dots, server names always do.
    pub fn is_from_server(&self) -> bool {
        self.prefix
            .as_deref()
            .is_some_and(|p| !p.contains('!') && !p.contains('@') && p.contains('.'))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Body of a CTCP ACTION (`\x01ACTION text\x01`), if this text is one.
    pub fn action_text(text: &str) -> Option<&str> {
        let inner = text.strip_prefix(CTCP_DELIM)?;
        let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
        inner.strip_prefix("ACTION ").or_else(|| (inner == "ACTION").then_some(""))
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", vec![target.to_string(), sanitize(text)])
    }

    pub fn nick_cmd(nick: &str) -> Self {
        Self::new("NICK", vec![nick.to_string()])
    }

    pub fn user(user: &str, realname: &str) -> Self {
        Self::new(
            "USER",
            vec![
                user.to_string(),
                "0".to_string(),
                "*".to_string(),
                sanitize(realname),
            ],
        )
    }

    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", vec![channel.to_string()])
    }

    pub fn pong(params: Vec<String>) -> Self {
        Self::new("PONG", params)
    }

    pub fn quit(reason: &str) -> Self {
        Self::new("QUIT", vec![sanitize(reason)])
    }
}

/// Line breaks would smuggle extra commands onto the wire.
fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon = param.is_empty() || param.contains(' ') || param.starts_with(':');
            if i == last && needs_colon {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}
