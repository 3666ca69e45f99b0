//! mIRC formatting helpers.

const COLOR: char = '\x03';

/// Colours readable on both light and dark backgrounds. White, black and
/// the greys are left out.
const NICK_PALETTE: [u8; 10] = [2, 3, 4, 5, 6, 7, 9, 10, 12, 13];

/// Wrap a nick in an mIRC colour picked from its bytes, so the same nick
/// always gets the same colour.
pub fn colorize_nick(nick: &str) -> String {
    let hash = nick
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    let color = NICK_PALETTE[(hash as usize) % NICK_PALETTE.len()];
    format!("{COLOR}{color:02}{nick}{COLOR}")
}

/// Remove mIRC colour, bold, italic, underline, reverse and reset codes.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            COLOR => {
                // Up to two foreground digits, then optionally ,NN background
                for _ in 0..2 {
                    if chars.next_if(|c| c.is_ascii_digit()).is_none() {
                        break;
                    }
                }
                if chars.peek() == Some(&',') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                        chars.next();
                        for _ in 0..2 {
                            if chars.next_if(|c| c.is_ascii_digit()).is_none() {
                                break;
                            }
                        }
                    }
                }
            }
            '\x02' | '\x0f' | '\x16' | '\x1d' | '\x1f' => {}
            _ => out.push(c),
        }
    }
    out
}
