//! Line framing for the IRC connection.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::common::error::IrcError;

use super::message::IrcMessage;

/// Longest line accepted from the server before the connection is dropped.
/// Servers cap lines at 512 bytes; IRCv3 tags can push that to ~8K.
pub const MAX_LINE_LENGTH: usize = 8192;

/// CRLF-terminated IRC lines. Invalid UTF-8 is decoded lossily, since
/// channels routinely carry legacy encodings.
#[derive(Debug, Default)]
pub struct IrcCodec;

impl Decoder for IrcCodec {
    type Item = IrcMessage;
    type Error = IrcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(IrcError::LineTooLong {
                        max: MAX_LINE_LENGTH,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(newline + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }

            match IrcMessage::parse(text) {
                Some(message) => return Ok(Some(message)),
                None => debug!("Skipping unparsable IRC line: {:?}", text),
            }
        }
    }
}

impl Encoder<IrcMessage> for IrcCodec {
    type Error = IrcError;

    fn encode(&mut self, item: IrcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
