//! Channel Protocol
//!
//! Text encoding that multiplexes logical channels over one write
//! characteristic:
//!
//! ```text
//! batch   := command (";" command)* [";"]
//! command := channel ":" data
//! channel := signed decimal integer (surrounding whitespace ignored)
//! data    := any text; everything after the first ':' (may contain ':')
//! ```
//!
//! `"1:up;2:left;3:"` decodes to `(1, "up")`, `(2, "left")`, `(3, "")`.
//! Empty segments are skipped.

use core::str::Split;

use crate::error::DecodeError;

/// Logical channel identifier.
pub type ChannelId = i32;

pub const COMMAND_SEPARATOR: char = ';';
pub const CHANNEL_SEPARATOR: char = ':';

/// One decoded `channel:data` command, borrowing from the written value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command<'a> {
    pub channel: ChannelId,
    pub data: &'a str,
}

impl<'a> Command<'a> {
    /// Decode a single non-empty segment.
    pub fn parse(segment: &'a str) -> Result<Self, DecodeError> {
        let (channel, data) = segment
            .split_once(CHANNEL_SEPARATOR)
            .ok_or(DecodeError::MissingSeparator)?;
        let channel = channel
            .trim()
            .parse::<ChannelId>()
            .map_err(|_| DecodeError::InvalidChannel)?;

        Ok(Self { channel, data })
    }
}

/// Validate that a written value is text.
pub fn decode(value: &[u8]) -> Result<&str, DecodeError> {
    core::str::from_utf8(value).map_err(|_| DecodeError::InvalidUtf8)
}

/// Lazily decode the commands of a batch, in order.
///
/// The iterator yields every error it meets; callers that want fail-fast
/// semantics stop at the first `Err`.
pub fn parse_commands(batch: &str) -> Commands<'_> {
    Commands {
        segments: batch.split(COMMAND_SEPARATOR),
    }
}

pub struct Commands<'a> {
    segments: Split<'a, char>,
}

impl<'a> Iterator for Commands<'a> {
    type Item = Result<Command<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let segment = self.segments.next()?;
            if segment.is_empty() {
                continue;
            }
            return Some(Command::parse(segment));
        }
    }
}
