use crate::error::TransportError;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Prompt printed by the console once a command has finished.
pub const PROMPT: &str = "pylon>";

// a single console line is never anywhere near this long
const MAX_LINE_LENGTH: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    Prompt,
}

/// Splits the console byte stream into lines.
///
/// The console mixes LF and CR+LF line endings, so any run of CR/LF ends a
/// line and empty lines are dropped. The prompt is not newline terminated;
/// it is recognised as the only pending bytes in the buffer.
#[derive(Debug, Default)]
pub struct ConsoleDecoder;

impl ConsoleDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ConsoleDecoder {
    type Item = Frame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, TransportError> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\r' || *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(TransportError::Overflow(MAX_LINE_LENGTH));
                }
                if String::from_utf8_lossy(&src[..]).trim() == PROMPT {
                    src.clear();
                    return Ok(Some(Frame::Prompt));
                }
                return Ok(None);
            };

            let raw = src.split_to(pos);
            src.advance(1);

            let line = String::from_utf8_lossy(&raw).trim_end().to_string();
            if line.is_empty() {
                continue;
            }
            if line == PROMPT {
                return Ok(Some(Frame::Prompt));
            }

            return Ok(Some(Frame::Line(line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, TransportError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // a half line at EOF is useless, the caller sees the close
                src.clear();
                Ok(None)
            }
        }
    }
}
