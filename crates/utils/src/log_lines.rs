use std::io;

use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};

// A process that never prints a newline still gets its output forwarded.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Splits a byte stream into text lines.
///
/// Unlike `LinesCodec` this never fails on invalid UTF-8 (bytes are replaced
/// lossily) and flushes an unterminated final line at EOF. A trailing `\r`
/// is stripped.
#[derive(Debug, Default)]
pub struct LossyLinesCodec {
    next_index: usize,
}

impl LossyLinesCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

// Largest cut point at or before `at` that does not split a UTF-8 sequence.
// Falls back to `at` when the bytes there are not valid UTF-8 anyway.
fn char_boundary(bytes: &[u8], at: usize) -> usize {
    let is_continuation = |i: usize| i < bytes.len() && bytes[i] & 0xC0 == 0x80;
    (at.saturating_sub(3)..=at)
        .rev()
        .find(|&i| i > 0 && !is_continuation(i))
        .unwrap_or(at)
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LossyLinesCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let read_to = buf.len();
        match buf[self.next_index..read_to]
            .iter()
            .position(|b| *b == b'\n')
        {
            Some(offset) => {
                let newline_index = self.next_index + offset;
                self.next_index = 0;
                let line = buf.split_to(newline_index + 1);
                Ok(Some(decode_line(&line[..newline_index])))
            }
            None if read_to >= MAX_LINE_BYTES => {
                self.next_index = 0;
                let cut = char_boundary(&buf[..], MAX_LINE_BYTES);
                let chunk = buf.split_to(cut);
                Ok(Some(decode_line(&chunk)))
            }
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Some(decode_line(&rest)))
    }
}

pub fn lines<R: AsyncRead>(reader: R) -> FramedRead<R, LossyLinesCodec> {
    FramedRead::new(reader, LossyLinesCodec::new())
}
