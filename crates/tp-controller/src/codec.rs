//! Line framing for the streaming log endpoint

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Longest log line kept; longer lines are dropped whole
pub const MAX_LOG_LINE: usize = 64 * 1024;

/// Splits a byte stream into newline-terminated lines.
///
/// Decoding never fails: invalid UTF-8 is replaced and overlong lines are
/// skipped up to their newline, so one bad record cannot end the stream.
#[derive(Debug)]
pub struct LogLineCodec {
    max_length: usize,
    /// Set while skipping the rest of an overlong line
    discarding: bool,
    /// Bytes of the buffer already known to hold no newline
    scanned: usize,
}

impl LogLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LOG_LINE)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            discarding: false,
            scanned: 0,
        }
    }
}

impl Default for LogLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LogLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.scanned + offset);

            match newline {
                Some(end) => {
                    let line = src.split_to(end + 1);
                    self.scanned = 0;

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if end > self.max_length {
                        tracing::debug!("Skipping log line of {} bytes", end);
                        continue;
                    }

                    let text = String::from_utf8_lossy(&line[..end]);
                    return Ok(Some(text.trim_end_matches('\r').to_string()));
                }
                None if src.len() > self.max_length => {
                    if !self.discarding {
                        tracing::debug!("Skipping log line over {} bytes", self.max_length);
                    }
                    self.discarding = true;
                    self.scanned = 0;
                    src.clear();
                    return Ok(None);
                }
                None => {
                    self.scanned = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // Trailing record without a newline
        self.scanned = 0;
        if src.is_empty() || std::mem::take(&mut self.discarding) {
            src.clear();
            return Ok(None);
        }
        let line = src.split();
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}
