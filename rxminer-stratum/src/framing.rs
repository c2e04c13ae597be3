//! Newline framing of the pool byte stream.
//!
//! Bytes after the last `\n` are kept until a later read completes them,
//! so a message split across reads is never lost or merged. A line longer
//! than the configured maximum is reported once and skipped up to its
//! terminating newline; it never grows the buffer past the limit.

use crate::error::{Result, StratumError};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Longest frame accepted by default
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1 << 16;

/// Splits raw reads into newline-terminated frames
#[derive(Debug)]
pub struct FrameReader {
    codec: LinesCodec,
    pending: BytesMut,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(max_length),
            pending: BytesMut::with_capacity(4096),
        }
    }

    /// Append `raw` and iterate over every frame it completes.
    ///
    /// Frames not pulled from the iterator stay buffered and are yielded by
    /// the next call. An oversized or non-UTF-8 line comes out as
    /// `MalformedFrame`; the frames after it are unaffected.
    pub fn feed(&mut self, raw: &[u8]) -> Frames<'_> {
        self.pending.extend_from_slice(raw);
        Frames { reader: self }
    }

    /// Bytes of the unterminated trailing frame
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn max_length(&self) -> usize {
        self.codec.max_length()
    }

    fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            let frame = match self.codec.decode(&mut self.pending) {
                Ok(Some(line)) if line.is_empty() => continue,
                Ok(Some(line)) => Ok(line),
                Ok(None) => return None,
                Err(LinesCodecError::MaxLineLengthExceeded) => Err(StratumError::MalformedFrame(
                    format!("frame longer than {} bytes", self.codec.max_length()),
                )),
                Err(LinesCodecError::Io(e)) => Err(StratumError::MalformedFrame(format!(
                    "undecodable frame: {}",
                    e
                ))),
            };
            return Some(frame);
        }
    }
}

/// Frames completed by one [`FrameReader::feed`] call
pub struct Frames<'a> {
    reader: &'a mut FrameReader,
}

impl Iterator for Frames<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_frame()
    }
}
