use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Line delimiter on the wire.
pub const DELIMITER: u8 = b'\n';

/// Default maximum line length (excluding the delimiter): 16 MiB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Encode a payload as one line.
///
/// Wire format:
/// ```text
/// ┌───────────────────────────┬──────┐
/// │ Payload (UTF-8, no CR/LF) │ 0x0A │
/// └───────────────────────────┴──────┘
/// ```
///
/// Payloads containing `\n` or `\r` are rejected; the receiver would split
/// them into separate messages.
pub fn encode_line(payload: &str, max_line_length: usize, dst: &mut BytesMut) -> Result<()> {
    if let Some(position) = payload.bytes().position(|b| b == DELIMITER || b == b'\r') {
        return Err(FrameError::EmbeddedDelimiter { position });
    }
    if payload.len() > max_line_length {
        return Err(FrameError::LineTooLong {
            size: payload.len(),
            max: max_line_length,
        });
    }

    dst.reserve(payload.len() + 1);
    dst.put_slice(payload.as_bytes());
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Decode one line from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
/// On success, consumes the line and its delimiter from the buffer. A `\r`
/// directly before the delimiter is dropped, and invalid UTF-8 is replaced
/// with U+FFFD.
///
/// Searches the whole buffer on every call; use [`LineDecoder`] when the
/// buffer is filled incrementally.
pub fn decode_line(src: &mut BytesMut, max_line_length: usize) -> Result<Option<String>> {
    LineDecoder::new(max_line_length).decode(src)
}

/// Incremental line decoder.
///
/// Remembers how much of the buffer has already been searched for a
/// delimiter, so a long line arriving in many chunks is scanned once. The
/// buffer must only shrink through [`LineDecoder::decode`].
#[derive(Debug, Clone)]
pub struct LineDecoder {
    max_line_length: usize,
    next_index: usize,
}

impl LineDecoder {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
        }
    }

    /// Decode the next complete line, as [`decode_line`] does.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let start = self.next_index.min(src.len());
        let Some(offset) = src[start..].iter().position(|&b| b == DELIMITER) else {
            if src.len() > self.max_line_length {
                self.next_index = 0;
                return Err(FrameError::LineTooLong {
                    size: src.len(),
                    max: self.max_line_length,
                });
            }
            self.next_index = src.len();
            return Ok(None); // Need more data
        };

        let end = start + offset;
        self.next_index = 0;
        if end > self.max_line_length {
            return Err(FrameError::LineTooLong {
                size: end,
                max: self.max_line_length,
            });
        }

        let line = src.split_to(end + 1);
        let mut body = &line[..end];
        if let Some(stripped) = body.strip_suffix(b"\r") {
            body = stripped;
        }

        Ok(Some(String::from_utf8_lossy(body).into_owned()))
    }
}

/// Configuration for the line codec.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Maximum line length in bytes, excluding the delimiter. Default: 16 MiB.
    pub max_line_length: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_single_delimiter() {
        let mut buf = BytesMut::new();
        encode_line("hello", DEFAULT_MAX_LINE_LENGTH, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"hello\n");
    }

    #[test]
    fn test_encode_rejects_embedded_terminators() {
        let mut buf = BytesMut::new();
        let err = encode_line("two\nlines", DEFAULT_MAX_LINE_LENGTH, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedDelimiter { position: 3 }));

        let err = encode_line("carriage\r", DEFAULT_MAX_LINE_LENGTH, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedDelimiter { position: 8 }));
        assert!(buf.is_empty(), "nothing is written for rejected payloads");
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let err = encode_line("abcdef", 4, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { size: 6, max: 4 }));
    }

    #[test]
    fn test_decode_incomplete_line() {
        let mut buf = BytesMut::from(&b"no newline yet"[..]);
        assert!(decode_line(&mut buf, DEFAULT_MAX_LINE_LENGTH)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 14, "partial data stays buffered");
    }

    #[test]
    fn test_decode_multiple_lines() {
        let mut buf = BytesMut::from(&b"first\nsecond\n"[..]);

        let first = decode_line(&mut buf, DEFAULT_MAX_LINE_LENGTH).unwrap();
        let second = decode_line(&mut buf, DEFAULT_MAX_LINE_LENGTH).unwrap();

        assert_eq!(first.as_deref(), Some("first"));
        assert_eq!(second.as_deref(), Some("second"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_strips_crlf() {
        let mut buf = BytesMut::from(&b"windows\r\n"[..]);
        let line = decode_line(&mut buf, DEFAULT_MAX_LINE_LENGTH).unwrap();
        assert_eq!(line.as_deref(), Some("windows"));
    }

    #[test]
    fn test_decode_empty_line() {
        let mut buf = BytesMut::from(&b"\n"[..]);
        let line = decode_line(&mut buf, DEFAULT_MAX_LINE_LENGTH).unwrap();
        assert_eq!(line.as_deref(), Some(""));
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        let mut buf = BytesMut::from(&[0x66, 0xFF, 0x6F, b'\n'][..]);
        let line = decode_line(&mut buf, DEFAULT_MAX_LINE_LENGTH).unwrap();
        assert_eq!(line.as_deref(), Some("f\u{FFFD}o"));
    }

    #[test]
    fn test_decode_line_too_long() {
        let mut unterminated = BytesMut::from(&b"0123456789"[..]);
        assert!(matches!(
            decode_line(&mut unterminated, 8),
            Err(FrameError::LineTooLong { size: 10, max: 8 })
        ));

        let mut terminated = BytesMut::from(&b"0123456789\n"[..]);
        assert!(matches!(
            decode_line(&mut terminated, 8),
            Err(FrameError::LineTooLong { .. })
        ));
    }

    #[test]
    fn test_decoder_resumes_after_partial_line() {
        let mut decoder = LineDecoder::new(DEFAULT_MAX_LINE_LENGTH);
        let mut buf = BytesMut::from(&b"par"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"tial\r\nnext\n");
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("partial"));
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("next"));
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decoder_limit_applies_across_chunks() {
        let mut decoder = LineDecoder::new(8);
        let mut buf = BytesMut::from(&b"0123"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"456789");
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(FrameError::LineTooLong { size: 10, max: 8 })
        ));
    }
}
