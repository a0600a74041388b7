use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_line, LineConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete lines to any `Write` stream.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
    config: LineConfig,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line writer with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode `payload` as one line and write it out (blocking).
    ///
    /// The payload is validated before anything is written, so a rejected
    /// payload leaves the stream untouched.
    pub fn send(&mut self, payload: &str) -> Result<()> {
        self.buf.clear();
        encode_line(payload, self.config.max_line_length, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_line_with_delimiter() {
        let mut writer = LineWriter::new(Vec::new());
        writer.send("hello").unwrap();
        writer.send("world").unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"hello\nworld\n");
    }

    #[test]
    fn rejected_payload_writes_nothing() {
        let mut writer = LineWriter::new(Vec::new());
        let err = writer.send("split\nme").unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedDelimiter { .. }));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = LineWriter::new(ZeroWriter);
        let err = writer.send("lost").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = LineWriter::new(ShortWriter(Vec::new()));
        writer.send("chunked payload").unwrap();
        assert_eq!(writer.get_ref().0.as_slice(), b"chunked payload\n");
    }

    struct ShortWriter(Vec<u8>);

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3);
            self.0.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn broken_pipe_surfaces_as_io_error() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        drop(right);
        let mut writer = LineWriter::new(left);
        let err = writer.send("nobody listening").unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));
    }
}
