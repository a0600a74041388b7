//! Newline-delimited text framing.
//!
//! One message is one line of text terminated by a single `\n`. There is no
//! length prefix, checksum or message id: ordering and integrity come from the
//! underlying byte stream. Payloads must not contain a line terminator.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_line, encode_line, LineConfig, LineDecoder, DEFAULT_MAX_LINE_LENGTH, DELIMITER,
};
pub use error::{FrameError, Result};
pub use reader::LineReader;
pub use writer::LineWriter;
