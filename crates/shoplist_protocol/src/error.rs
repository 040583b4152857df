//! Error types for the wire protocol.

use crate::message::OpType;
use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or moving frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame body is not a valid message.
    #[error("codec error: {0}")]
    Codec(#[from] shoplist_codec::CodecError),

    /// Reading or writing the underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame announced a length above the limit.
    #[error("frame too large: {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Announced or actual frame size.
        size: usize,
        /// Maximum accepted size.
        limit: usize,
    },

    /// The peer closed the stream in the middle of a frame.
    #[error("connection closed mid-frame")]
    Truncated,

    /// A message carried an operation code this build does not know.
    #[error("unknown operation code {0}")]
    UnknownOp(u8),

    /// A message that is not a client request reached a request handler.
    #[error("operation {0:?} is not a client request")]
    NotARequest(OpType),

    /// A list request arrived without a list payload.
    #[error("{0:?} request carries no list")]
    MissingList(OpType),
}
