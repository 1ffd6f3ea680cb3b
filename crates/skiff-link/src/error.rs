use std::io;

use thiserror::Error;

/// Errors raised by the framing layer.
///
/// `Checksum`, `TooShort` and `LengthMismatch` mean a corrupted or malformed
/// datagram was dropped. The link layer never retries on its own; recovery
/// is the job of the retransmitting layer above.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Peer address could not be parsed.
    #[error("invalid peer address '{0}'")]
    Address(String),

    /// UDP socket could not be created or bound.
    #[error("socket setup failed: {0}")]
    Channel(#[source] io::Error),

    /// Outbound payload exceeds the frame budget.
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Inbound payload does not fit in the caller's buffer.
    #[error("payload of {len} bytes does not fit in a {capacity}-byte buffer")]
    BufferTooSmall { len: usize, capacity: usize },

    /// Datagram shorter than the frame header.
    #[error("datagram of {0} bytes is shorter than the frame header")]
    TooShort(usize),

    /// Declared total length disagrees with the received datagram.
    #[error("declared frame length {declared} does not match the {received}-byte datagram")]
    LengthMismatch { declared: usize, received: usize },

    /// Checksum over the received frame does not match.
    #[error("checksum mismatch: frame carries {got:#04x}, computed {want:#04x}")]
    Checksum { got: u8, want: u8 },

    /// Send or receive on the socket failed.
    #[error("socket i/o failed: {0}")]
    Io(#[from] io::Error),
}
