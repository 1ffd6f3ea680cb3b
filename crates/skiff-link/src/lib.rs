/// Skiff link layer: checksummed framing over UDP.
///
/// Best-effort framed delivery to exactly one peer:
/// - 6-byte header (destination tag, total length, XOR checksum, reserved)
/// - integrity validation on receipt, corrupt frames dropped
/// - deadline-bounded receive with timeout as a distinguished value
///
/// Reliability lives one layer up, in `skiff-arq`.

pub mod endpoint;
pub mod error;
pub mod frame;

// Re-export key types for convenience.
pub use endpoint::LinkEndpoint;
pub use error::LinkError;
pub use frame::{
    FrameHeader, decode_frame, encode_frame, frame_checksum, FRAME_MAX, LINK_HEADER,
    LINK_PAYLOAD_MAX,
};
