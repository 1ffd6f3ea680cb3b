/// Skiff ARQ layer: reliable, in-order, exactly-once delivery over the
/// skiff link layer.
///
/// Classic alternating-bit stop-and-wait:
/// - one DATA frame in flight, 1-second ACK deadline, 5 attempts
/// - one-bit sequence numbers for duplicate suppression
/// - single-slot parking of DATA that collides with an in-flight send
/// - explicit RESET teardown honored in any protocol phase
///
/// Single-threaded and blocking; `send`/`recv` take `&mut self`, so the
/// no-concurrent-calls rule is enforced by the borrow checker.

pub mod endpoint;
pub mod error;
pub mod packet;

// Re-export key types for convenience.
pub use endpoint::{ArqConfig, ArqEndpoint, RecvOutcome, SendOutcome};
pub use error::ArqError;
pub use packet::{PacketHeader, PacketType, ARQ_HEADER, ARQ_PAYLOAD_MAX};
