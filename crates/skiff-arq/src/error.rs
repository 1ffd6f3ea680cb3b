use thiserror::Error;

use skiff_link::LinkError;

/// Errors raised by the ARQ layer.
#[derive(Debug, Error)]
pub enum ArqError {
    /// Peer port is in the privileged range; refused up front.
    #[error("port {0} is privileged; the peer port must be 1024 or above")]
    PrivilegedPort(u16),

    /// Every transmission attempt timed out or drew a useless reply.
    /// Session state is unchanged; the caller may retry the whole send.
    #[error("no valid acknowledgment after {0} attempts")]
    RetriesExhausted(u32),

    /// The underlying link failed in a way retransmission cannot heal.
    #[error(transparent)]
    Link(#[from] LinkError),
}
