//! Error types for the peer layer.

use roomhub_protocol::{PeerId, ProtocolError, ResponseStatus};
use roomhub_transport::TransportError;

/// Errors that can occur while talking to a peer.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The handshake token was rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The handshake did not complete: wrong first frame, version
    /// mismatch, or the remote side refused us.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer is gone. Pending requests resolve with this error.
    #[error("{0} disconnected")]
    Disconnected(PeerId),

    /// No response arrived in time.
    #[error("request to {0} timed out")]
    Timeout(PeerId),

    /// The remote side answered with a non-success status.
    #[error("request rejected ({status}): {reason}")]
    Rejected {
        status: ResponseStatus,
        reason: String,
    },

    /// The remote side answered with an unexpected message.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
