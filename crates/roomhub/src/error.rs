//! Unified error type for Roomhub.

use roomhub_peer::PeerError;
use roomhub_protocol::{ProtocolError, ResponseStatus};
use roomhub_rooms::RoomsError;
use roomhub_transport::TransportError;

/// Master-side spawn task bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("unknown spawn task")]
    UnknownTask(u64),

    #[error("invalid unique code")]
    InvalidCode(u64),

    /// Another process already claimed the task.
    #[error("spawn task already registered")]
    AlreadyRegistered(u64),

    /// The caller is not the process that registered the task.
    #[error("spawn task not registered by this process")]
    NotRegistered(u64),
}

impl SpawnError {
    pub fn status(&self) -> ResponseStatus {
        match self {
            Self::InvalidCode(_) | Self::NotRegistered(_) => ResponseStatus::Unauthorized,
            Self::UnknownTask(_) | Self::AlreadyRegistered(_) => ResponseStatus::Failed,
        }
    }
}

/// Why a room-server registration attempt stopped.
///
/// None of these are retried; the process is expected to be restarted by
/// its supervisor.
#[derive(Debug, thiserror::Error)]
pub enum RoomServerError {
    #[error("room server process cannot be registered because it is not a spawned process")]
    NotSpawned,

    #[error("master handshake failed: {0}")]
    Handshake(#[source] PeerError),

    #[error("room server process cannot be registered: {0}")]
    SpawnRegistration(#[source] PeerError),

    #[error("room registration failed: {0}")]
    Registration(#[source] PeerError),

    #[error("spawn task finalization failed: {0}")]
    Finalize(#[source] PeerError),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum RoomhubError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Rooms(#[from] RoomsError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    RoomServer(#[from] RoomServerError),
}
