//! Error types for the room layer.
//!
//! The `Display` text of each variant is what the requesting peer sees
//! as the failure reason.

use roomhub_protocol::{ResponseStatus, RoomId};

/// Errors that can occur during registry and room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomsError {
    /// No live room has this id.
    #[error("room does not exist")]
    NotFound(RoomId),

    /// The room was destroyed while the operation was in progress.
    #[error("room does not exist")]
    Destroyed(RoomId),

    /// The caller is not the peer that registered the room.
    #[error("you're not the creator of the room")]
    NotOwner(RoomId),

    /// The caller's permission level is below the configured minimum.
    #[error("insufficient permissions")]
    InsufficientPermission { required: i32, actual: i32 },

    #[error("invalid password")]
    InvalidPassword(RoomId),

    /// Online players plus outstanding grants already reach capacity.
    #[error("room is full")]
    RoomFull(RoomId),

    /// This peer already has an access check running for this room.
    #[error("access request already in progress")]
    AlreadyRequesting(RoomId),

    /// The owning room server refused the player.
    #[error("{0}")]
    AccessDenied(String),

    /// The token was never issued, already consumed, or expired.
    #[error("access token not found or expired")]
    AccessNotFound(RoomId),
}

impl RoomsError {
    /// Response status reported to the peer for this error.
    pub fn status(&self) -> ResponseStatus {
        match self {
            Self::NotOwner(_)
            | Self::InsufficientPermission { .. }
            | Self::InvalidPassword(_)
            | Self::AccessDenied(_) => ResponseStatus::Unauthorized,
            Self::NotFound(_)
            | Self::Destroyed(_)
            | Self::RoomFull(_)
            | Self::AlreadyRequesting(_)
            | Self::AccessNotFound(_) => ResponseStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_and_password_errors_are_unauthorized() {
        assert_eq!(RoomsError::NotOwner(RoomId(0)).status(), ResponseStatus::Unauthorized);
        assert_eq!(
            RoomsError::InvalidPassword(RoomId(0)).status(),
            ResponseStatus::Unauthorized
        );
        assert_eq!(
            RoomsError::InsufficientPermission { required: 2, actual: 0 }.status(),
            ResponseStatus::Unauthorized
        );
    }

    #[test]
    fn test_missing_room_is_failed_with_plain_reason() {
        let err = RoomsError::NotFound(RoomId(9));
        assert_eq!(err.status(), ResponseStatus::Failed);
        assert_eq!(err.to_string(), "room does not exist");
    }
}
