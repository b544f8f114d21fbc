//! Authentication hook that assigns a peer its permission level.
//!
//! Roomhub does not decide who may register rooms. The master hands the
//! handshake token to an [`Authenticator`] and stores whatever
//! [`PeerIdentity`] comes back on the [`Peer`](crate::Peer). The registry
//! then compares `permission_level` against its configured minimum.

use std::future::Future;

use crate::PeerError;

/// Capabilities attached to a connected peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Integer capability tier. Gates room registration.
    pub permission_level: i32,
    /// Display name, reported to room servers when a player's access
    /// token is validated.
    pub username: Option<String>,
}

impl PeerIdentity {
    pub fn with_level(permission_level: i32) -> Self {
        Self {
            permission_level,
            username: None,
        }
    }
}

/// Validates a handshake token and returns the peer's identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the master.
///
/// # Example
///
/// ```rust
/// use roomhub_peer::{Authenticator, PeerError, PeerIdentity};
///
/// /// Tokens of the form `level:name`. Development only.
/// struct ColonAuth;
///
/// impl Authenticator for ColonAuth {
///     async fn authenticate(&self, token: &str) -> Result<PeerIdentity, PeerError> {
///         let (level, name) = token
///             .split_once(':')
///             .ok_or_else(|| PeerError::AuthFailed("expected level:name".into()))?;
///         let permission_level = level
///             .parse()
///             .map_err(|_| PeerError::AuthFailed("level must be a number".into()))?;
///         Ok(PeerIdentity {
///             permission_level,
///             username: Some(name.to_string()),
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` (empty when the peer sent none).
    ///
    /// # Errors
    /// Returns [`PeerError::AuthFailed`] to refuse the connection.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<PeerIdentity, PeerError>> + Send;
}

/// Accepts every peer at permission level 0 without a username.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAuthenticator;

impl Authenticator for OpenAuthenticator {
    async fn authenticate(&self, _token: &str) -> Result<PeerIdentity, PeerError> {
        Ok(PeerIdentity::default())
    }
}
