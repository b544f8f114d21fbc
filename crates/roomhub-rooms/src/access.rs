//! Time-bounded, single-use access grants for one room.
//!
//! ```text
//! client ── GetRoomAccess ──► master ── ProvideRoomAccessCheck ──► owner
//!                               │ begin()                            │
//!                               │ ◄────────────── Success ───────────┘
//!                               │ issue() → token
//! client ◄── RoomAccess{token} ─┘
//! client ── token ──► owner ── ValidateRoomAccess ──► master: confirm()
//! ```

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use rand::Rng;
use roomhub_protocol::PeerId;
use tokio::time::Instant;

/// One issued, not yet confirmed grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub peer_id: PeerId,
    pub username: Option<String>,
    pub issued_at: Instant,
}

/// Tracker for a room's outstanding grants and in-flight access checks.
///
/// The timeout is required at construction; there is no built-in default.
#[derive(Debug)]
pub struct AccessGrants {
    timeout: Duration,
    grants: HashMap<String, AccessGrant>,
    in_flight: BTreeSet<PeerId>,
}

/// 128 random bits as 32 lowercase hex characters.
pub fn generate_token() -> String {
    format!("{:032x}", rand::rng().random::<u128>())
}

impl AccessGrants {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            grants: HashMap::new(),
            in_flight: BTreeSet::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Marks an access check for `peer_id` as running.
    ///
    /// Returns `false` if one is already running.
    pub fn begin(&mut self, peer_id: PeerId) -> bool {
        self.in_flight.insert(peer_id)
    }

    /// Clears the in-flight mark. Missing marks are ignored.
    pub fn end(&mut self, peer_id: PeerId) {
        self.in_flight.remove(&peer_id);
    }

    pub fn is_requesting(&self, peer_id: PeerId) -> bool {
        self.in_flight.contains(&peer_id)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Records a new grant and returns its token.
    pub fn issue(&mut self, peer_id: PeerId, username: Option<String>, now: Instant) -> String {
        let mut token = generate_token();
        while self.grants.contains_key(&token) {
            token = generate_token();
        }
        self.grants.insert(
            token.clone(),
            AccessGrant {
                peer_id,
                username,
                issued_at: now,
            },
        );
        token
    }

    /// Consumes the grant for `token`.
    ///
    /// Removal and the expiry check happen together, so of a sweep and a
    /// confirmation racing on one token exactly one observes the grant.
    /// An expired grant is removed and reported as absent.
    pub fn confirm(&mut self, token: &str, now: Instant) -> Option<AccessGrant> {
        let grant = self.grants.remove(token)?;
        if self.is_expired(&grant, now) {
            return None;
        }
        Some(grant)
    }

    /// Drops every grant older than the timeout. Returns how many.
    pub fn clear_timed_out(&mut self, now: Instant) -> usize {
        let before = self.grants.len();
        let timeout = self.timeout;
        self.grants
            .retain(|_, grant| now.saturating_duration_since(grant.issued_at) <= timeout);
        before - self.grants.len()
    }

    /// Number of issued, unconfirmed grants.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    fn is_expired(&self, grant: &AccessGrant, now: Instant) -> bool {
        now.saturating_duration_since(grant.issued_at) > self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_confirm_consumes_grant_once() {
        let now = Instant::now();
        let mut grants = AccessGrants::new(TIMEOUT);
        let token = grants.issue(PeerId(4), Some("ann".into()), now);

        let grant = grants.confirm(&token, now).expect("first confirm");
        assert_eq!(grant.peer_id, PeerId(4));
        assert_eq!(grant.username.as_deref(), Some("ann"));
        assert!(grants.confirm(&token, now).is_none());
        assert!(grants.is_empty());
    }

    #[test]
    fn test_expired_grant_cannot_be_confirmed() {
        let now = Instant::now();
        let mut grants = AccessGrants::new(TIMEOUT);
        let token = grants.issue(PeerId(1), None, now);

        assert!(grants.confirm(&token, now + TIMEOUT + Duration::from_millis(1)).is_none());
        assert!(grants.is_empty());
    }

    #[test]
    fn test_clear_timed_out_keeps_fresh_grants() {
        let start = Instant::now();
        let mut grants = AccessGrants::new(TIMEOUT);
        let old = grants.issue(PeerId(1), None, start);
        let fresh = grants.issue(PeerId(1), None, start + Duration::from_secs(8));

        let removed = grants.clear_timed_out(start + Duration::from_secs(11));
        assert_eq!(removed, 1);
        assert!(grants.confirm(&old, start + Duration::from_secs(11)).is_none());
        assert!(grants.confirm(&fresh, start + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn test_one_in_flight_check_per_peer() {
        let mut grants = AccessGrants::new(TIMEOUT);
        assert!(grants.begin(PeerId(1)));
        assert!(!grants.begin(PeerId(1)));
        assert!(grants.begin(PeerId(2)));
        assert_eq!(grants.in_flight(), 2);

        grants.end(PeerId(1));
        grants.end(PeerId(1));
        assert!(!grants.is_requesting(PeerId(1)));
        assert!(grants.begin(PeerId(1)));
    }

    #[test]
    fn test_multiple_grants_per_peer_are_allowed() {
        let now = Instant::now();
        let mut grants = AccessGrants::new(TIMEOUT);
        let a = grants.issue(PeerId(3), None, now);
        let b = grants.issue(PeerId(3), None, now);
        assert_ne!(a, b);
        assert_eq!(grants.len(), 2);
    }
}
