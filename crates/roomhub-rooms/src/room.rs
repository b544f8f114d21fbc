//! A registered room as the master tracks it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use roomhub_peer::Peer;
use roomhub_protocol::{GameInfo, PeerId, RoomAccessPacket, RoomId, RoomOptions};
use tokio::time::Instant;

use crate::{AccessGrant, AccessGrants, RoomsError};

/// An access check that passed the master's local checks and now needs
/// the owning room server's answer.
#[derive(Debug, Clone)]
pub struct PendingAccess {
    pub room_id: RoomId,
    /// The room server to ask.
    pub owner: Arc<Peer>,
}

/// One room, owned by the room-server peer that registered it.
#[derive(Debug)]
pub struct RegisteredRoom {
    id: RoomId,
    owner: Arc<Peer>,
    options: RoomOptions,
    grants: AccessGrants,
    players: BTreeSet<PeerId>,
    destroyed: bool,
}

impl RegisteredRoom {
    pub fn new(
        id: RoomId,
        owner: Arc<Peer>,
        options: RoomOptions,
        access_timeout: Duration,
    ) -> Self {
        Self {
            id,
            owner,
            options,
            grants: AccessGrants::new(access_timeout),
            players: BTreeSet::new(),
            destroyed: false,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn owner(&self) -> &Arc<Peer> {
        &self.owner
    }

    /// Whether `peer` is the exact peer that registered this room.
    pub fn is_owner(&self, peer: &Peer) -> bool {
        self.owner.id() == peer.id()
    }

    pub fn options(&self) -> &RoomOptions {
        &self.options
    }

    /// Confirmed players currently in the room.
    pub fn online_count(&self) -> usize {
        self.players.len()
    }

    pub fn players(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.players.iter().copied()
    }

    pub fn grants(&self) -> &AccessGrants {
        &self.grants
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    pub(crate) fn set_options(&mut self, options: RoomOptions) {
        self.options = options;
    }

    fn ensure_live(&self) -> Result<(), RoomsError> {
        if self.destroyed {
            return Err(RoomsError::Destroyed(self.id));
        }
        Ok(())
    }

    /// Runs the master-side checks for a join request and marks the check
    /// as in flight.
    ///
    /// Order: password, one check per requester, capacity.
    pub fn begin_access(
        &mut self,
        requester: PeerId,
        password: &str,
    ) -> Result<PendingAccess, RoomsError> {
        self.ensure_live()?;

        if self.options.is_password_protected() && self.options.password != password {
            return Err(RoomsError::InvalidPassword(self.id));
        }
        if self.grants.is_requesting(requester) {
            return Err(RoomsError::AlreadyRequesting(self.id));
        }
        let max = self.options.max_connections as usize;
        let taken = self.players.len() + self.grants.len() + self.grants.in_flight();
        if max > 0 && taken >= max {
            return Err(RoomsError::RoomFull(self.id));
        }

        self.grants.begin(requester);
        Ok(PendingAccess {
            room_id: self.id,
            owner: Arc::clone(&self.owner),
        })
    }

    /// The owner admitted the player: issues a token and builds the packet
    /// the player joins with.
    pub fn complete_access(
        &mut self,
        requester: PeerId,
        username: Option<String>,
        now: Instant,
    ) -> Result<RoomAccessPacket, RoomsError> {
        self.grants.end(requester);
        self.ensure_live()?;

        let token = self.grants.issue(requester, username, now);
        Ok(RoomAccessPacket {
            room_id: self.id,
            token,
            room_ip: self.options.room_ip.clone(),
            room_port: self.options.room_port,
            properties: self.options.properties.clone(),
        })
    }

    /// The owner refused or never answered.
    pub fn abort_access(&mut self, requester: PeerId) {
        self.grants.end(requester);
    }

    /// Consumes `token` and records its peer as online.
    pub fn validate_access(&mut self, token: &str, now: Instant) -> Result<AccessGrant, RoomsError> {
        self.ensure_live()?;
        let grant = self
            .grants
            .confirm(token, now)
            .ok_or(RoomsError::AccessNotFound(self.id))?;
        self.players.insert(grant.peer_id);
        Ok(grant)
    }

    /// Drops expired grants. Returns how many were removed.
    pub fn clear_timed_out_accesses(&mut self, now: Instant) -> usize {
        self.grants.clear_timed_out(now)
    }

    /// Forgets a confirmed player. Returns whether it was present.
    pub fn on_player_left(&mut self, peer_id: PeerId) -> bool {
        self.players.remove(&peer_id)
    }

    /// Listing entry with the given (already filtered) properties.
    pub fn game_info(&self, properties: BTreeMap<String, String>) -> GameInfo {
        GameInfo {
            id: self.id,
            address: self.options.address(),
            max_players: self.options.max_connections,
            name: self.options.name.clone(),
            online_players: self.online_count(),
            properties,
            is_password_protected: self.options.is_password_protected(),
            region: self.options.region.clone(),
        }
    }
}
