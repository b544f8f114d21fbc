//! The master's authoritative set of rooms.
//!
//! One `RoomRegistry` per master, created at server start. It owns the
//! rooms, the id counter and the event channel. Each owning [`Peer`]
//! keeps a back-index of its room ids so a disconnect can tear its rooms
//! down without scanning the whole registry.
//!
//! # Disconnect cleanup
//!
//! The first time a peer registers a room, the registry subscribes to
//! that peer's disconnect. The listener runs on whatever task notices the
//! disconnect, so it only forwards the peer through a channel; the master
//! drains [`RoomRegistry::take_disconnects`] and calls
//! [`RoomRegistry::handle_peer_disconnect`] with the registry locked.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use roomhub_peer::Peer;
use roomhub_protocol::{GameInfo, PeerId, RoomAccessPacket, RoomId, RoomOptions};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{AccessGrant, AllProperties, PendingAccess, PublicPropertyFilter, RegisteredRoom, RoomsError};

const EVENT_CHANNEL_SIZE: usize = 64;

/// Lifecycle notifications, observable through [`RoomRegistry::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Registered { room_id: RoomId, owner: PeerId },
    Destroyed { room_id: RoomId, owner: PeerId },
}

/// Disconnected room owners waiting for cleanup.
pub type DisconnectReceiver = mpsc::UnboundedReceiver<Arc<Peer>>;

pub struct RoomRegistry {
    rooms: HashMap<RoomId, RegisteredRoom>,
    next_room_id: u64,
    access_timeout: Duration,
    property_filter: Arc<dyn PublicPropertyFilter>,
    events: broadcast::Sender<RoomEvent>,
    disconnect_tx: mpsc::UnboundedSender<Arc<Peer>>,
    disconnect_rx: Option<DisconnectReceiver>,
}

impl RoomRegistry {
    /// Creates an empty registry whose rooms expire unconfirmed grants
    /// after `access_timeout`.
    pub fn new(access_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        Self {
            rooms: HashMap::new(),
            next_room_id: 0,
            access_timeout,
            property_filter: Arc::new(AllProperties),
            events,
            disconnect_tx,
            disconnect_rx: Some(disconnect_rx),
        }
    }

    /// Replaces the listing property filter.
    pub fn with_property_filter(mut self, filter: Arc<dyn PublicPropertyFilter>) -> Self {
        self.property_filter = filter;
        self
    }

    pub fn access_timeout(&self) -> Duration {
        self.access_timeout
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Hands out the disconnect channel. Returns `None` after the first call.
    pub fn take_disconnects(&mut self) -> Option<DisconnectReceiver> {
        self.disconnect_rx.take()
    }

    fn emit(&self, event: RoomEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Next room id: starts at 0, strictly increasing, never reused.
    pub fn generate_room_id(&mut self) -> RoomId {
        let id = RoomId(self.next_room_id);
        self.next_room_id += 1;
        id
    }

    /// Creates a room owned by `owner`. Names are not required to be unique.
    pub fn register_room(&mut self, owner: &Arc<Peer>, options: RoomOptions) -> &RegisteredRoom {
        let room_id = self.generate_room_id();

        if owner.ensure_room_index() {
            let tx = self.disconnect_tx.clone();
            owner.on_disconnect(move |peer| {
                // Closed only when the registry is gone.
                let _ = tx.send(Arc::clone(peer));
            });
        } else if !owner.is_connected() {
            // The listener already ran; queue another cleanup pass.
            let _ = self.disconnect_tx.send(Arc::clone(owner));
        }
        owner.add_owned_room(room_id);

        info!(%room_id, owner = %owner.id(), %options, "room registered");
        let room = RegisteredRoom::new(room_id, Arc::clone(owner), options, self.access_timeout);
        self.emit(RoomEvent::Registered {
            room_id,
            owner: owner.id(),
        });
        self.rooms.entry(room_id).or_insert(room)
    }

    /// Removes a room from the registry and from its owner's index.
    ///
    /// Returns the destroyed room, or `None` if it was already gone.
    pub fn destroy_room(&mut self, room_id: RoomId) -> Option<RegisteredRoom> {
        let mut room = self.rooms.remove(&room_id)?;
        room.owner().remove_owned_room(room_id);
        room.mark_destroyed();

        info!(%room_id, owner = %room.owner().id(), "room destroyed");
        self.emit(RoomEvent::Destroyed {
            room_id,
            owner: room.owner().id(),
        });
        Some(room)
    }

    /// Replaces a room's options wholesale.
    pub fn change_room_options(
        &mut self,
        room_id: RoomId,
        options: RoomOptions,
    ) -> Result<(), RoomsError> {
        let room = self.get_room_mut(room_id)?;
        debug!(%room_id, %options, "room options changed");
        room.set_options(options);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------

    pub fn get_room(&self, room_id: RoomId) -> Result<&RegisteredRoom, RoomsError> {
        self.rooms.get(&room_id).ok_or(RoomsError::NotFound(room_id))
    }

    pub fn get_room_mut(&mut self, room_id: RoomId) -> Result<&mut RegisteredRoom, RoomsError> {
        self.rooms
            .get_mut(&room_id)
            .ok_or(RoomsError::NotFound(room_id))
    }

    /// Looks up a room that `peer` must own.
    ///
    /// # Errors
    /// [`RoomsError::NotFound`] before [`RoomsError::NotOwner`].
    pub fn get_owned_room_mut(
        &mut self,
        room_id: RoomId,
        peer: &Peer,
    ) -> Result<&mut RegisteredRoom, RoomsError> {
        let room = self.get_room_mut(room_id)?;
        if !room.is_owner(peer) {
            return Err(RoomsError::NotOwner(room_id));
        }
        Ok(room)
    }

    /// All live rooms, ordered by id.
    pub fn get_all_rooms(&self) -> Vec<&RegisteredRoom> {
        let mut rooms: Vec<_> = self.rooms.values().collect();
        rooms.sort_by_key(|room| room.id());
        rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Listing of public rooms as `requester` sees them.
    pub fn get_public_games(
        &self,
        requester: &Peer,
        filters: &BTreeMap<String, String>,
    ) -> Vec<GameInfo> {
        self.get_all_rooms()
            .into_iter()
            .filter(|room| room.options().is_public)
            .map(|room| {
                let properties = self.property_filter.filter(room, requester, filters);
                room.game_info(properties)
            })
            .collect()
    }

    // -----------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------

    /// First half of a join request. See [`RegisteredRoom::begin_access`].
    pub fn begin_access(
        &mut self,
        room_id: RoomId,
        requester: PeerId,
        password: &str,
    ) -> Result<PendingAccess, RoomsError> {
        self.get_room_mut(room_id)?.begin_access(requester, password)
    }

    /// Second half of a join request, after the owner admitted the player.
    ///
    /// Fails with [`RoomsError::NotFound`] if the room went away meanwhile.
    pub fn complete_access(
        &mut self,
        room_id: RoomId,
        requester: &Peer,
    ) -> Result<RoomAccessPacket, RoomsError> {
        let username = requester.username().map(str::to_string);
        self.get_room_mut(room_id)?
            .complete_access(requester.id(), username, Instant::now())
    }

    /// Clears the in-flight mark of a refused or failed join request.
    pub fn abort_access(&mut self, room_id: RoomId, requester: PeerId) {
        if let Ok(room) = self.get_room_mut(room_id) {
            room.abort_access(requester);
        }
    }

    /// Consumes an access token. Only the room's owner may do this.
    pub fn validate_access(
        &mut self,
        room_id: RoomId,
        owner: &Peer,
        token: &str,
    ) -> Result<AccessGrant, RoomsError> {
        self.get_owned_room_mut(room_id, owner)?
            .validate_access(token, Instant::now())
    }

    // -----------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------

    /// Destroys every room `peer` owns. Returns how many.
    pub fn handle_peer_disconnect(&mut self, peer: &Peer) -> usize {
        // Snapshot: destroying a room edits the peer's index.
        let owned = peer.owned_rooms();
        let destroyed = owned
            .into_iter()
            .filter_map(|room_id| self.destroy_room(room_id))
            .count();
        if destroyed > 0 {
            info!(peer_id = %peer.id(), destroyed, "destroyed rooms of disconnected peer");
        }
        destroyed
    }

    /// Sweeps expired grants in every room. Returns how many were removed.
    pub fn clear_timed_out_accesses(&mut self) -> usize {
        let now = Instant::now();
        let removed: usize = self
            .rooms
            .values_mut()
            .map(|room| room.clear_timed_out_accesses(now))
            .sum();
        if removed > 0 {
            debug!(removed, "cleared timed out access grants");
        }
        removed
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.rooms.len())
            .field("next_room_id", &self.next_room_id)
            .field("access_timeout", &self.access_timeout)
            .finish()
    }
}
