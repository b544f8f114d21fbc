//! Which room properties appear in public listings.

use std::collections::BTreeMap;

use roomhub_peer::Peer;

use crate::RegisteredRoom;

/// Chooses the properties a requester sees for a room in
/// `ListPublicGames`.
///
/// The master calls this once per public room with the registry locked,
/// so implementations must not block.
pub trait PublicPropertyFilter: Send + Sync + 'static {
    fn filter(
        &self,
        room: &RegisteredRoom,
        requester: &Peer,
        filters: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String>;
}

/// Shows every property unfiltered.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllProperties;

impl PublicPropertyFilter for AllProperties {
    fn filter(
        &self,
        room: &RegisteredRoom,
        _requester: &Peer,
        _filters: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        room.options().properties.clone()
    }
}
