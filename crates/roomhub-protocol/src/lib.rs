//! Wire protocol for Roomhub.
//!
//! This crate defines what the master, room servers and clients say to
//! each other:
//!
//! - **Types** ([`Envelope`], [`Message`], [`ResponseStatus`]) — the
//!   request/response frame and the closed set of messages it carries.
//! - **Packets** ([`RoomOptions`], [`RoomAccessPacket`], [`GameInfo`]) —
//!   the structured bodies of room registration and access messages.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how frames become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections or registries.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Peer (request/response) → Rooms
//! ```

mod codec;
mod error;
mod packets;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use packets::{DEFAULT_REGION, GameInfo, RoomAccessPacket, RoomOptions};
pub use types::{Envelope, Message, PeerId, ResponseStatus, RoomId};

/// Protocol version exchanged in the handshake. Peers speaking another
/// version are rejected.
pub const PROTOCOL_VERSION: u32 = 1;
