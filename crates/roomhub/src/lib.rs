//! # Roomhub
//!
//! Master-side room registry and room-server registration for multiplayer
//! game backends.
//!
//! A **master** keeps the directory of live game rooms. **Room servers**
//! connect to it, register a room and answer access checks. **Clients**
//! list public rooms and ask the master for access; the master asks the
//! owning room server and, if it agrees, hands the client a single-use
//! token the room server later validates.
//!
//! ```text
//! client ──GetRoomAccess──► master ──ProvideRoomAccessCheck──► room server
//!        ◄──RoomAccess{token}──      ◄──────── Ack ───────────
//! client ──token──► room server ──ValidateRoomAccess──► master
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomhub::prelude::*;
//!
//! # async fn demo() -> Result<(), RoomhubError> {
//! let master = MasterServer::builder().bind("127.0.0.1:5000").build().await?;
//! tokio::spawn(master.run());
//!
//! let server = RoomServer::new(RoomServerConfig::default());
//! let registered = server.on_registered();
//! tokio::spawn(server.run());
//! if let Some(room) = registered.await {
//!     println!("registered room {}", room.room_id());
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod master;
mod room_server;
mod spawner;

pub use config::{
    DEFAULT_MASTER_ADDR, DEFAULT_ROOM_IP, DEFAULT_ROOM_PORT, MasterConfig, RoomServerArgs,
    RoomServerConfig, SpawnTaskArgs, random_room_name,
};
pub use error::{RoomServerError, RoomhubError, SpawnError};
pub use master::{MasterServer, MasterServerBuilder};
pub use room_server::{
    AccessPolicy, AccessRequest, AdmitAll, RoomHandle, RoomServer, RoomServerExit,
    RoomServerState, ValidatedAccess,
};
pub use spawner::{MasterSpawnTask, MasterSpawner, SpawnTask, SpawnTaskTable, Spawner};

/// Re-exports for typical use.
pub mod prelude {
    pub use crate::{
        AccessPolicy, AccessRequest, AdmitAll, MasterConfig, MasterServer, MasterServerBuilder,
        RoomHandle, RoomServer, RoomServerArgs, RoomServerConfig, RoomServerError,
        RoomServerExit, RoomServerState, RoomhubError, SpawnTask, Spawner, ValidatedAccess,
    };
    pub use roomhub_peer::{Authenticator, OpenAuthenticator, PeerError, PeerIdentity};
    pub use roomhub_protocol::{GameInfo, Message, PeerId, ResponseStatus, RoomId, RoomOptions};
    pub use roomhub_rooms::{PublicPropertyFilter, RoomRegistry, RoomsError};
}
