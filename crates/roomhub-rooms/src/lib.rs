//! Room registry for the Roomhub master.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — owns every [`RegisteredRoom`], allocates ids,
//!   cleans up after disconnected owners
//! - [`RegisteredRoom`] — one room: owner, options, confirmed players
//! - [`AccessGrants`] — single-use, time-bounded join tokens
//! - [`PublicPropertyFilter`] — hook deciding what listings show
//! - [`RoomEvent`] — registered/destroyed notifications

mod access;
mod error;
mod filter;
mod registry;
mod room;

pub use access::{AccessGrant, AccessGrants, generate_token};
pub use error::RoomsError;
pub use filter::{AllProperties, PublicPropertyFilter};
pub use registry::{DisconnectReceiver, RoomEvent, RoomRegistry};
pub use room::{PendingAccess, RegisteredRoom};
