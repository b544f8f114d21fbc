//! Peer layer for Roomhub.
//!
//! Everything that happens between "a socket is open" and "the registry
//! sees a request":
//!
//! 1. **Handshake** — version check and [`Authenticator`] on the master
//!    side, [`initiate_handshake`] on the dialing side
//! 2. **Plumbing** — [`attach`] spawns the reader and writer tasks and
//!    hands back an [`Arc<Peer>`](Peer) plus an [`Inbox`] of requests
//! 3. **Bookkeeping** — owned rooms and disconnect listeners live on the
//!    [`Peer`] so the registry can clean up after it
//!
//! # How it fits in the stack
//!
//! ```text
//! Registry / room server (above)  ← reads the inbox, answers through the peer
//!     ↕
//! Peer layer (this crate)         ← identity, request/response, disconnect
//!     ↕
//! Protocol + transport (below)    ← Envelope, Codec, Connection
//! ```

mod auth;
mod error;
mod handshake;
mod io;
mod peer;

pub use auth::{Authenticator, OpenAuthenticator, PeerIdentity};
pub use error::PeerError;
pub use handshake::{HANDSHAKE_TIMEOUT, accept_handshake, initiate_handshake};
pub use io::{Inbox, attach};
pub use peer::{DEFAULT_REQUEST_TIMEOUT, DisconnectListener, Peer, Response};
