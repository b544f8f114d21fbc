//! The [`Peer`]: one connected endpoint as seen from the other side.
//!
//! A peer bundles three things:
//!
//! - **Identity** — its [`PeerId`] and [`PeerIdentity`] (permission level,
//!   username).
//! - **Request/response plumbing** — outbound frames go through a channel
//!   to a writer task; responses are matched to pending requests by
//!   sequence number.
//! - **Room bookkeeping** — the set of rooms this peer owns, and the
//!   listeners to run when it disconnects. The registry uses both for
//!   cleanup; the peer itself never interprets them.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use roomhub_protocol::{Envelope, Message, PeerId, ResponseStatus, RoomId};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{PeerError, PeerIdentity};

/// How long [`Peer::request`] waits for an answer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback run once when a peer disconnects.
pub type DisconnectListener = Box<dyn FnOnce(&Arc<Peer>) + Send + 'static>;

/// A response to one of our requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: ResponseStatus,
    pub payload: Message,
}

impl Response {
    /// Converts a non-success status into [`PeerError::Rejected`].
    pub fn into_result(self) -> Result<Message, PeerError> {
        match self.status {
            ResponseStatus::Success => Ok(self.payload),
            status => {
                let reason = match self.payload {
                    Message::Reason { message } => message,
                    other => other.kind().to_string(),
                };
                Err(PeerError::Rejected { status, reason })
            }
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    disconnected: bool,
    listeners: Vec<DisconnectListener>,
}

/// A connected endpoint.
///
/// Always handled as `Arc<Peer>`: the connection task, the registry's
/// rooms and any in-flight access checks share it.
pub struct Peer {
    id: PeerId,
    identity: PeerIdentity,
    outbound: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    next_seq: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    /// `None` until the peer registers its first room.
    owned_rooms: Mutex<Option<BTreeSet<RoomId>>>,
    lifecycle: Mutex<Lifecycle>,
    closed: watch::Sender<bool>,
}

/// Locks a std mutex, recovering the data if a previous holder panicked.
/// Every critical section here is a few map operations that leave the
/// data consistent at each step.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Peer {
    /// Creates a peer whose outbound frames are pushed into `outbound`.
    ///
    /// [`attach`](crate::attach) wires that channel to a real connection;
    /// tests can read it directly.
    pub fn new(
        id: PeerId,
        identity: PeerIdentity,
        outbound: mpsc::UnboundedSender<Envelope>,
    ) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            id,
            identity,
            outbound: Mutex::new(Some(outbound)),
            next_seq: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            owned_rooms: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
            closed,
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    pub fn permission_level(&self) -> i32 {
        self.identity.permission_level
    }

    pub fn username(&self) -> Option<&str> {
        self.identity.username.as_deref()
    }

    // -----------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn push(&self, envelope: Envelope) -> Result<(), PeerError> {
        let outbound = lock(&self.outbound);
        let tx = outbound.as_ref().ok_or(PeerError::Disconnected(self.id))?;
        tx.send(envelope).map_err(|_| PeerError::Disconnected(self.id))
    }

    /// Sends a request and waits up to [`DEFAULT_REQUEST_TIMEOUT`] for
    /// the response.
    pub async fn request(&self, payload: Message) -> Result<Response, PeerError> {
        self.request_with_timeout(payload, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Sends a request and waits up to `timeout` for the response.
    ///
    /// # Errors
    /// - [`PeerError::Disconnected`] if the peer goes away first
    /// - [`PeerError::Timeout`] if nothing arrives in time
    pub async fn request_with_timeout(
        &self,
        payload: Message,
        timeout: Duration,
    ) -> Result<Response, PeerError> {
        let seq = self.next_seq();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(seq, tx);

        tracing::trace!(peer_id = %self.id, seq, kind = payload.kind(), "request");
        if let Err(e) = self.push(Envelope::request(seq, payload)) {
            lock(&self.pending).remove(&seq);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(PeerError::Disconnected(self.id)),
            Err(_) => {
                lock(&self.pending).remove(&seq);
                Err(PeerError::Timeout(self.id))
            }
        }
    }

    /// Answers request `reply_to` received from this peer.
    pub fn respond(
        &self,
        reply_to: u64,
        status: ResponseStatus,
        payload: Message,
    ) -> Result<(), PeerError> {
        let seq = self.next_seq();
        self.push(Envelope::response(seq, reply_to, status, payload))
    }

    /// Shorthand for a failure response with a reason string.
    pub fn respond_failure(
        &self,
        reply_to: u64,
        status: ResponseStatus,
        reason: &str,
    ) -> Result<(), PeerError> {
        self.respond(reply_to, status, Message::reason(reason))
    }

    /// Routes an incoming response to the request waiting for it.
    ///
    /// Returns `false` if nobody is waiting (timed out or unknown seq).
    pub fn resolve(&self, reply_to: u64, response: Response) -> bool {
        match lock(&self.pending).remove(&reply_to) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    // -----------------------------------------------------------------
    // Owned rooms
    // -----------------------------------------------------------------

    /// Makes sure the owned-rooms index exists.
    ///
    /// Returns `true` only the first time, which is when the caller
    /// should subscribe to this peer's disconnect.
    pub fn ensure_room_index(&self) -> bool {
        let mut rooms = lock(&self.owned_rooms);
        if rooms.is_some() {
            return false;
        }
        *rooms = Some(BTreeSet::new());
        true
    }

    /// Records `room_id` as owned by this peer. Creates the index if needed.
    pub fn add_owned_room(&self, room_id: RoomId) {
        lock(&self.owned_rooms)
            .get_or_insert_with(BTreeSet::new)
            .insert(room_id);
    }

    /// Forgets `room_id`. Missing entries are ignored.
    pub fn remove_owned_room(&self, room_id: RoomId) {
        if let Some(rooms) = lock(&self.owned_rooms).as_mut() {
            rooms.remove(&room_id);
        }
    }

    /// Snapshot of the rooms this peer owns.
    pub fn owned_rooms(&self) -> Vec<RoomId> {
        lock(&self.owned_rooms)
            .as_ref()
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------
    // Disconnect
    // -----------------------------------------------------------------

    /// Registers a callback for this peer's disconnect.
    ///
    /// If the peer is already disconnected the callback runs immediately.
    pub fn on_disconnect(
        self: &Arc<Self>,
        listener: impl FnOnce(&Arc<Peer>) + Send + 'static,
    ) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.disconnected {
            drop(lifecycle);
            listener(self);
            return;
        }
        lifecycle.listeners.push(Box::new(listener));
    }

    pub fn is_connected(&self) -> bool {
        !lock(&self.lifecycle).disconnected
    }

    /// Marks the peer as gone.
    ///
    /// Idempotent: only the first call stops the writer, fails pending
    /// requests and runs the disconnect listeners.
    pub fn disconnect(self: &Arc<Self>) {
        let listeners = {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.disconnected {
                return;
            }
            lifecycle.disconnected = true;
            std::mem::take(&mut lifecycle.listeners)
        };

        lock(&self.outbound).take();
        // Dropping the senders resolves every waiter with Disconnected.
        lock(&self.pending).clear();
        self.closed.send_replace(true);

        tracing::debug!(peer_id = %self.id, listeners = listeners.len(), "peer disconnected");
        for listener in listeners {
            listener(self);
        }
    }

    /// Resolves once the peer has disconnected.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // Err means the sender is gone, which only happens with the peer.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("connected", &self.is_connected())
            .finish()
    }
}
