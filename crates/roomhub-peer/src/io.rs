//! Connection driver: binds a [`Peer`] to a live [`Connection`].
//!
//! Two tasks per connection:
//!
//! ```text
//!            ┌──────── reader ────────┐
//! conn.recv ─┤ response → peer.resolve│
//!            │ request  → inbox       │
//!            └────────────────────────┘
//! peer.push ──► outbound channel ──► writer ──► conn.send
//! ```
//!
//! When either side ends, the peer is disconnected, which closes the inbox
//! and runs the peer's disconnect listeners.

use std::sync::Arc;

use roomhub_protocol::{Codec, Envelope, PeerId};
use roomhub_transport::Connection;
use tokio::sync::mpsc;

use crate::peer::Response;
use crate::{Peer, PeerIdentity};

/// Incoming requests from a peer, in arrival order.
pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

/// Spawns the reader and writer tasks for `conn` and returns the peer
/// plus its inbox of requests.
///
/// Must be called from within a Tokio runtime.
pub fn attach<C, K>(conn: C, codec: K, id: PeerId, identity: PeerIdentity) -> (Arc<Peer>, Inbox)
where
    C: Connection,
    K: Codec + Clone,
{
    let conn = Arc::new(conn);
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let peer = Peer::new(id, identity, out_tx);

    tokio::spawn(write_loop(Arc::clone(&conn), codec.clone(), id, out_rx));
    tokio::spawn(read_loop(conn, codec, Arc::clone(&peer), in_tx));

    (peer, in_rx)
}

async fn read_loop<C, K>(
    conn: Arc<C>,
    codec: K,
    peer: Arc<Peer>,
    inbox: mpsc::UnboundedSender<Envelope>,
) where
    C: Connection,
    K: Codec,
{
    let peer_id = peer.id();
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%peer_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%peer_id, error = %e, "recv error");
                break;
            }
        };

        let envelope: Envelope = match codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%peer_id, error = %e, "failed to decode envelope");
                continue;
            }
        };

        match envelope.reply_to {
            Some(reply_to) => {
                let response = Response {
                    status: envelope.status,
                    payload: envelope.payload,
                };
                if !peer.resolve(reply_to, response) {
                    tracing::debug!(%peer_id, reply_to, "response without a waiting request");
                }
            }
            None => {
                if inbox.send(envelope).is_err() {
                    // Nobody serves this peer's requests anymore.
                    break;
                }
            }
        }
    }
    peer.disconnect();
}

async fn write_loop<C, K>(
    conn: Arc<C>,
    codec: K,
    peer_id: PeerId,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
) where
    C: Connection,
    K: Codec,
{
    while let Some(envelope) = outbound.recv().await {
        let bytes = match codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%peer_id, error = %e, "failed to encode envelope");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%peer_id, error = %e, "send error");
            break;
        }
    }

    // Closing makes the reader observe end-of-stream and disconnect the peer.
    let _ = conn.close().await;
}
