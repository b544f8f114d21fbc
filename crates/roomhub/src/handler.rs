//! Per-connection handler and the registration protocol.
//!
//! Each accepted connection gets its own task:
//!   1. Handshake → authenticate the token → permission level
//!   2. Attach the peer → reader/writer tasks
//!   3. Loop: take a request from the inbox → authorize → registry
//!      operation → respond
//!
//! The registry lock is taken per request and never held across network
//! I/O. The only request that waits on another peer (`GetRoomAccess`)
//! finishes in its own task.

use std::collections::BTreeMap;
use std::sync::Arc;

use roomhub_peer::{Authenticator, Peer, PeerError, Response, accept_handshake, attach};
use roomhub_protocol::{Envelope, Message, PeerId, ResponseStatus, RoomId, RoomOptions};
use roomhub_rooms::{PendingAccess, RoomsError};
use roomhub_transport::{Connection, WebSocketConnection};

use crate::master::MasterState;
use crate::{RoomhubError, SpawnError};

/// A typed failure on its way to the requester.
#[derive(Debug)]
struct Rejection {
    status: ResponseStatus,
    reason: String,
}

impl Rejection {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: reason.into(),
        }
    }
}

impl From<RoomsError> for Rejection {
    fn from(err: RoomsError) -> Self {
        Self {
            status: err.status(),
            reason: err.to_string(),
        }
    }
}

impl From<SpawnError> for Rejection {
    fn from(err: SpawnError) -> Self {
        Self {
            status: err.status(),
            reason: err.to_string(),
        }
    }
}

type Reply = Result<Message, Rejection>;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A: Authenticator>(
    conn: WebSocketConnection,
    state: Arc<MasterState<A>>,
) -> Result<(), RoomhubError> {
    let conn_id = conn.id();
    let peer_id = state.next_peer_id();
    tracing::debug!(%conn_id, %peer_id, remote = ?conn.remote_addr(), "handling new connection");

    let identity = accept_handshake(&conn, &state.codec, &state.auth, peer_id).await?;
    tracing::info!(
        %conn_id,
        %peer_id,
        permission_level = identity.permission_level,
        "peer connected"
    );

    let (peer, mut inbox) = attach(conn, state.codec, peer_id, identity);
    while let Some(envelope) = inbox.recv().await {
        handle_request(&state, &peer, envelope).await;
    }

    peer.disconnect();
    tracing::info!(%peer_id, "peer disconnected");
    Ok(())
}

/// Routes one request to its handler and sends the response.
pub(crate) async fn handle_request<A: Authenticator>(
    state: &Arc<MasterState<A>>,
    peer: &Arc<Peer>,
    envelope: Envelope,
) {
    let reply_to = envelope.seq;
    let kind = envelope.payload.kind();
    tracing::trace!(peer_id = %peer.id(), reply_to, kind, "request");

    let reply = match envelope.payload {
        Message::RegisterRoom { options } => register_room(state, peer, options).await,
        Message::DestroyRoom { room_id } => destroy_room(state, peer, room_id).await,
        Message::SaveRoomOptions { room_id, options } => {
            save_room_options(state, peer, room_id, options).await
        }
        Message::PlayerLeftRoom { room_id, peer_id } => {
            player_left(state, peer, room_id, peer_id).await
        }
        Message::ValidateRoomAccess { room_id, token } => {
            validate_access(state, peer, room_id, &token).await
        }
        Message::ListPublicGames { filters } => {
            let registry = state.registry.lock().await;
            Ok(Message::PublicGames {
                games: registry.get_public_games(peer, &filters),
            })
        }
        Message::GetRoomAccess {
            room_id,
            password,
            properties,
        } => {
            let begun = state
                .registry
                .lock()
                .await
                .begin_access(room_id, peer.id(), &password);
            match begun {
                Ok(pending) => {
                    tokio::spawn(check_access(
                        Arc::clone(state),
                        Arc::clone(peer),
                        reply_to,
                        pending,
                        properties,
                    ));
                    return;
                }
                Err(e) => Err(e.into()),
            }
        }
        Message::RegisterSpawnedProcess {
            task_id,
            unique_code,
        } => state
            .spawn_tasks
            .lock()
            .await
            .register(task_id, &unique_code, peer.id())
            .map(|()| {
                tracing::info!(task_id, peer_id = %peer.id(), "spawned process registered");
                Message::Ack
            })
            .map_err(Rejection::from),
        Message::CompleteSpawnProcess {
            task_id,
            properties,
        } => state
            .spawn_tasks
            .lock()
            .await
            .complete(task_id, peer.id(), properties)
            .map(|()| {
                tracing::info!(task_id, peer_id = %peer.id(), "spawn task completed");
                Message::Ack
            })
            .map_err(Rejection::from),
        _ => Err(Rejection::failed("unhandled request")),
    };

    send_reply(peer, reply_to, kind, reply);
}

fn send_reply(peer: &Peer, reply_to: u64, kind: &'static str, reply: Reply) {
    let sent = match reply {
        Ok(payload) => peer.respond(reply_to, ResponseStatus::Success, payload),
        Err(rejection) => {
            tracing::debug!(
                peer_id = %peer.id(),
                kind,
                status = %rejection.status,
                reason = %rejection.reason,
                "request rejected"
            );
            peer.respond_failure(reply_to, rejection.status, &rejection.reason)
        }
    };
    if let Err(e) = sent {
        tracing::debug!(peer_id = %peer.id(), kind, error = %e, "could not send response");
    }
}

async fn register_room<A: Authenticator>(
    state: &MasterState<A>,
    peer: &Arc<Peer>,
    options: RoomOptions,
) -> Reply {
    let required = state.config.register_room_permission_level;
    let actual = peer.permission_level();
    if actual < required {
        return Err(RoomsError::InsufficientPermission { required, actual }.into());
    }

    let mut registry = state.registry.lock().await;
    let room = registry.register_room(peer, options);
    Ok(Message::RoomRegistered { room_id: room.id() })
}

async fn destroy_room<A: Authenticator>(
    state: &MasterState<A>,
    peer: &Peer,
    room_id: RoomId,
) -> Reply {
    let mut registry = state.registry.lock().await;
    registry.get_owned_room_mut(room_id, peer)?;
    registry.destroy_room(room_id);
    Ok(Message::Ack)
}

async fn save_room_options<A: Authenticator>(
    state: &MasterState<A>,
    peer: &Peer,
    room_id: RoomId,
    options: RoomOptions,
) -> Reply {
    let mut registry = state.registry.lock().await;
    registry.get_owned_room_mut(room_id, peer)?;
    registry.change_room_options(room_id, options)?;
    Ok(Message::Ack)
}

async fn player_left<A: Authenticator>(
    state: &MasterState<A>,
    peer: &Peer,
    room_id: RoomId,
    player: PeerId,
) -> Reply {
    let mut registry = state.registry.lock().await;
    let room = registry.get_owned_room_mut(room_id, peer)?;
    if !room.on_player_left(player) {
        tracing::debug!(%room_id, peer_id = %player, "player left but was not online");
    }
    Ok(Message::Ack)
}

async fn validate_access<A: Authenticator>(
    state: &MasterState<A>,
    peer: &Peer,
    room_id: RoomId,
    token: &str,
) -> Reply {
    let grant = state
        .registry
        .lock()
        .await
        .validate_access(room_id, peer, token)?;
    tracing::debug!(%room_id, peer_id = %grant.peer_id, "access confirmed");
    Ok(Message::AccessValidated {
        peer_id: grant.peer_id,
        username: grant.username,
    })
}

/// Asks the room's owner to admit `requester`, then answers the requester.
async fn check_access<A: Authenticator>(
    state: Arc<MasterState<A>>,
    requester: Arc<Peer>,
    reply_to: u64,
    pending: PendingAccess,
    properties: BTreeMap<String, String>,
) {
    let room_id = pending.room_id;
    let check = Message::ProvideRoomAccessCheck {
        room_id,
        peer_id: requester.id(),
        username: requester.username().map(str::to_string),
        properties,
    };
    let answer = pending
        .owner
        .request(check)
        .await
        .and_then(Response::into_result);

    let reply = {
        let mut registry = state.registry.lock().await;
        match answer {
            Ok(_) => registry
                .complete_access(room_id, &requester)
                .map(Message::RoomAccess)
                .map_err(Rejection::from),
            Err(PeerError::Rejected { reason, .. }) => {
                registry.abort_access(room_id, requester.id());
                Err(RoomsError::AccessDenied(reason).into())
            }
            Err(e) => {
                registry.abort_access(room_id, requester.id());
                tracing::debug!(%room_id, error = %e, "access check did not complete");
                match registry.get_room(room_id) {
                    Ok(_) => Err(Rejection::failed("room server did not answer the access check")),
                    Err(gone) => Err(gone.into()),
                }
            }
        }
    };

    send_reply(&requester, reply_to, "GetRoomAccess", reply);
}
