//! Room-server side: connect to the master, optionally complete the spawn
//! handshake, register the room and serve the master's access checks.
//!
//! ```text
//! Idle → Connecting ⟲ (retry every retry_interval)
//!      → Connected → [SpawnHandshake] → Registering → Registered
//!                                          │               │
//!                                          ▼               ▼ master gone
//!                                        Halted       Disconnected
//! ```
//!
//! A room server never re-registers in place. Once the master connection
//! drops, [`RoomServer::run`] returns and the process is expected to exit
//! so its supervisor can start a fresh one.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use roomhub_peer::{Inbox, Peer, PeerError, PeerIdentity, Response, attach, initiate_handshake};
use roomhub_protocol::{JsonCodec, Message, PeerId, ResponseStatus, RoomId, RoomOptions};
use roomhub_transport::WebSocketConnection;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::RoomServerConfig;
use crate::spawner::{MasterSpawner, SpawnTask, Spawner};
use crate::RoomServerError;

/// Id under which the master appears on the room-server side.
const MASTER_PEER_ID: PeerId = PeerId(0);

/// Where the room server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomServerState {
    Idle,
    Connecting,
    Connected,
    SpawnHandshake,
    Registering,
    Registered(RoomId),
    /// The master connection dropped.
    Disconnected,
    /// A registration attempt failed and will not be retried.
    Halted,
}

/// Why [`RoomServer::run`] returned.
#[derive(Debug)]
pub enum RoomServerExit {
    MasterDisconnected,
    Halted(RoomServerError),
}

// ---------------------------------------------------------------------------
// Access policy
// ---------------------------------------------------------------------------

/// A player the master wants to admit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub room_id: RoomId,
    pub peer_id: PeerId,
    pub username: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Decides whether this room admits a player.
pub trait AccessPolicy: Send + Sync + 'static {
    /// `Err(reason)` refuses the player; the reason reaches the client.
    fn check(&self, request: &AccessRequest) -> impl Future<Output = Result<(), String>> + Send;
}

/// Admits everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl AccessPolicy for AdmitAll {
    async fn check(&self, _request: &AccessRequest) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Who an access token belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAccess {
    pub peer_id: PeerId,
    pub username: Option<String>,
}

/// Operations on the registered room, sent over the master connection.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    master: Arc<Peer>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Whether the master connection is still up.
    pub fn is_connected(&self) -> bool {
        self.master.is_connected()
    }

    async fn call(&self, payload: Message) -> Result<Message, PeerError> {
        self.master.request(payload).await?.into_result()
    }

    /// Confirms a token a joining player presented.
    pub async fn validate_access(&self, token: &str) -> Result<ValidatedAccess, PeerError> {
        let reply = self
            .call(Message::ValidateRoomAccess {
                room_id: self.room_id,
                token: token.to_string(),
            })
            .await?;
        match reply {
            Message::AccessValidated { peer_id, username } => {
                Ok(ValidatedAccess { peer_id, username })
            }
            other => Err(PeerError::UnexpectedResponse(other.kind())),
        }
    }

    pub async fn player_left(&self, peer_id: PeerId) -> Result<(), PeerError> {
        self.call(Message::PlayerLeftRoom {
            room_id: self.room_id,
            peer_id,
        })
        .await
        .map(drop)
    }

    /// Replaces the room's options on the master.
    pub async fn save_options(&self, options: RoomOptions) -> Result<(), PeerError> {
        self.call(Message::SaveRoomOptions {
            room_id: self.room_id,
            options,
        })
        .await
        .map(drop)
    }

    pub async fn destroy(&self) -> Result<(), PeerError> {
        self.call(Message::DestroyRoom {
            room_id: self.room_id,
        })
        .await
        .map(drop)
    }
}

// ---------------------------------------------------------------------------
// RoomServer
// ---------------------------------------------------------------------------

pub struct RoomServer<S = MasterSpawner, P = AdmitAll> {
    config: RoomServerConfig,
    spawner: S,
    policy: Arc<P>,
    state: watch::Sender<RoomServerState>,
    registered: watch::Sender<Option<RoomHandle>>,
}

impl RoomServer {
    /// Room server using [`MasterSpawner`] and admitting everyone.
    pub fn new(config: RoomServerConfig) -> Self {
        let spawner = MasterSpawner::new(config.spawn_task.as_ref());
        let (state, _) = watch::channel(RoomServerState::Idle);
        let (registered, _) = watch::channel(None);
        Self {
            config,
            spawner,
            policy: Arc::new(AdmitAll),
            state,
            registered,
        }
    }
}

impl<S: Spawner, P: AccessPolicy> RoomServer<S, P> {
    pub fn with_spawner<T: Spawner>(self, spawner: T) -> RoomServer<T, P> {
        RoomServer {
            config: self.config,
            spawner,
            policy: self.policy,
            state: self.state,
            registered: self.registered,
        }
    }

    pub fn with_access_policy<Q: AccessPolicy>(self, policy: Q) -> RoomServer<S, Q> {
        RoomServer {
            config: self.config,
            spawner: self.spawner,
            policy: Arc::new(policy),
            state: self.state,
            registered: self.registered,
        }
    }

    pub fn config(&self) -> &RoomServerConfig {
        &self.config
    }

    pub fn state(&self) -> watch::Receiver<RoomServerState> {
        self.state.subscribe()
    }

    /// Resolves with the room handle once the room is registered, or with
    /// `None` if [`run`](Self::run) returns first.
    pub fn on_registered(&self) -> impl Future<Output = Option<RoomHandle>> + Send + 'static {
        let mut rx = self.registered.subscribe();
        async move {
            rx.wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|handle| handle.clone())
        }
    }

    fn set_state(&self, state: RoomServerState) {
        debug!(?state, "room server state");
        self.state.send_replace(state);
    }

    /// Connects, registers and serves until the master goes away.
    pub async fn run(self) -> RoomServerExit {
        info!(
            master = %self.config.master_addr,
            options = %self.config.options,
            "starting room server"
        );

        let conn = self.connect().await;
        self.set_state(RoomServerState::Connected);

        let own_id = match initiate_handshake(&conn, &JsonCodec, self.config.master_token.clone()).await {
            Ok(id) => id,
            Err(e) => return self.halt(RoomServerError::Handshake(e)),
        };
        info!(peer_id = %own_id, "room server is connected to master server");

        let (master, inbox) = attach(conn, JsonCodec, MASTER_PEER_ID, PeerIdentity::default());
        tokio::spawn(serve_master(Arc::clone(&master), inbox, Arc::clone(&self.policy)));

        match self.register(&master).await {
            Ok(handle) => {
                self.set_state(RoomServerState::Registered(handle.room_id()));
                self.registered.send_replace(Some(handle));
                info!("room server registered");
            }
            Err(_) if !master.is_connected() => return self.disconnected(),
            Err(e) => {
                master.disconnect();
                return self.halt(e);
            }
        }

        master.closed().await;
        self.disconnected()
    }

    async fn connect(&self) -> WebSocketConnection {
        let addr = self.config.master_addr.as_str();
        let retry = self.config.retry_interval;
        self.set_state(RoomServerState::Connecting);
        info!(addr, "connecting room server to master server");

        loop {
            match tokio::time::timeout(retry, WebSocketConnection::connect(addr)).await {
                Ok(Ok(conn)) => return conn,
                Ok(Err(e)) => debug!(addr, error = %e, "connection to master failed"),
                Err(_) => debug!(addr, "connection to master timed out"),
            }
            tokio::time::sleep(retry).await;
            info!(addr, "retrying connection of room server to master server");
        }
    }

    async fn register(&self, master: &Arc<Peer>) -> Result<RoomHandle, RoomServerError> {
        let task = if self.config.start_as_process {
            self.set_state(RoomServerState::SpawnHandshake);
            let args = match &self.config.spawn_task {
                Some(args) if self.spawner.is_spawned_process() => args,
                _ => return Err(RoomServerError::NotSpawned),
            };
            let task = self
                .spawner
                .register_spawned_process(master, args.task_id, &args.unique_code)
                .await
                .map_err(RoomServerError::SpawnRegistration)?;
            Some(task)
        } else {
            None
        };

        self.set_state(RoomServerState::Registering);
        let handle = self.register_room(master).await?;

        if let Some(task) = task {
            info!(task_id = task.task_id(), "finalizing registration task");
            task.finalize(BTreeMap::new())
                .await
                .map_err(RoomServerError::Finalize)?;
        }
        Ok(handle)
    }

    async fn register_room(&self, master: &Arc<Peer>) -> Result<RoomHandle, RoomServerError> {
        let reply = master
            .request(Message::RegisterRoom {
                options: self.config.options.clone(),
            })
            .await
            .and_then(Response::into_result)
            .map_err(RoomServerError::Registration)?;

        match reply {
            Message::RoomRegistered { room_id } => {
                info!(%room_id, options = %self.config.options, "room created successfully");
                Ok(RoomHandle {
                    room_id,
                    master: Arc::clone(master),
                })
            }
            other => Err(RoomServerError::Registration(
                PeerError::UnexpectedResponse(other.kind()),
            )),
        }
    }

    fn halt(&self, err: RoomServerError) -> RoomServerExit {
        error!(error = %err, "room server registration halted");
        self.set_state(RoomServerState::Halted);
        RoomServerExit::Halted(err)
    }

    fn disconnected(&self) -> RoomServerExit {
        warn!("disconnected from master server, room server must quit");
        self.set_state(RoomServerState::Disconnected);
        RoomServerExit::MasterDisconnected
    }
}

/// Answers the master's requests until the connection closes.
async fn serve_master<P: AccessPolicy>(master: Arc<Peer>, mut inbox: Inbox, policy: Arc<P>) {
    while let Some(envelope) = inbox.recv().await {
        let reply_to = envelope.seq;
        match envelope.payload {
            Message::ProvideRoomAccessCheck {
                room_id,
                peer_id,
                username,
                properties,
            } => {
                let request = AccessRequest {
                    room_id,
                    peer_id,
                    username,
                    properties,
                };
                let master = Arc::clone(&master);
                let policy = Arc::clone(&policy);
                tokio::spawn(async move {
                    let sent = match policy.check(&request).await {
                        Ok(()) => master.respond(reply_to, ResponseStatus::Success, Message::Ack),
                        Err(reason) => {
                            debug!(%room_id, %peer_id, %reason, "player refused");
                            master.respond_failure(reply_to, ResponseStatus::Unauthorized, &reason)
                        }
                    };
                    if let Err(e) = sent {
                        debug!(error = %e, "could not answer access check");
                    }
                });
            }
            other => {
                debug!(kind = other.kind(), "unhandled request from master");
                if let Err(e) =
                    master.respond_failure(reply_to, ResponseStatus::Failed, "unhandled request")
                {
                    debug!(error = %e, "could not answer master");
                }
            }
        }
    }
}
