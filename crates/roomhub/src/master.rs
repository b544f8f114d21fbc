//! `MasterServer` builder and server loops.
//!
//! The master runs three kinds of tasks:
//!
//! - the accept loop, spawning one task per connection (handshake, then
//!   requests through [`handle_request`](crate::handler))
//! - the cleanup loop, destroying rooms of owners that disconnected
//! - the maintenance loop, sweeping expired access grants on an
//!   [`IntervalScheduler`]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use roomhub_peer::{Authenticator, OpenAuthenticator};
use roomhub_protocol::{JsonCodec, PeerId};
use roomhub_rooms::{DisconnectReceiver, PublicPropertyFilter, RoomRegistry};
use roomhub_tick::IntervalScheduler;
use roomhub_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::config::MasterConfig;
use crate::handler::handle_connection;
use crate::spawner::SpawnTaskTable;
use crate::RoomhubError;

/// Shared state passed to each connection task.
pub(crate) struct MasterState<A: Authenticator> {
    pub(crate) config: MasterConfig,
    pub(crate) registry: Arc<Mutex<RoomRegistry>>,
    pub(crate) spawn_tasks: Arc<Mutex<SpawnTaskTable>>,
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
    next_peer_id: AtomicU64,
}

impl<A: Authenticator> MasterState<A> {
    pub(crate) fn next_peer_id(&self) -> PeerId {
        PeerId(self.next_peer_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builder for configuring and starting a master server.
///
/// # Example
///
/// ```rust,ignore
/// let server = MasterServer::builder()
///     .bind("0.0.0.0:5000")
///     .register_room_permission_level(1)
///     .authenticator(MyAuth)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct MasterServerBuilder<A = OpenAuthenticator> {
    config: MasterConfig,
    auth: A,
    property_filter: Option<Arc<dyn PublicPropertyFilter>>,
    spawn_tasks: SpawnTaskTable,
}

impl MasterServerBuilder {
    /// Creates a builder with default settings and an open authenticator.
    pub fn new() -> Self {
        Self {
            config: MasterConfig::default(),
            auth: OpenAuthenticator,
            property_filter: None,
            spawn_tasks: SpawnTaskTable::default(),
        }
    }
}

impl Default for MasterServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Authenticator> MasterServerBuilder<A> {
    /// Replaces every setting at once.
    pub fn config(mut self, config: MasterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn register_room_permission_level(mut self, level: i32) -> Self {
        self.config.register_room_permission_level = level;
        self
    }

    pub fn access_timeout(mut self, timeout: Duration) -> Self {
        self.config.access_timeout = timeout;
        self
    }

    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    /// Sets the authenticator that assigns permission levels.
    pub fn authenticator<B: Authenticator>(self, auth: B) -> MasterServerBuilder<B> {
        MasterServerBuilder {
            config: self.config,
            auth,
            property_filter: self.property_filter,
            spawn_tasks: self.spawn_tasks,
        }
    }

    /// Sets the filter applied to room properties in public listings.
    pub fn property_filter(mut self, filter: impl PublicPropertyFilter) -> Self {
        self.property_filter = Some(Arc::new(filter));
        self
    }

    /// Announces a spawn task a launched process will claim.
    pub fn expect_spawn_task(mut self, task_id: u64, unique_code: impl Into<String>) -> Self {
        self.spawn_tasks.expect(task_id, unique_code);
        self
    }

    /// Binds the listener. Uses `JsonCodec` over `WebSocketTransport`.
    pub async fn build(self) -> Result<MasterServer<A>, RoomhubError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let mut registry = RoomRegistry::new(self.config.access_timeout);
        if let Some(filter) = self.property_filter {
            registry = registry.with_property_filter(filter);
        }
        let disconnects = registry
            .take_disconnects()
            .expect("a new registry still owns its disconnect receiver");

        let state = Arc::new(MasterState {
            config: self.config,
            registry: Arc::new(Mutex::new(registry)),
            spawn_tasks: Arc::new(Mutex::new(self.spawn_tasks)),
            auth: self.auth,
            codec: JsonCodec,
            next_peer_id: AtomicU64::new(1),
        });

        Ok(MasterServer {
            transport,
            state,
            disconnects,
        })
    }
}

/// A bound master server. Call [`run()`](Self::run) to start serving.
pub struct MasterServer<A: Authenticator = OpenAuthenticator> {
    transport: WebSocketTransport,
    state: Arc<MasterState<A>>,
    disconnects: DisconnectReceiver,
}

impl MasterServer {
    pub fn builder() -> MasterServerBuilder {
        MasterServerBuilder::new()
    }
}

impl<A: Authenticator> MasterServer<A> {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The room registry, shared with the running server.
    pub fn registry(&self) -> Arc<Mutex<RoomRegistry>> {
        Arc::clone(&self.state.registry)
    }

    pub fn spawn_tasks(&self) -> Arc<Mutex<SpawnTaskTable>> {
        Arc::clone(&self.state.spawn_tasks)
    }

    pub fn config(&self) -> &MasterConfig {
        &self.state.config
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), RoomhubError> {
        let MasterServer {
            mut transport,
            state,
            disconnects,
        } = self;

        tokio::spawn(cleanup_loop(Arc::clone(&state.registry), disconnects));
        tokio::spawn(maintenance_loop(
            Arc::clone(&state.registry),
            state.config.maintenance_interval,
        ));

        tracing::info!(addr = %state.config.bind_addr, "master server running");

        loop {
            match transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Destroys the rooms of every owner reported through `disconnects`.
async fn cleanup_loop(registry: Arc<Mutex<RoomRegistry>>, mut disconnects: DisconnectReceiver) {
    while let Some(peer) = disconnects.recv().await {
        registry.lock().await.handle_peer_disconnect(&peer);
    }
}

async fn maintenance_loop(registry: Arc<Mutex<RoomRegistry>>, interval: Duration) {
    let mut scheduler = IntervalScheduler::new(interval);
    loop {
        scheduler.wait_for_tick().await;
        registry.lock().await.clear_timed_out_accesses();
        scheduler.record_tick_end();
    }
}
