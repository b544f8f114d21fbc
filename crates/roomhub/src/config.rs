//! Master and room-server configuration.
//!
//! Both sides use plain structs with `Default`. A room-server process
//! can also fill its config from the command line or `ROOMHUB_*`
//! environment variables through [`RoomServerArgs`], where every value
//! is optional and falls back to a named default.

use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use roomhub_protocol::{DEFAULT_REGION, RoomOptions};

/// Where a master listens when nothing else is configured.
pub const DEFAULT_MASTER_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_ROOM_IP: &str = "127.0.0.1";
pub const DEFAULT_ROOM_PORT: u16 = 7777;

/// Master server settings.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind_addr: String,
    /// Minimum permission level needed to register a room.
    pub register_room_permission_level: i32,
    /// Age after which an unconfirmed access grant is swept.
    pub access_timeout: Duration,
    /// How often grants are swept.
    pub maintenance_interval: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_MASTER_ADDR.to_string(),
            register_room_permission_level: 0,
            access_timeout: Duration::from_secs(10),
            maintenance_interval: Duration::from_secs(1),
        }
    }
}

/// Spawn task a process was launched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnTaskArgs {
    pub task_id: u64,
    pub unique_code: String,
}

/// Room server settings.
#[derive(Debug, Clone)]
pub struct RoomServerConfig {
    /// `ip:port` of the master.
    pub master_addr: String,
    /// Handshake token; the master's authenticator turns it into a
    /// permission level.
    pub master_token: Option<String>,
    /// Register only as a spawned process, after the spawn handshake.
    pub start_as_process: bool,
    pub spawn_task: Option<SpawnTaskArgs>,
    /// Delay between connection attempts. Also the limit for a single
    /// attempt.
    pub retry_interval: Duration,
    /// Options the room is registered with.
    pub options: RoomOptions,
}

impl Default for RoomServerConfig {
    fn default() -> Self {
        Self {
            master_addr: DEFAULT_MASTER_ADDR.to_string(),
            master_token: None,
            start_as_process: false,
            spawn_task: None,
            retry_interval: Duration::from_secs(2),
            options: RoomOptions {
                name: random_room_name(),
                room_ip: DEFAULT_ROOM_IP.to_string(),
                room_port: DEFAULT_ROOM_PORT,
                ..RoomOptions::default()
            },
        }
    }
}

/// `Room_` followed by five random alphanumerics.
pub fn random_room_name() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    format!("Room_{suffix}")
}

/// Command-line / environment overrides for a room server.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RoomServerArgs {
    /// Master IP address
    #[arg(long, env = "ROOMHUB_MASTER_IP")]
    pub master_ip: Option<String>,

    /// Master port
    #[arg(long, env = "ROOMHUB_MASTER_PORT")]
    pub master_port: Option<u16>,

    /// Token sent in the master handshake
    #[arg(long, env = "ROOMHUB_MASTER_TOKEN")]
    pub master_token: Option<String>,

    /// Only register after the spawn handshake
    #[arg(long, env = "ROOMHUB_START_AS_PROCESS")]
    pub start_as_process: bool,

    /// Hide the room from public listings
    #[arg(long, env = "ROOMHUB_ROOM_PRIVATE")]
    pub room_private: bool,

    /// Player capacity, 0 for unlimited
    #[arg(long, env = "ROOMHUB_ROOM_MAX_CONNECTIONS")]
    pub room_max_connections: Option<u32>,

    #[arg(long, env = "ROOMHUB_ROOM_NAME")]
    pub room_name: Option<String>,

    #[arg(long, env = "ROOMHUB_ROOM_PASSWORD")]
    pub room_password: Option<String>,

    /// Address players connect to
    #[arg(long, env = "ROOMHUB_ROOM_IP")]
    pub room_ip: Option<String>,

    #[arg(long, env = "ROOMHUB_ROOM_PORT")]
    pub room_port: Option<u16>,

    #[arg(long, env = "ROOMHUB_ROOM_REGION")]
    pub room_region: Option<String>,

    /// Spawn task this process was launched for
    #[arg(long, env = "ROOMHUB_SPAWN_TASK_ID", requires = "spawn_code")]
    pub spawn_task_id: Option<u64>,

    /// One-time code of the spawn task
    #[arg(long, env = "ROOMHUB_SPAWN_CODE", requires = "spawn_task_id")]
    pub spawn_code: Option<String>,
}

impl RoomServerArgs {
    /// Applies the fallbacks and builds the config.
    pub fn resolve(&self) -> RoomServerConfig {
        let master_ip = self.master_ip.as_deref().unwrap_or("127.0.0.1");
        let master_port = self.master_port.unwrap_or(5000);

        let spawn_task = match (self.spawn_task_id, &self.spawn_code) {
            (Some(task_id), Some(code)) => Some(SpawnTaskArgs {
                task_id,
                unique_code: code.clone(),
            }),
            _ => None,
        };

        RoomServerConfig {
            master_addr: format!("{master_ip}:{master_port}"),
            master_token: self.master_token.clone(),
            start_as_process: self.start_as_process,
            spawn_task,
            options: RoomOptions {
                name: self.room_name.clone().unwrap_or_else(random_room_name),
                is_public: !self.room_private,
                max_connections: self.room_max_connections.unwrap_or(0),
                room_ip: self
                    .room_ip
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ROOM_IP.to_string()),
                room_port: self.room_port.unwrap_or(DEFAULT_ROOM_PORT),
                password: self.room_password.clone().unwrap_or_default(),
                region: self
                    .room_region
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                ..RoomOptions::default()
            },
            ..RoomServerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: RoomServerArgs,
    }

    #[test]
    fn test_random_room_name_shape() {
        let name = random_room_name();
        assert_eq!(name.len(), 10);
        assert!(name.starts_with("Room_"));
        assert!(name[5..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_empty_args_resolve_to_fallbacks() {
        let config = RoomServerArgs::default().resolve();
        assert_eq!(config.master_addr, "127.0.0.1:5000");
        assert!(!config.start_as_process);
        assert!(config.spawn_task.is_none());
        assert_eq!(config.retry_interval, Duration::from_secs(2));

        let opts = &config.options;
        assert!(opts.is_public);
        assert_eq!(opts.max_connections, 0);
        assert!(opts.name.starts_with("Room_"));
        assert_eq!(opts.password, "");
        assert_eq!(opts.address(), "127.0.0.1:7777");
        assert_eq!(opts.region, "International");
    }

    #[test]
    fn test_flags_override_fallbacks() {
        let cli = Cli::try_parse_from([
            "room",
            "--master-ip",
            "10.0.0.1",
            "--master-port",
            "6000",
            "--room-private",
            "--room-max-connections",
            "4",
            "--room-name",
            "Arena",
            "--room-password",
            "pw",
            "--room-port",
            "7800",
            "--room-region",
            "EU",
            "--spawn-task-id",
            "12",
            "--spawn-code",
            "abc",
        ])
        .unwrap();
        let config = cli.args.resolve();

        assert_eq!(config.master_addr, "10.0.0.1:6000");
        assert!(!config.options.is_public);
        assert_eq!(config.options.max_connections, 4);
        assert_eq!(config.options.name, "Arena");
        assert!(config.options.is_password_protected());
        assert_eq!(config.options.room_port, 7800);
        assert_eq!(config.options.region, "EU");
        assert_eq!(
            config.spawn_task,
            Some(SpawnTaskArgs {
                task_id: 12,
                unique_code: "abc".into()
            })
        );
    }

    #[test]
    fn test_spawn_task_id_requires_code() {
        assert!(Cli::try_parse_from(["room", "--spawn-task-id", "3"]).is_err());
    }

    #[test]
    fn test_master_defaults() {
        let config = MasterConfig::default();
        assert_eq!(config.register_room_permission_level, 0);
        assert_eq!(config.access_timeout, Duration::from_secs(10));
        assert_eq!(config.maintenance_interval, Duration::from_secs(1));
    }
}
