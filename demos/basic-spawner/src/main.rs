//! Runs a master, a room server or a one-shot client from the command line.
//!
//! ```text
//! basic-spawner master --bind 127.0.0.1:5000 --spawn-task 1:secret
//! basic-spawner room --room-name arena --start-as-process --spawn-task-id 1 --spawn-code secret
//! basic-spawner client --password ""
//! ```

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use roomhub::prelude::*;
use roomhub::DEFAULT_MASTER_ADDR;
use roomhub_peer::{attach, initiate_handshake};
use roomhub_protocol::JsonCodec;
use roomhub_transport::WebSocketConnection;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "basic-spawner")]
#[command(about = "Roomhub master, room server and test client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the master server
    Master(MasterArgs),
    /// Run a room server that registers with a master
    Room(RoomServerArgs),
    /// List public rooms and request access to the first one
    Client(ClientArgs),
}

#[derive(clap::Args, Debug)]
struct MasterArgs {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_MASTER_ADDR)]
    bind: String,

    /// Minimum permission level for registering rooms
    #[arg(long, default_value_t = 0)]
    register_room_permission_level: i32,

    /// Seconds an access token stays valid
    #[arg(long, default_value_t = 10)]
    access_timeout: u64,

    /// Spawn task a launched room server will claim, as ID:CODE
    #[arg(long = "spawn-task", value_parser = parse_spawn_task)]
    spawn_tasks: Vec<(u64, String)>,
}

#[derive(clap::Args, Debug)]
struct ClientArgs {
    /// Master address
    #[arg(long, default_value = DEFAULT_MASTER_ADDR)]
    master: String,

    /// Password for the room
    #[arg(long, default_value = "")]
    password: String,
}

fn parse_spawn_task(value: &str) -> Result<(u64, String), String> {
    let (id, code) = value
        .split_once(':')
        .ok_or_else(|| format!("expected ID:CODE, got {value:?}"))?;
    let id = id.parse().map_err(|e| format!("invalid task id {id:?}: {e}"))?;
    Ok((id, code.to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let result = match Cli::parse().command {
        Command::Master(args) => run_master(args).await,
        Command::Room(args) => return run_room(args).await,
        Command::Client(args) => run_client(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run_master(args: MasterArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = MasterServer::builder()
        .bind(&args.bind)
        .register_room_permission_level(args.register_room_permission_level)
        .access_timeout(Duration::from_secs(args.access_timeout));
    for (task_id, code) in args.spawn_tasks {
        builder = builder.expect_spawn_task(task_id, code);
    }

    let server = builder.build().await?;
    info!(addr = %server.local_addr()?, "master listening");
    server.run().await?;
    Ok(())
}

async fn run_room(args: RoomServerArgs) -> ExitCode {
    let server = RoomServer::new(args.resolve());
    let registered = server.on_registered();
    tokio::spawn(async move {
        if let Some(room) = registered.await {
            info!(room_id = %room.room_id(), "accepting players");
        }
    });

    match server.run().await {
        RoomServerExit::MasterDisconnected => {
            warn!("master connection lost, shutting down");
            ExitCode::SUCCESS
        }
        RoomServerExit::Halted(e) => {
            error!(error = %e, "room server halted");
            ExitCode::FAILURE
        }
    }
}

async fn run_client(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let conn = WebSocketConnection::connect(&args.master).await?;
    let id = initiate_handshake(&conn, &JsonCodec, None).await?;
    let (master, _inbox) = attach(conn, JsonCodec, id, PeerIdentity::default());

    let reply = master
        .request(Message::ListPublicGames {
            filters: BTreeMap::new(),
        })
        .await?
        .into_result()?;
    let Message::PublicGames { games } = reply else {
        return Err("unexpected reply to ListPublicGames".into());
    };
    for game in &games {
        info!(
            id = %game.id,
            name = %game.name,
            address = %game.address,
            players = game.online_players,
            max = game.max_players,
            region = %game.region,
            "public room"
        );
    }

    let Some(first) = games.first() else {
        info!("no public rooms");
        return Ok(());
    };
    let reply = master
        .request(Message::GetRoomAccess {
            room_id: first.id,
            password: args.password,
            properties: BTreeMap::new(),
        })
        .await?
        .into_result()?;
    if let Message::RoomAccess(access) = reply {
        info!(
            room_id = %access.room_id,
            token = %access.token,
            address = %format!("{}:{}", access.room_ip, access.room_port),
            "access granted"
        );
    }
    master.disconnect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spawn_task() {
        assert_eq!(parse_spawn_task("7:abc"), Ok((7, "abc".to_string())));
        assert!(parse_spawn_task("7").is_err());
        assert!(parse_spawn_task("x:abc").is_err());
    }

    #[test]
    fn test_room_subcommand_reads_overrides() {
        let cli = Cli::try_parse_from(["basic-spawner", "room", "--room-name", "arena"]).unwrap();
        let Command::Room(args) = cli.command else {
            panic!("expected room subcommand");
        };
        assert_eq!(args.resolve().options.name, "arena");
    }
}
