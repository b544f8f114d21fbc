//! Structured packet bodies for room registration, access and listing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RoomId;

/// Region reported when a room server does not name one.
pub const DEFAULT_REGION: &str = "International";

/// Configuration a room server registers its room with.
///
/// Supplied at registration and replaced wholesale by
/// [`Message::SaveRoomOptions`](crate::Message::SaveRoomOptions).
/// An empty `password` means no password is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOptions {
    pub name: String,
    pub is_public: bool,
    /// Player capacity. 0 means unlimited.
    pub max_connections: u32,
    /// Address players connect to once they hold an access token.
    pub room_ip: String,
    pub room_port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Free-form metadata shown in public listings.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl RoomOptions {
    /// Whether joining requires a matching password.
    pub fn is_password_protected(&self) -> bool {
        !self.password.is_empty()
    }

    /// `ip:port` as shown in listings.
    pub fn address(&self) -> String {
        format!("{}:{}", self.room_ip, self.room_port)
    }
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_public: true,
            max_connections: 0,
            room_ip: "127.0.0.1".to_string(),
            room_port: 0,
            password: String::new(),
            region: default_region(),
            properties: BTreeMap::new(),
        }
    }
}

/// Log-friendly rendering. The password itself is never printed.
impl fmt::Display for RoomOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {}, public: {}, max connections: {}, address: {}, password protected: {}, region: {}",
            self.name,
            self.is_public,
            self.max_connections,
            self.address(),
            self.is_password_protected(),
            self.region,
        )
    }
}

/// Everything a player needs to join a room after access was granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAccessPacket {
    pub room_id: RoomId,
    /// Single-use token the player presents to the room server, which
    /// confirms it with the master.
    pub token: String,
    pub room_ip: String,
    pub room_port: u16,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Summary of one public room in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: RoomId,
    pub address: String,
    pub max_players: u32,
    pub name: String,
    pub online_players: usize,
    pub properties: BTreeMap<String, String>,
    pub is_password_protected: bool,
    pub region: String,
}
