//! Core protocol types: identities, the request/response frame and the
//! closed set of messages it can carry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{GameInfo, RoomAccessPacket, RoomOptions};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Unique identifier of a connected peer (room server or player client),
/// assigned by the master when the connection is accepted.
///
/// `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Identifier of a registered room.
///
/// Allocated by the master's registry, starting at 0 and never reused for
/// the lifetime of that registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ResponseStatus
// ---------------------------------------------------------------------------

/// Outcome attached to every response frame.
///
/// Failures carry a [`Message::Reason`] payload with a human-readable
/// explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[default]
    Success,
    /// The target does not exist or the operation could not be performed.
    Failed,
    /// The caller lacks the permission level or is not the room's owner.
    Unauthorized,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
            Self::Unauthorized => write!(f, "Unauthorized"),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Every request and response body understood by Roomhub.
///
/// Internally tagged: `{ "type": "DestroyRoom", "room_id": 0 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // -- Connection lifecycle --
    /// Any peer → master: first frame on a new connection.
    Handshake { version: u32, token: Option<String> },

    /// Master → peer: the connection is accepted under this id.
    HandshakeAck { peer_id: PeerId },

    // -- Room registration (room server → master) --
    /// Register a new room owned by the sending peer.
    RegisterRoom { options: RoomOptions },

    /// Reply to [`Message::RegisterRoom`].
    RoomRegistered { room_id: RoomId },

    /// Unregister a room. Only its owner may do this.
    DestroyRoom { room_id: RoomId },

    /// Replace a room's options wholesale. Only its owner may do this.
    SaveRoomOptions { room_id: RoomId, options: RoomOptions },

    /// Tell the master a confirmed player left the room.
    PlayerLeftRoom { room_id: RoomId, peer_id: PeerId },

    /// Confirm an access token presented by a joining player.
    ValidateRoomAccess { room_id: RoomId, token: String },

    /// Reply to [`Message::ValidateRoomAccess`]: who the token belonged to.
    AccessValidated {
        peer_id: PeerId,
        username: Option<String>,
    },

    // -- Access (client → master → room server) --
    /// Ask for permission to join a room.
    GetRoomAccess {
        room_id: RoomId,
        #[serde(default)]
        password: String,
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },

    /// Master → owning room server: may this player join?
    ProvideRoomAccessCheck {
        room_id: RoomId,
        peer_id: PeerId,
        username: Option<String>,
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },

    /// Reply to [`Message::GetRoomAccess`] carrying the join token.
    RoomAccess(RoomAccessPacket),

    // -- Listing --
    /// Ask for the summaries of all public rooms.
    ListPublicGames {
        #[serde(default)]
        filters: BTreeMap<String, String>,
    },

    /// Reply to [`Message::ListPublicGames`].
    PublicGames { games: Vec<GameInfo> },

    // -- Spawner collaborator (spawned room server → master) --
    /// Announce that this process was launched for spawn task `task_id`.
    RegisterSpawnedProcess { task_id: u64, unique_code: String },

    /// Mark spawn task `task_id` as finished.
    CompleteSpawnProcess {
        task_id: u64,
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },

    // -- Generic replies --
    /// Success without a body.
    Ack,

    /// Failure explanation, paired with a non-success [`ResponseStatus`].
    Reason { message: String },
}

impl Message {
    /// Builds a [`Message::Reason`].
    pub fn reason(message: impl Into<String>) -> Self {
        Self::Reason {
            message: message.into(),
        }
    }

    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "Handshake",
            Self::HandshakeAck { .. } => "HandshakeAck",
            Self::RegisterRoom { .. } => "RegisterRoom",
            Self::RoomRegistered { .. } => "RoomRegistered",
            Self::DestroyRoom { .. } => "DestroyRoom",
            Self::SaveRoomOptions { .. } => "SaveRoomOptions",
            Self::PlayerLeftRoom { .. } => "PlayerLeftRoom",
            Self::ValidateRoomAccess { .. } => "ValidateRoomAccess",
            Self::AccessValidated { .. } => "AccessValidated",
            Self::GetRoomAccess { .. } => "GetRoomAccess",
            Self::ProvideRoomAccessCheck { .. } => "ProvideRoomAccessCheck",
            Self::RoomAccess(_) => "RoomAccess",
            Self::ListPublicGames { .. } => "ListPublicGames",
            Self::PublicGames { .. } => "PublicGames",
            Self::RegisterSpawnedProcess { .. } => "RegisterSpawnedProcess",
            Self::CompleteSpawnProcess { .. } => "CompleteSpawnProcess",
            Self::Ack => "Ack",
            Self::Reason { .. } => "Reason",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The frame every message travels in.
///
/// Requests carry a sender-allocated `seq`. A response echoes that number
/// in `reply_to` and states its outcome in `status`.
///
/// ```text
/// room server                      master
///   seq=4 RegisterRoom ───────────►
///         ◄─────────── seq=9 reply_to=4 Success RoomRegistered
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender-local, monotonically increasing sequence number.
    pub seq: u64,

    /// `Some(seq)` of the request this frame answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,

    /// Outcome of a response. Ignored on requests.
    #[serde(default)]
    pub status: ResponseStatus,

    pub payload: Message,
}

impl Envelope {
    /// A new request frame.
    pub fn request(seq: u64, payload: Message) -> Self {
        Self {
            seq,
            reply_to: None,
            status: ResponseStatus::Success,
            payload,
        }
    }

    /// A response to request `reply_to`.
    pub fn response(seq: u64, reply_to: u64, status: ResponseStatus, payload: Message) -> Self {
        Self {
            seq,
            reply_to: Some(reply_to),
            status,
            payload,
        }
    }

    /// Whether this frame answers an earlier request.
    pub fn is_response(&self) -> bool {
        self.reply_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&RoomId(0)).unwrap(), "0");
        assert_eq!(serde_json::to_string(&PeerId(17)).unwrap(), "17");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(RoomId(3).to_string(), "room-3");
        assert_eq!(PeerId(9).to_string(), "peer-9");
    }

    #[test]
    fn test_response_status_defaults_to_success_when_missing() {
        let env: Envelope =
            serde_json::from_str(r#"{"seq":1,"payload":{"type":"Ack"}}"#).unwrap();
        assert_eq!(env.status, ResponseStatus::Success);
        assert!(!env.is_response());
    }

    #[test]
    fn test_request_frame_omits_reply_to() {
        let env = Envelope::request(5, Message::DestroyRoom { room_id: RoomId(2) });
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("reply_to").is_none());
        assert_eq!(json["payload"]["type"], "DestroyRoom");
        assert_eq!(json["payload"]["room_id"], 2);
    }

    #[test]
    fn test_failure_response_json_shape() {
        let env = Envelope::response(
            8,
            5,
            ResponseStatus::Unauthorized,
            Message::reason("You're not the creator of the room"),
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["reply_to"], 5);
        assert_eq!(json["status"], "Unauthorized");
        assert_eq!(json["payload"]["type"], "Reason");
        assert_eq!(json["payload"]["message"], "You're not the creator of the room");
    }

    #[test]
    fn test_get_room_access_password_and_properties_default() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"GetRoomAccess","room_id":4}"#).unwrap();
        assert_eq!(
            msg,
            Message::GetRoomAccess {
                room_id: RoomId(4),
                password: String::new(),
                properties: BTreeMap::new(),
            }
        );
    }

    #[test]
    fn test_room_access_newtype_variant_is_flattened_under_tag() {
        let packet = RoomAccessPacket {
            room_id: RoomId(1),
            token: "abc".into(),
            room_ip: "10.0.0.5".into(),
            room_port: 7777,
            properties: BTreeMap::new(),
        };
        let json = serde_json::to_value(Message::RoomAccess(packet.clone())).unwrap();
        assert_eq!(json["type"], "RoomAccess");
        assert_eq!(json["token"], "abc");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, Message::RoomAccess(packet));
    }

    #[test]
    fn test_kind_names_variant() {
        assert_eq!(Message::Ack.kind(), "Ack");
        assert_eq!(Message::reason("x").kind(), "Reason");
    }
}
