//! Codec trait and implementations for serializing frames.
//!
//! The peer layer only needs something that implements [`Codec`]; the
//! concrete format is swappable without touching the registry or the
//! room server.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task of a server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable frames make the master/room-server conversation easy
/// to follow in logs. Behind the `json` feature (enabled by default).
///
/// ```rust
/// use roomhub_protocol::{Codec, Envelope, JsonCodec, Message, RoomId};
///
/// let codec = JsonCodec;
/// let frame = Envelope::request(3, Message::DestroyRoom { room_id: RoomId(0) });
///
/// let bytes = codec.encode(&frame).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, Message};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_message_tag_returns_error() {
        let frame = br#"{"seq":1,"payload":{"type":"FlyToMoon"}}"#;
        let result: Result<Envelope, _> = JsonCodec.decode(frame);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_produces_tagged_payload() {
        let bytes = JsonCodec.encode(&Envelope::request(1, Message::Ack)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["payload"]["type"], "Ack");
    }
}
