//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding or interpreting frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed bytes, missing fields or an
    /// unknown message tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but violates the protocol, e.g. a response to a
    /// request that expected a different message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
