//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding control frames.
///
/// Kept separate from session and transport errors: a `ProtocolError` always
/// means the bytes were wrong, never that the game session misbehaved.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a frame into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown `op`/`command` tag,
    /// missing fields, or wrong types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded fine but breaks a protocol rule, e.g. a command
    /// sent before the `hello` frame.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
