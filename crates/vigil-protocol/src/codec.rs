//! Codec trait and implementations for control frames.
//!
//! The control server never touches `serde_json` directly; it holds a
//! [`Codec`] and asks it to encode/decode. Swapping the wire format means
//! writing another codec, nothing else.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the life of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// Encodes a value as UTF-8 text, for transports that carry text frames.
    fn encode_text<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<String, ProtocolError> {
        let bytes = self.encode(value)?;
        String::from_utf8(bytes).map_err(|e| {
            ProtocolError::InvalidMessage(format!("codec produced non-UTF-8 output: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// JSON keeps control traffic readable in a browser console or `websocat`
/// session, which matters more here than frame size.
///
/// ## Example
///
/// ```rust
/// use vigil_protocol::{Codec, ControlCommand, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&ControlCommand::GetStatus).unwrap();
/// assert_eq!(bytes, br#"{"command":"get_status"}"#);
///
/// let decoded: ControlCommand = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, ControlCommand::GetStatus);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    fn encode_text<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientFrame, ServerFrame};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<ClientFrame, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_text_matches_encode_bytes() {
        let frame = ServerFrame::Error {
            code: 429,
            message: "slow down".into(),
        };
        let text = JsonCodec.encode_text(&frame).unwrap();
        let bytes = JsonCodec.encode(&frame).unwrap();
        assert_eq!(text.as_bytes(), bytes.as_slice());
        assert!(text.contains(r#""op":"error""#));
    }
}
