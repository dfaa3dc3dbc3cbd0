//! Unified error type for Vigil.

use vigil_client::ClientError;
use vigil_protocol::ProtocolError;
use vigil_session::SessionError;
use vigil_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` conversions let `?` lift sub-crate errors, so the binary
/// only ever deals with this one type.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// Startup configuration is missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Control-surface transport failure (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A control frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session operation was refused or the session is gone.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Client(#[from] ClientError),
}
