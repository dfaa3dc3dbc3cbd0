//! Error types for the session layer.

use vigil_client::ClientError;
use vigil_protocol::ConnectionStatus;

/// Errors returned by session operations.
///
/// Every rejection names the precondition that failed, so a control
/// surface can show it to the operator verbatim.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `connect` was called while a session is live, in flight, or
    /// waiting to reconnect.
    #[error("cannot connect while {0}; disconnect first")]
    AlreadyActive(ConnectionStatus),

    /// The operation needs a live session.
    #[error("not connected (session is {0})")]
    NotConnected(ConnectionStatus),

    /// `send_message` with nothing but whitespace.
    #[error("message text is empty")]
    EmptyMessage,

    /// The game client refused the operation.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The session actor has stopped.
    #[error("session is not running")]
    Unavailable,
}
