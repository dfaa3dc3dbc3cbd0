/// Errors reported by a game-protocol client implementation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client could not be constructed (bad options, DNS failure,
    /// library refused to start).
    #[error("client construction failed: {0}")]
    Construction(String),

    /// An outbound action (chat) could not be handed to the client.
    #[error("client send failed: {0}")]
    Send(String),

    /// The client has already quit or lost its connection.
    #[error("client is closed")]
    Closed,
}
