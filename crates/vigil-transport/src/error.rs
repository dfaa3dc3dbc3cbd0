/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or completing a handshake failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// `true` when the error only means the peer is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_closed() {
        assert!(TransportError::ConnectionClosed("bye".into()).is_closed());
        assert!(TransportError::Shutdown.is_closed());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(!TransportError::SendFailed(io).is_closed());
    }

    #[test]
    fn test_display_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err = TransportError::AcceptFailed(io);
        assert_eq!(err.to_string(), "accept failed: port taken");
    }
}
