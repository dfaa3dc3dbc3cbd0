//! Directory of greeted control clients and their outbound queues.

use std::collections::BTreeMap;

use tokio::sync::{Mutex, mpsc};
use vigil_protocol::ServerFrame;
use vigil_transport::ConnectionId;

/// Frames queued per control client before pushes start being dropped.
pub const OUTBOUND_QUEUE: usize = 32;

struct Entry {
    name: String,
    outbound: mpsc::Sender<ServerFrame>,
}

/// Control clients that completed the handshake, keyed by connection.
#[derive(Default)]
pub struct ControlClients {
    entries: Mutex<BTreeMap<ConnectionId, Entry>>,
}

impl ControlClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client and returns the receiving end of its outbound queue.
    pub async fn register(
        &self,
        id: ConnectionId,
        name: &str,
    ) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        self.entries.lock().await.insert(
            id,
            Entry {
                name: name.to_owned(),
                outbound: tx,
            },
        );
        rx
    }

    pub async fn unregister(&self, id: ConnectionId) -> bool {
        self.entries.lock().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Queues `frame` for the oldest connection registered under `name`.
    /// Returns `false` if no such client is connected or its queue is full.
    pub async fn send_to(&self, name: &str, frame: ServerFrame) -> bool {
        let entries = self.entries.lock().await;
        let Some((id, entry)) = entries.iter().find(|(_, e)| e.name == name) else {
            return false;
        };
        match entry.outbound.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(%id, error = %e, "direct push dropped");
                false
            }
        }
    }

    /// Queues `frame` for every client. Returns how many accepted it.
    pub async fn broadcast(&self, frame: &ServerFrame) -> usize {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|(id, entry)| match entry.outbound.try_send(frame.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(%id, error = %e, "broadcast push dropped");
                    false
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(code: u16) -> ServerFrame {
        ServerFrame::Error {
            code,
            message: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_send_to_reaches_named_client_only() {
        let clients = ControlClients::new();
        let mut ops = clients.register(ConnectionId::new(1), "ops").await;
        let mut other = clients.register(ConnectionId::new(2), "dash").await;

        assert!(clients.send_to("ops", frame(1)).await);
        assert!(!clients.send_to("nobody", frame(2)).await);

        assert_eq!(ops.try_recv().unwrap(), frame(1));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_picks_oldest_connection() {
        let clients = ControlClients::new();
        let mut second = clients.register(ConnectionId::new(9), "ops").await;
        let mut first = clients.register(ConnectionId::new(3), "ops").await;

        assert!(clients.send_to("ops", frame(1)).await);
        assert_eq!(first.try_recv().unwrap(), frame(1));
        assert!(second.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_counts_deliveries() {
        let clients = ControlClients::new();
        let mut a = clients.register(ConnectionId::new(1), "a").await;
        let b = clients.register(ConnectionId::new(2), "b").await;
        drop(b);

        assert_eq!(clients.broadcast(&frame(5)).await, 1);
        assert_eq!(a.try_recv().unwrap(), frame(5));
    }

    #[tokio::test]
    async fn test_unregister() {
        let clients = ControlClients::new();
        let _rx = clients.register(ConnectionId::new(1), "a").await;
        assert_eq!(clients.len().await, 1);

        assert!(clients.unregister(ConnectionId::new(1)).await);
        assert!(!clients.unregister(ConnectionId::new(1)).await);
        assert!(clients.is_empty().await);
    }
}
