//! Safety-alert delivery to control clients.
//!
//! Alerts are routed with a fixed fallback chain: straight to the owner
//! control client if it is connected, otherwise one broadcast to every
//! control client, otherwise a log line. Delivery is best effort and never
//! blocks the session.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use vigil_protocol::{SafetyAlert, ServerFrame, SessionEvent};

use crate::registry::ControlClients;

/// Where an alert ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Owner,
    /// Broadcast, with the number of clients that accepted it.
    Broadcast(usize),
    /// Nobody could take it.
    Logged,
}

pub struct Notifier {
    clients: Arc<ControlClients>,
    owner: Option<String>,
}

impl Notifier {
    pub fn new(clients: Arc<ControlClients>, owner: Option<String>) -> Self {
        Self { clients, owner }
    }

    pub async fn deliver(&self, alert: SafetyAlert) -> Delivery {
        let kind = alert.kind();
        let frame = ServerFrame::Event {
            event: SessionEvent::SafetyAlert { alert },
        };

        if let Some(owner) = &self.owner {
            if self.clients.send_to(owner, frame.clone()).await {
                tracing::debug!(%kind, %owner, "alert delivered to owner");
                return Delivery::Owner;
            }
        }

        match self.clients.broadcast(&frame).await {
            0 => {
                tracing::warn!(%kind, "no control client reachable; alert only logged");
                Delivery::Logged
            }
            n => {
                tracing::debug!(%kind, clients = n, "alert broadcast");
                Delivery::Broadcast(n)
            }
        }
    }

    /// Delivers every alert seen on `events` until the channel closes.
    pub async fn run(self, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(SessionEvent::SafetyAlert { alert }) => {
                    self.deliver(alert).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notifier lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("notifier stopped");
    }

    pub fn spawn(self, events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}
