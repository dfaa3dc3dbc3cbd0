//! Session actor: runs a [`SessionManager`] on its own Tokio task.
//!
//! Control surfaces never touch the manager directly. They hold a cheap,
//! cloneable [`SessionHandle`] and send commands through a channel; the
//! actor interleaves those commands with client events and timers, so
//! every mutation happens on one task in a well-defined order.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use vigil_protocol::{
    ConnectionStatus, SafetyConfig, SessionEvent, StatusSnapshot,
};

use crate::{SessionError, SessionManager};

/// Commands the outside world can send to the session actor.
enum SessionCommand {
    Connect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reason: String,
        reply: oneshot::Sender<()>,
    },
    SendMessage {
        text: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    SetSafetyEnabled {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    SafetyConfig {
        reply: oneshot::Sender<SafetyConfig>,
    },
    Shutdown,
}

/// Handle to a running session actor.
///
/// Cheap to clone. Every method fails with [`SessionError::Unavailable`]
/// once the actor has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Connect { reply }).await?
    }

    pub async fn disconnect(&self, reason: impl Into<String>) -> Result<(), SessionError> {
        let reason = reason.into();
        self.request(|reply| SessionCommand::Disconnect { reason, reply })
            .await
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| SessionCommand::SendMessage { text, reply })
            .await?
    }

    pub async fn status(&self) -> Result<StatusSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    pub async fn set_safety_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetSafetyEnabled { enabled, reply })
            .await
    }

    pub async fn safety_config(&self) -> Result<SafetyConfig, SessionError> {
        self.request(|reply| SessionCommand::SafetyConfig { reply })
            .await
    }

    /// Subscribes to session events. Does not round-trip through the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Asks the actor to stop. The current client, if any, is quit first.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }
}

struct SessionActor {
    manager: SessionManager,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        tracing::info!("session actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                input = self.manager.next_input() => {
                    self.manager.handle_input(input);
                }
            }
        }

        if self.manager.state() != ConnectionStatus::Disconnected {
            self.manager.disconnect("session shutting down");
        }
        tracing::info!("session actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Connect { reply } => {
                let _ = reply.send(self.manager.connect());
            }
            SessionCommand::Disconnect { reason, reply } => {
                self.manager.disconnect(&reason);
                let _ = reply.send(());
            }
            SessionCommand::SendMessage { text, reply } => {
                let _ = reply.send(self.manager.send_message(&text));
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.manager.status());
            }
            SessionCommand::SetSafetyEnabled { enabled, reply } => {
                self.manager.set_safety_enabled(enabled);
                let _ = reply.send(());
            }
            SessionCommand::SafetyConfig { reply } => {
                let _ = reply.send(self.manager.safety_config());
            }
            SessionCommand::Shutdown => return false,
        }
        true
    }
}

/// Spawns the session actor and returns a handle to it, plus the task's
/// join handle.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub fn spawn_session(
    manager: SessionManager,
    channel_size: usize,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(channel_size);
    let handle = SessionHandle {
        sender: tx,
        events: manager.event_sender(),
    };
    let actor = SessionActor {
        manager,
        receiver: rx,
    };
    (handle, tokio::spawn(actor.run()))
}
