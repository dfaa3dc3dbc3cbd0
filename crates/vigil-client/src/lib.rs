//! Game-protocol client contract for Vigil.
//!
//! Vigil does not speak the game protocol itself. It drives a client
//! library through the [`GameClient`] and [`ClientFactory`] traits and
//! listens to the [`ClientEvent`]s the library reports back through a
//! [`ClientLink`].
//!
//! # What an implementation must do
//!
//! - Start connecting as soon as [`ClientFactory::create`] returns. The
//!   call itself must not block on the network; progress is reported later
//!   as events.
//! - Report every lifecycle fact through the link: `Login`, `Spawn`,
//!   `Health`, `Move`, and exactly one of `End` / `Error` / `Kicked` when the
//!   session dies.
//! - Write its human-readable diagnostics (including the device-code
//!   prompt) to the link's diagnostic writer instead of stderr, so the
//!   session layer can intercept them.
//!
//! # Generations
//!
//! Each link carries a generation number. The session manager bumps it
//! every time it replaces a client, and silently drops events tagged with
//! an older generation. A library that keeps emitting after `quit()` is
//! therefore harmless.

mod error;
mod link;

pub use error::ClientError;
pub use link::{ClientEventSender, ClientLink, TaggedEvent};

use vigil_protocol::{AuthMode, PlayerSighting, Position};

/// Everything needed to open a game session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    /// Protocol version string, e.g. `"1.20.4"`. `None` lets the library
    /// negotiate.
    pub version: Option<String>,
    pub auth_mode: AuthMode,
    /// Account name (or offline-mode player name).
    pub username: String,
}

impl ClientOptions {
    /// `host:port`, for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A lifecycle or world event reported by the game client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Authentication finished and the server accepted the login.
    Login,
    /// The avatar entered the world.
    Spawn,
    /// The avatar respawned after dying.
    Respawn,
    /// The avatar moved.
    Move(Position),
    /// Health changed. Game health points, 0–20.
    Health(u8),
    PlayerJoined(String),
    PlayerLeft(String),
    /// A chat line from another player (or the server).
    Message { username: String, text: String },
    /// The connection ended.
    End { reason: String },
    /// The client hit an error it cannot recover from.
    Error { message: String },
    /// The server kicked the avatar.
    Kicked { reason: String },
}

/// A live game-protocol session.
///
/// Accessors report the library's current view and return `None` while the
/// fact is not yet known (before spawn, for example).
pub trait GameClient: Send {
    fn username(&self) -> Option<String>;

    fn health(&self) -> Option<u8>;

    /// Position of the avatar's own entity.
    fn position(&self) -> Option<Position>;

    /// Dimension / world label, e.g. `"overworld"`.
    fn world(&self) -> Option<String>;

    /// Other players currently visible, with positions. Must not include
    /// the avatar itself.
    fn players(&self) -> Vec<PlayerSighting>;

    /// Sends a chat line. No acknowledgement is tracked.
    fn chat(&mut self, text: &str) -> Result<(), ClientError>;

    /// Closes the session. Must be safe to call more than once.
    fn quit(&mut self, reason: &str);
}

/// Builds [`GameClient`]s.
///
/// The session manager owns exactly one factory and calls `create` once per
/// connect attempt.
pub trait ClientFactory: Send + 'static {
    fn create(
        &mut self,
        options: &ClientOptions,
        link: ClientLink,
    ) -> Result<Box<dyn GameClient>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_address() {
        let opts = ClientOptions {
            host: "play.example.net".into(),
            port: 25565,
            version: None,
            auth_mode: AuthMode::Offline,
            username: "sentry".into(),
        };
        assert_eq!(opts.address(), "play.example.net:25565");
    }
}
