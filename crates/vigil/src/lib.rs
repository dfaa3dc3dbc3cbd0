//! # Vigil
//!
//! Supervisor that keeps one automated game-world session alive, reports
//! its status to control clients, and severs the session when the avatar is
//! in danger.
//!
//! The meta crate wires the layers together:
//!
//! ```text
//! control clients ⇄ VigilServer (transport + frames + rate limits)
//!                        ⇅ SessionHandle
//!                   session actor ⇄ SessionManager ⇄ GameClient
//!                        ⇣ SessionEvent
//!                   Notifier → owner / everyone / log
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vigil::prelude::*;
//!
//! # async fn start<F: ClientFactory>(factory: F) -> Result<(), VigilError> {
//! let config = AppConfig::from_env()?;
//! let (session, _actor) = spawn_session(config.session_manager(factory), DEFAULT_CHANNEL_SIZE);
//! let server = VigilServer::builder(config.control.token.clone())
//!     .bind(&config.control.bind)
//!     .build(session)
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod config;
mod error;
mod handler;
pub mod notifier;
pub mod rate_limit;
mod registry;
mod server;

pub use config::{AppConfig, ConfigError, ControlConfig};
pub use error::VigilError;
pub use handler::{CODE_BAD_REQUEST, CODE_RATE_LIMITED, CODE_UNAUTHORIZED, HELLO_TIMEOUT};
pub use notifier::{Delivery, Notifier};
pub use rate_limit::RateLimiter;
pub use registry::ControlClients;
pub use server::{VigilServer, VigilServerBuilder};

/// Everything a binary usually needs.
pub mod prelude {
    pub use crate::{AppConfig, ControlConfig, VigilError, VigilServer, VigilServerBuilder};
    pub use vigil_client::{ClientFactory, ClientOptions, GameClient};
    pub use vigil_protocol::{
        ConnectionStatus, ControlCommand, ControlReply, Position, SafetyAlert, SafetyConfig,
        SessionEvent, StatusSnapshot,
    };
    pub use vigil_session::{
        DEFAULT_CHANNEL_SIZE, ReconnectPolicy, SessionHandle, SessionManager, spawn_session,
    };
}
