//! Game-session lifecycle for Vigil.
//!
//! This crate keeps one automated game session alive:
//!
//! 1. **State machine**: [`ConnectionState`] guards operator-initiated
//!    moves and records every transition.
//! 2. **Session manager**: [`SessionManager`] owns the game client, reacts
//!    to its events, reconnects with exponential backoff
//!    ([`ReconnectPolicy`]), and wires in the safety monitor.
//! 3. **Auth capture**: [`AuthCapture`] scrapes device-code prompts out of
//!    the client's diagnostic output.
//! 4. **Actor**: [`spawn_session`] runs the manager on a task behind a
//!    cloneable [`SessionHandle`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Control surface (above)  ← sends commands, subscribes to SessionEvents
//!     ↕
//! Session layer (this crate)  ← lifecycle, reconnects, safety side effects
//!     ↕
//! GameClient (below)  ← speaks the game protocol, reports ClientEvents
//! ```

mod actor;
mod auth_capture;
mod error;
mod manager;
mod policy;
mod state;

pub use actor::{SessionHandle, spawn_session};
pub use auth_capture::{AuthCapture, CapturedChallenge, MAX_PENDING_LINE, parse_challenge};
pub use error::SessionError;
pub use manager::{EVENT_CHANNEL_CAPACITY, SessionInput, SessionManager};
pub use policy::ReconnectPolicy;
pub use state::{
    ConnectionState, HISTORY_CAPACITY, ListenerId, Transition, TransitionMeta,
};

/// Command queue size used by [`spawn_session`] callers that have no better
/// idea.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;
