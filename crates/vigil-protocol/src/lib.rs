//! Shared data model for Vigil.
//!
//! Every layer of the supervisor speaks in the types defined here:
//!
//! - **Session facts** ([`Position`], [`ConnectionStatus`], [`AuthChallenge`],
//!   [`StatusSnapshot`]): what the session manager knows about the avatar.
//! - **Safety** ([`SafetyConfig`], [`SafetyAlert`]): thresholds and the
//!   alerts the safety monitor raises.
//! - **Control** ([`ControlCommand`], [`ControlReply`], [`SessionEvent`],
//!   [`ClientFrame`], [`ServerFrame`]): what control clients send and
//!   receive.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how control frames are
//!   turned into bytes.
//!
//! # Architecture
//!
//! The protocol crate has no runtime behavior. It sits underneath the
//! session and safety layers so they can share one vocabulary, and it is
//! the only thing control clients need to depend on.
//!
//! ```text
//! Control client ⇄ (ServerFrame / ClientFrame) ⇄ Vigil ⇄ GameClient
//! ```

mod codec;
mod control;
mod error;
mod safety;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use control::{
    ClientFrame, ControlCommand, ControlReply, ServerFrame, SessionEvent,
};
pub use error::ProtocolError;
pub use safety::{
    AlertKind, NearbyPlayer, RecommendedAction, SafetyAlert, SafetyConfig,
};
pub use types::{
    AuthChallenge, AuthMode, ConnectionStatus, PlayerSighting, Position,
    ReconnectInfo, StatusSnapshot, UNKNOWN_WORLD,
};

/// Version of the control-surface frame format. Control clients must send
/// this in their `hello` frame or be rejected.
pub const CONTROL_PROTOCOL_VERSION: u32 = 1;
