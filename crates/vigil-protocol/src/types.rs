//! Session facts: where the avatar is, how the link is doing, and what a
//! status query returns.
//!
//! These types are produced by the session manager and read by everything
//! above it. They are all serializable so a control client can receive them
//! verbatim in a status reply.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// World label reported while no session is live.
pub const UNKNOWN_WORLD: &str = "Unknown";

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A point in the game world, in blocks.
///
/// `Copy` on purpose: accessors hand out positions by value, so callers
/// can never hold a reference into the manager's state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// The world origin. Used as the "no position" value after a disconnect.
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Straight-line (Euclidean) distance to `other`, in blocks.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Another player the game client can currently see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSighting {
    /// The player's in-game name. Matched case-sensitively against the
    /// trust lists.
    pub name: String,
    /// Last known position of the player's entity.
    pub position: Position,
}

// ---------------------------------------------------------------------------
// AuthMode
// ---------------------------------------------------------------------------

/// How the game client authenticates against the server.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Online account, authorized through the device-code flow.
    #[default]
    Microsoft,
    /// Offline-mode server, no account needed.
    Offline,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "microsoft" | "msa" => Ok(Self::Microsoft),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown auth mode '{other}'")),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microsoft => write!(f, "microsoft"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of the game session.
///
/// The allowed moves between states:
///
/// ```text
/// Disconnected   → Connecting
/// Connecting     → Authenticating | Connected | Error | Disconnected
/// Authenticating → Connected | Error | Disconnected
/// Connected      → Disconnected | Error
/// Reconnecting   → Connecting | Disconnected
/// Error          → Reconnecting | Disconnected
/// ```
///
/// The graph only guards *operator-initiated* moves (a second connect while
/// one is in flight, for example). When the game client reports a fact such
/// as "the socket closed", the state machine is forced to follow reality
/// regardless of the graph.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionStatus {
    /// Every state, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Authenticating,
        Self::Connected,
        Self::Reconnecting,
        Self::Error,
    ];

    /// The states reachable from `self` through a guarded transition.
    pub fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Disconnected => &[Self::Connecting],
            Self::Connecting => &[
                Self::Authenticating,
                Self::Connected,
                Self::Error,
                Self::Disconnected,
            ],
            Self::Authenticating => {
                &[Self::Connected, Self::Error, Self::Disconnected]
            }
            Self::Connected => &[Self::Disconnected, Self::Error],
            Self::Reconnecting => &[Self::Connecting, Self::Disconnected],
            Self::Error => &[Self::Reconnecting, Self::Disconnected],
        }
    }

    /// Returns `true` if a guarded transition to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Returns `true` while a connect sequence is in flight or live.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Connected
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Error => write!(f, "Error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// A pending device-code authentication.
///
/// The human operator opens `url` (which already embeds the code) or visits
/// the bare link and types `code` by hand. Vigil never completes the flow
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub url: String,
    pub code: String,
}

/// Reconnect bookkeeping, as exposed to control clients.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub struct ReconnectInfo {
    /// Attempts made since the last successful login.
    pub attempts: u32,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
    /// Whether the operator still wants the session up.
    pub should_reconnect: bool,
}

/// Everything a `get_status` command returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub connected: bool,
    pub state: ConnectionStatus,
    pub username: Option<String>,
    pub world: String,
    pub position: Position,
    pub health: u8,
    pub reconnect: ReconnectInfo,
    pub auth_challenge: Option<AuthChallenge>,
    /// The most recent client construction or protocol error, if any.
    pub last_error: Option<String>,
}
