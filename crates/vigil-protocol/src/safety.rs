//! Safety thresholds and the alerts raised when they are crossed.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Position;

// ---------------------------------------------------------------------------
// SafetyConfig
// ---------------------------------------------------------------------------

/// Thresholds for the safety monitor.
///
/// Loaded once at startup. Only `enabled` may change at runtime (through the
/// `set_safety_enabled` control command); every other field is fixed for the
/// life of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Master switch. When `false` the monitor raises nothing.
    pub enabled: bool,
    /// Players farther away than this (in blocks) are ignored.
    pub proximity_radius: f64,
    /// Health at or below which a `low-health` alert fires.
    pub min_health: u8,
    /// Minimum time between two alerts of a throttled kind.
    pub alert_cooldown_ms: u64,
    /// Whether an untrusted player inside the threat radius should sever
    /// the session.
    pub auto_disconnect_on_threat: bool,
    /// Health at or below which damage becomes `critical-health`.
    pub auto_disconnect_health: u8,
    /// Half-width of the square around the world origin treated as spawn.
    pub spawn_protection_radius: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            proximity_radius: 50.0,
            min_health: 10,
            alert_cooldown_ms: 30_000,
            auto_disconnect_on_threat: true,
            auto_disconnect_health: 6,
            spawn_protection_radius: 100.0,
        }
    }
}

impl SafetyConfig {
    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.alert_cooldown_ms)
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// What the monitor suggests doing about an alert.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    /// Informational only.
    #[default]
    None,
    /// Sever the session now.
    Disconnect,
}

/// A player inside the proximity radius, as classified by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlayer {
    pub name: String,
    /// Distance from the avatar, in blocks.
    pub distance: f64,
    pub trusted: bool,
    pub blocked: bool,
}

/// An alert raised by the safety monitor.
///
/// Each variant carries exactly what a control surface needs to render it.
/// The serialized form is tagged with a kebab-case `kind`, e.g.
/// `{"kind": "critical-health", "health": 5, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SafetyAlert {
    /// Took damage and health is at or below the auto-disconnect threshold.
    CriticalHealth {
        health: u8,
        damage: u8,
        action: RecommendedAction,
    },
    /// An untrusted player is inside the threat radius, outside spawn.
    ThreatDetected {
        position: Position,
        threats: Vec<NearbyPlayer>,
        nearby: Vec<NearbyPlayer>,
        action: RecommendedAction,
    },
    /// Took damage but health is still above the critical threshold.
    DamageTaken {
        health: u8,
        damage: u8,
        previous_health: u8,
    },
    /// Health is at or below the configured minimum.
    LowHealth { health: u8 },
    /// Players are around but none warrants action.
    PlayersNearby {
        position: Position,
        nearby: Vec<NearbyPlayer>,
    },
    /// Untrusted players close by while the avatar stands in spawn.
    /// Treated as a server-restart repopulation, never as an incursion.
    SpawnAreaPlayers {
        position: Position,
        threats: Vec<NearbyPlayer>,
        nearby: Vec<NearbyPlayer>,
    },
}

/// Discriminant of a [`SafetyAlert`], handy for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    CriticalHealth,
    ThreatDetected,
    DamageTaken,
    LowHealth,
    PlayersNearby,
    SpawnAreaPlayers,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CriticalHealth => "critical-health",
            Self::ThreatDetected => "threat-detected",
            Self::DamageTaken => "damage-taken",
            Self::LowHealth => "low-health",
            Self::PlayersNearby => "players-nearby",
            Self::SpawnAreaPlayers => "spawn-area-players",
        };
        f.write_str(name)
    }
}

impl SafetyAlert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Self::CriticalHealth { .. } => AlertKind::CriticalHealth,
            Self::ThreatDetected { .. } => AlertKind::ThreatDetected,
            Self::DamageTaken { .. } => AlertKind::DamageTaken,
            Self::LowHealth { .. } => AlertKind::LowHealth,
            Self::PlayersNearby { .. } => AlertKind::PlayersNearby,
            Self::SpawnAreaPlayers { .. } => AlertKind::SpawnAreaPlayers,
        }
    }

    pub fn recommended_action(&self) -> RecommendedAction {
        match self {
            Self::CriticalHealth { action, .. }
            | Self::ThreatDetected { action, .. } => *action,
            _ => RecommendedAction::None,
        }
    }

    /// Returns `true` if the session should be severed in response.
    pub fn recommends_disconnect(&self) -> bool {
        self.recommended_action() == RecommendedAction::Disconnect
    }
}
