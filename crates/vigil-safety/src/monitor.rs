use std::time::Duration;

use tokio::time::{self, Instant};
use vigil_protocol::{
    NearbyPlayer, PlayerSighting, Position, RecommendedAction, SafetyAlert,
    SafetyConfig,
};

use crate::TrustLists;

/// How often the periodic check re-runs while attached.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Untrusted players closer than this are threats, whatever the configured
/// proximity radius.
pub const THREAT_RADIUS: f64 = 20.0;

/// Health assumed on spawn when the client does not report one.
pub const DEFAULT_HEALTH: u8 = 20;

/// What the session knows about the avatar when a periodic check runs.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub health: Option<u8>,
    pub position: Option<Position>,
    pub players: Vec<PlayerSighting>,
}

/// Health and proximity threat detection for one session.
///
/// The monitor is a plain state machine: callers feed it facts together
/// with the current [`Instant`] and get alerts back. It only raises alerts
/// while attached *and* enabled.
pub struct SafetyMonitor {
    config: SafetyConfig,
    trust: TrustLists,
    attached: bool,
    last_health: u8,
    last_health_alert: Option<Instant>,
    last_proximity_alert: Option<Instant>,
    /// When the next periodic check is due. `None` while detached.
    next_check: Option<Instant>,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig, trust: TrustLists) -> Self {
        tracing::debug!(
            enabled = config.enabled,
            proximity_radius = config.proximity_radius,
            min_health = config.min_health,
            trusted = trust.trusted_count(),
            blocked = trust.blocked_count(),
            "safety monitor created"
        );
        Self {
            config,
            trust,
            attached: false,
            last_health: DEFAULT_HEALTH,
            last_health_alert: None,
            last_proximity_alert: None,
            next_check: None,
        }
    }

    /// Starts tracking a freshly spawned avatar and schedules the first
    /// periodic check.
    ///
    /// Attaching again starts over, cooldowns included; a live avatar only
    /// needs [`reseed_health`](Self::reseed_health).
    pub fn attach(&mut self, initial_health: u8) {
        self.attached = true;
        self.last_health = initial_health;
        self.last_health_alert = None;
        self.last_proximity_alert = None;
        self.next_check = Some(Instant::now() + CHECK_INTERVAL);
        tracing::debug!(health = initial_health, "safety monitor attached");
    }

    /// Stops the periodic check and forgets per-session state.
    ///
    /// Safe to call when not attached.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.last_health = DEFAULT_HEALTH;
        self.last_health_alert = None;
        self.last_proximity_alert = None;
        self.next_check = None;
        tracing::debug!("safety monitor detached");
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Resets the health baseline without raising anything, e.g. after a
    /// respawn.
    pub fn reseed_health(&mut self, health: u8) {
        self.last_health = health;
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled != enabled {
            self.config.enabled = enabled;
            tracing::debug!(enabled, "safety monitor toggled");
        }
    }

    /// Waits until the periodic check is due.
    ///
    /// Pends forever while detached, so it can sit in a `tokio::select!`
    /// next to other branches. Cancel-safe: nothing changes until the
    /// deadline passes.
    pub async fn wait_for_check(&mut self) {
        match self.next_check {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
        self.next_check = Some(Instant::now() + CHECK_INTERVAL);
        tracing::trace!("periodic safety check due");
    }

    /// Compares `current` against the last known health.
    ///
    /// May return a damage alert (`critical-health` or `damage-taken`) and a
    /// `low-health` alert from the same call; the two are independent.
    pub fn check_health(&mut self, current: u8, now: Instant) -> Vec<SafetyAlert> {
        if !self.attached {
            return Vec::new();
        }
        let previous = self.last_health;
        self.last_health = current;
        if !self.config.enabled {
            return Vec::new();
        }

        let mut alerts = Vec::new();

        if current < previous {
            let damage = previous - current;
            if current <= self.config.auto_disconnect_health {
                tracing::warn!(health = current, damage, "critical health");
                alerts.push(SafetyAlert::CriticalHealth {
                    health: current,
                    damage,
                    action: RecommendedAction::Disconnect,
                });
            } else {
                tracing::debug!(health = current, damage, "damage taken");
                alerts.push(SafetyAlert::DamageTaken {
                    health: current,
                    damage,
                    previous_health: previous,
                });
            }
        }

        let cooled_down = self.last_health_alert.is_none_or(|last| {
            now.saturating_duration_since(last) > self.config.alert_cooldown()
        });
        if current <= self.config.min_health && cooled_down {
            self.last_health_alert = Some(now);
            tracing::warn!(health = current, min = self.config.min_health, "low health");
            alerts.push(SafetyAlert::LowHealth { health: current });
        }

        alerts
    }

    /// Classifies the players around `own` and returns at most one alert.
    ///
    /// The whole check is gated by a single cooldown shared by all
    /// proximity alerts.
    pub fn check_proximity(
        &mut self,
        own: Option<Position>,
        players: &[PlayerSighting],
        now: Instant,
    ) -> Option<SafetyAlert> {
        if !self.attached || !self.config.enabled {
            return None;
        }
        let own = own?;
        if let Some(last) = self.last_proximity_alert {
            if now.saturating_duration_since(last) < self.config.alert_cooldown() {
                tracing::trace!("proximity check in cooldown");
                return None;
            }
        }

        let mut nearby: Vec<NearbyPlayer> = players
            .iter()
            .filter_map(|p| {
                let distance = own.distance_to(&p.position);
                (distance <= self.config.proximity_radius).then(|| NearbyPlayer {
                    name: p.name.clone(),
                    distance,
                    trusted: self.trust.is_trusted(&p.name),
                    blocked: self.trust.is_blocked(&p.name),
                })
            })
            .collect();
        if nearby.is_empty() {
            return None;
        }
        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let threats: Vec<NearbyPlayer> = nearby
            .iter()
            .filter(|p| !p.trusted && p.distance <= THREAT_RADIUS)
            .cloned()
            .collect();
        let radius = self.config.spawn_protection_radius;
        let in_spawn = own.x.abs() <= radius && own.z.abs() <= radius;

        let alert = if in_spawn && !threats.is_empty() {
            tracing::debug!(
                %own,
                threats = threats.len(),
                "players near spawn, treating as repopulation"
            );
            SafetyAlert::SpawnAreaPlayers {
                position: own,
                threats,
                nearby,
            }
        } else if self.config.auto_disconnect_on_threat && !threats.is_empty() {
            tracing::warn!(
                %own,
                closest = %threats[0].name,
                distance = threats[0].distance,
                "threat detected"
            );
            SafetyAlert::ThreatDetected {
                position: own,
                threats,
                nearby,
                action: RecommendedAction::Disconnect,
            }
        } else {
            tracing::debug!(%own, nearby = nearby.len(), "players nearby");
            SafetyAlert::PlayersNearby {
                position: own,
                nearby,
            }
        };

        self.last_proximity_alert = Some(now);
        Some(alert)
    }

    /// Re-runs both checks, as the periodic timer does.
    pub fn run_checks(
        &mut self,
        observation: &Observation,
        now: Instant,
    ) -> Vec<SafetyAlert> {
        let mut alerts = match observation.health {
            Some(health) => self.check_health(health, now),
            None => Vec::new(),
        };
        alerts.extend(self.check_proximity(
            observation.position,
            &observation.players,
            now,
        ));
        alerts
    }
}
