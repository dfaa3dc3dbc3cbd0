//! Startup configuration.
//!
//! Everything Vigil needs is read once, from `VIGIL_*` environment
//! variables, into an [`AppConfig`] value that is then handed to the
//! constructors that need it. There is no global accessor.

use std::str::FromStr;
use std::time::Duration;

use vigil_client::{ClientFactory, ClientOptions};
use vigil_protocol::{AuthMode, SafetyConfig};
use vigil_safety::{TrustError, TrustLists};
use vigil_session::{ReconnectPolicy, SessionManager};

pub const DEFAULT_SERVER_PORT: u16 = 25565;
pub const DEFAULT_CONTROL_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_COMMAND_BURST: u32 = 5;
pub const DEFAULT_COMMAND_RATE: f64 = 1.0;
pub const DEFAULT_ACCEPT_BURST: u32 = 20;
pub const DEFAULT_ACCEPT_RATE: f64 = 2.0;

/// Fatal configuration problems, reported before anything starts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// Every required key that is unset or blank, in declaration order.
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("player '{0}' is listed as both trusted and blocked")]
    Overlap(String),
}

impl From<TrustError> for ConfigError {
    fn from(err: TrustError) -> Self {
        match err {
            TrustError::Overlap(name) => Self::Overlap(name),
        }
    }
}

/// Settings for the control surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    /// Address the control server listens on.
    pub bind: String,
    /// Shared secret every control client must present in `hello`.
    pub token: String,
    /// Control-client name that receives safety alerts directly.
    pub owner: Option<String>,
    pub command_burst: u32,
    pub command_rate: f64,
    pub accept_burst: u32,
    pub accept_rate: f64,
}

impl ControlConfig {
    /// Defaults for everything but the token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bind: DEFAULT_CONTROL_BIND.to_owned(),
            token: token.into(),
            owner: None,
            command_burst: DEFAULT_COMMAND_BURST,
            command_rate: DEFAULT_COMMAND_RATE,
            accept_burst: DEFAULT_ACCEPT_BURST,
            accept_rate: DEFAULT_ACCEPT_RATE,
        }
    }
}

/// The whole startup configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client: ClientOptions,
    pub control: ControlConfig,
    pub safety: SafetyConfig,
    pub reconnect: ReconnectPolicy,
    pub trust: TrustLists,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a key to its
    /// raw value. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let host = env.get("VIGIL_SERVER_HOST");
        let username = env.get("VIGIL_USERNAME");
        let token = env.get("VIGIL_CONTROL_TOKEN");
        let (host, username, token) = match (host, username, token) {
            (Some(h), Some(u), Some(t)) => (h, u, t),
            (h, u, t) => {
                let missing = [
                    ("VIGIL_SERVER_HOST", h.is_none()),
                    ("VIGIL_USERNAME", u.is_none()),
                    ("VIGIL_CONTROL_TOKEN", t.is_none()),
                ]
                .into_iter()
                .filter_map(|(key, absent)| absent.then_some(key))
                .collect();
                return Err(ConfigError::Missing(missing));
            }
        };

        let client = ClientOptions {
            host,
            port: env.parse_or("VIGIL_SERVER_PORT", DEFAULT_SERVER_PORT)?,
            version: env.get("VIGIL_SERVER_VERSION"),
            auth_mode: env.parse_or("VIGIL_AUTH_MODE", AuthMode::default())?,
            username,
        };

        let control = ControlConfig {
            bind: env
                .get("VIGIL_CONTROL_BIND")
                .unwrap_or_else(|| DEFAULT_CONTROL_BIND.to_owned()),
            token,
            owner: env.get("VIGIL_OWNER"),
            command_burst: env.parse_or("VIGIL_COMMAND_BURST", DEFAULT_COMMAND_BURST)?,
            command_rate: env.rate_or("VIGIL_COMMAND_RATE", DEFAULT_COMMAND_RATE)?,
            accept_burst: env.parse_or("VIGIL_ACCEPT_BURST", DEFAULT_ACCEPT_BURST)?,
            accept_rate: env.rate_or("VIGIL_ACCEPT_RATE", DEFAULT_ACCEPT_RATE)?,
        };

        let defaults = SafetyConfig::default();
        let safety = SafetyConfig {
            enabled: env.flag_or("VIGIL_SAFETY_ENABLED", defaults.enabled)?,
            proximity_radius: env
                .distance_or("VIGIL_PROXIMITY_RADIUS", defaults.proximity_radius)?,
            min_health: env.parse_or("VIGIL_MIN_HEALTH", defaults.min_health)?,
            alert_cooldown_ms: env
                .parse_or("VIGIL_ALERT_COOLDOWN_MS", defaults.alert_cooldown_ms)?,
            auto_disconnect_on_threat: env.flag_or(
                "VIGIL_AUTO_DISCONNECT_ON_THREAT",
                defaults.auto_disconnect_on_threat,
            )?,
            auto_disconnect_health: env.parse_or(
                "VIGIL_AUTO_DISCONNECT_HEALTH",
                defaults.auto_disconnect_health,
            )?,
            spawn_protection_radius: env.distance_or(
                "VIGIL_SPAWN_PROTECTION_RADIUS",
                defaults.spawn_protection_radius,
            )?,
        };

        let policy = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            max_attempts: env
                .parse_or("VIGIL_RECONNECT_MAX_ATTEMPTS", policy.max_attempts)?,
            base_delay: env.millis_or("VIGIL_RECONNECT_BASE_DELAY_MS", policy.base_delay)?,
            max_delay: env.millis_or("VIGIL_RECONNECT_MAX_DELAY_MS", policy.max_delay)?,
            multiplier: env.rate_or("VIGIL_RECONNECT_MULTIPLIER", policy.multiplier)?,
        };

        let trust = TrustLists::from_csv(
            &env.get("VIGIL_TRUSTED_PLAYERS").unwrap_or_default(),
            &env.get("VIGIL_BLOCKED_PLAYERS").unwrap_or_default(),
        )?;

        Ok(Self {
            client,
            control,
            safety,
            reconnect,
            trust,
        })
    }

    /// Builds a session manager wired with this configuration.
    pub fn session_manager<F: ClientFactory>(&self, factory: F) -> SessionManager {
        SessionManager::new(factory, self.client.clone())
            .with_policy(self.reconnect.clone())
            .with_safety(self.safety.clone(), self.trust.clone())
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }

    fn flag_or(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value }),
            },
        }
    }

    /// Non-negative, finite float.
    fn distance_or(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let parsed: f64 = self.parse_or(key, default)?;
        if parsed.is_finite() && parsed >= 0.0 {
            Ok(parsed)
        } else {
            Err(self.invalid(key))
        }
    }

    /// Strictly positive, finite float.
    fn rate_or(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let parsed: f64 = self.parse_or(key, default)?;
        if parsed.is_finite() && parsed > 0.0 {
            Ok(parsed)
        } else {
            Err(self.invalid(key))
        }
    }

    fn millis_or(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse_or(key, default_ms).map(Duration::from_millis)
    }

    fn invalid(&self, key: &'static str) -> ConfigError {
        ConfigError::Invalid {
            key,
            value: self.get(key).unwrap_or_default(),
        }
    }
}
