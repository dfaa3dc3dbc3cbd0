//! Runs Vigil against a simulated world, no game server needed.
//!
//! The avatar joins, walks away from spawn, and a stranger starts wandering
//! around it. Connect a control client to watch (or steer) the session:
//!
//! ```text
//! websocat ws://127.0.0.1:8787
//! {"op":"hello","token":"demo","name":"ops","version":1}
//! {"op":"command","id":1,"command":{"command":"get_status"}}
//! ```
//!
//! Any `VIGIL_*` variable overrides the demo defaults.

use std::time::Duration;

use vigil::prelude::*;
use vigil_sim::SimWorld;

const DEMO_DEFAULTS: [(&str, &str); 5] = [
    ("VIGIL_SERVER_HOST", "sim.local"),
    ("VIGIL_USERNAME", "sentry"),
    ("VIGIL_CONTROL_TOKEN", "demo"),
    ("VIGIL_AUTH_MODE", "offline"),
    ("VIGIL_TRUSTED_PLAYERS", "alice"),
];

const POST: Position = Position {
    x: 300.0,
    y: 64.0,
    z: 300.0,
};

fn demo_config(env: impl Fn(&str) -> Option<String>) -> Result<AppConfig, VigilError> {
    let config = AppConfig::from_lookup(|key| {
        env(key).or_else(|| {
            DEMO_DEFAULTS
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        })
    })?;
    Ok(config)
}

/// Scripts the world: once a client is in, walk to the post and bring in
/// two players; then keep the stranger moving.
async fn animate(world: SimWorld) {
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let mut staged = None;

    loop {
        ticker.tick().await;
        let Some(generation) = world.active_generation() else {
            continue;
        };

        if staged != Some(generation) {
            world.move_to(POST);
            world.add_player("alice", Position::new(POST.x + 5.0, POST.y, POST.z));
            world.add_player("stranger", Position::new(POST.x + 40.0, POST.y, POST.z + 25.0));
            staged = Some(generation);
            tracing::info!(generation, "simulated players staged");
            continue;
        }

        if let Some(at) = world.wander_player("stranger", 6.0) {
            tracing::debug!(x = at.x, z = at.z, "stranger wandered");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), VigilError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vigil=debug".into()),
        )
        .with_target(false)
        .init();

    let config = demo_config(|key| std::env::var(key).ok())?;

    let world = SimWorld::new();
    world.set_auto_join(true);

    let (session, actor) = spawn_session(
        config.session_manager(world.factory()),
        DEFAULT_CHANNEL_SIZE,
    );
    let server = VigilServerBuilder::from_config(config.control.clone())
        .build(session.clone())
        .await?;

    if let Ok(addr) = server.local_addr() {
        tracing::info!(%addr, "control surface up");
    }

    session.connect().await?;
    let animation = tokio::spawn(animate(world));

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await?;

    animation.abort();
    session.shutdown().await?;
    if let Err(e) = actor.await {
        tracing::error!(error = %e, "session actor panicked");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_config_fills_required_settings() {
        let config = demo_config(|_| None).unwrap();
        assert_eq!(config.control.token, "demo");
        assert_eq!(config.client.username, "sentry");
        assert!(config.trust.is_trusted("alice"));
    }

    #[test]
    fn test_demo_config_environment_wins() {
        let config = demo_config(|key| {
            (key == "VIGIL_CONTROL_TOKEN").then(|| "from-env".to_owned())
        })
        .unwrap();
        assert_eq!(config.control.token, "from-env");
    }
}
