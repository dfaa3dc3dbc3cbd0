//! The session actor: commands through a `SessionHandle`, interleaved with
//! client events on the actor's task.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;
use vigil_client::ClientOptions;
use vigil_protocol::{AuthMode, ConnectionStatus, Position, SessionEvent};
use vigil_session::{SessionError, SessionHandle, SessionManager, spawn_session};
use vigil_sim::SimWorld;

fn spawn(world: &SimWorld) -> (SessionHandle, tokio::task::JoinHandle<()>) {
    let options = ClientOptions {
        host: "localhost".into(),
        port: 25565,
        version: None,
        auth_mode: AuthMode::Offline,
        username: "sentry".into(),
    };
    let manager = SessionManager::new(world.factory(), options)
        .with_diagnostics(|| Box::new(std::io::sink()));
    spawn_session(manager, 8)
}

/// Waits (at most a virtual minute) for the first event matching `pred`.
async fn wait_for(
    rx: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    time::timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test(start_paused = true)]
async fn test_handle_connect_and_chat() {
    let world = SimWorld::new();
    let (handle, _task) = spawn(&world);
    let mut rx = handle.subscribe();

    handle.connect().await.unwrap();
    world.login();
    wait_for(&mut rx, |e| matches!(e, SessionEvent::Connected { .. })).await;

    let status = handle.status().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.state, ConnectionStatus::Connected);

    handle.send_message("on watch").await.unwrap();
    assert_eq!(world.chat_log(), vec!["on watch".to_owned()]);

    assert!(matches!(
        handle.connect().await,
        Err(SessionError::AlreadyActive(ConnectionStatus::Connected))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_handle_disconnect_cancels_pending_reconnect() {
    let world = SimWorld::new();
    let (handle, _task) = spawn(&world);
    let mut rx = handle.subscribe();

    handle.connect().await.unwrap();
    world.login();
    wait_for(&mut rx, |e| matches!(e, SessionEvent::Connected { .. })).await;

    world.end("server restart");
    wait_for(&mut rx, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;

    handle.disconnect("operator").await.unwrap();
    time::sleep(Duration::from_secs(120)).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionStatus::Disconnected);
    assert!(!status.reconnect.should_reconnect);
    assert_eq!(world.clients_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_safety_toggle() {
    let world = SimWorld::new();
    let (handle, _task) = spawn(&world);
    let mut rx = handle.subscribe();

    assert!(handle.safety_config().await.unwrap().enabled);
    handle.set_safety_enabled(false).await.unwrap();
    assert!(!handle.safety_config().await.unwrap().enabled);

    handle.connect().await.unwrap();
    world.login();
    world.spawn("overworld", Position::new(500.0, 64.0, 500.0), 20);
    world.set_health(1);
    // Client events are handled in order, so the health change is applied
    // by the time this message comes through.
    world.chat_from("alice", "still there?");
    wait_for(&mut rx, |e| matches!(e, SessionEvent::ChatMessage { .. })).await;

    let status = handle.status().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.health, 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_unavailable_after_shutdown() {
    let world = SimWorld::new();
    let (handle, task) = spawn(&world);

    handle.connect().await.unwrap();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(matches!(handle.status().await, Err(SessionError::Unavailable)));
    assert_eq!(world.quits(), vec!["session shutting down".to_owned()]);
}
