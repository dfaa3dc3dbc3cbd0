//! Per-connection handler: handshake, then commands in and events out.
//!
//! Each accepted control connection gets its own Tokio task running this
//! handler. The flow is:
//!   1. Receive `hello` → validate version and token
//!   2. Send `welcome` with the current status
//!   3. Loop: answer commands, push session events and queued alerts

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use vigil_protocol::{
    CONTROL_PROTOCOL_VERSION, ClientFrame, Codec, ControlCommand, ControlReply, JsonCodec,
    ProtocolError, ServerFrame, SessionEvent,
};
use vigil_session::SessionHandle;
use vigil_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::VigilError;
use crate::rate_limit::RateLimiter;
use crate::registry::ControlClients;
use crate::server::ServerState;

/// How long a new connection has to send its `hello`.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

pub const CODE_BAD_REQUEST: u16 = 400;
pub const CODE_UNAUTHORIZED: u16 = 401;
pub const CODE_RATE_LIMITED: u16 = 429;

/// Drop guard that removes a control client from the registry when its
/// handler exits, panics included.
struct RegistrationGuard {
    id: ConnectionId,
    clients: Arc<ControlClients>,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let id = self.id;
        let clients = Arc::clone(&self.clients);
        tokio::spawn(async move {
            clients.unregister(id).await;
        });
    }
}

/// Handles a single control connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), VigilError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling control connection");

    // Subscribe before the welcome snapshot so no event falls in between.
    let mut events = state.session.subscribe();

    let name = perform_handshake(&conn, &state).await?;
    tracing::info!(%conn_id, client = %name, "control client connected");

    let mut outbound = state.clients.register(conn_id, &name).await;
    let _guard = RegistrationGuard {
        id: conn_id,
        clients: Arc::clone(&state.clients),
    };

    let mut limiter = RateLimiter::new(state.command_burst, state.command_rate);

    loop {
        tokio::select! {
            incoming = conn.recv() => match incoming {
                Ok(Some(data)) => {
                    handle_frame(&conn, &state, &name, &mut limiter, &data).await?;
                }
                Ok(None) => {
                    tracing::info!(%conn_id, client = %name, "control client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    break;
                }
            },
            event = events.recv() => match event {
                // Alerts reach clients through the notifier.
                Ok(SessionEvent::SafetyAlert { .. }) => {}
                Ok(event) => {
                    send_frame(&conn, &state.codec, &ServerFrame::Event { event }).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%conn_id, skipped, "control client lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(%conn_id, "session stopped; closing control connection");
                    break;
                }
            },
            Some(frame) = outbound.recv() => {
                send_frame(&conn, &state.codec, &frame).await?;
            }
        }
    }

    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }
    Ok(())
}

/// Receives `hello`, checks it, and answers with `welcome`. Returns the
/// client's name.
async fn perform_handshake(
    conn: &WebSocketConnection,
    state: &ServerState,
) -> Result<String, VigilError> {
    let data = match tokio::time::timeout(HELLO_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(invalid("connection closed before hello"));
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            send_error(conn, &state.codec, CODE_BAD_REQUEST, "hello timed out").await?;
            return Err(invalid("hello timed out"));
        }
    };

    let (token, name, version) = match state.codec.decode::<ClientFrame>(&data) {
        Ok(ClientFrame::Hello {
            token,
            name,
            version,
        }) => (token, name, version),
        Ok(ClientFrame::Command { .. }) | Err(_) => {
            send_error(conn, &state.codec, CODE_BAD_REQUEST, "expected hello").await?;
            return Err(invalid("first frame must be hello"));
        }
    };

    if version != CONTROL_PROTOCOL_VERSION {
        let message =
            format!("version mismatch: expected {CONTROL_PROTOCOL_VERSION}, got {version}");
        send_error(conn, &state.codec, CODE_BAD_REQUEST, &message).await?;
        return Err(invalid("control protocol version mismatch"));
    }

    if token != state.token {
        tracing::warn!(conn_id = %conn.id(), client = %name, "control client rejected: bad token");
        send_error(conn, &state.codec, CODE_UNAUTHORIZED, "unauthorized").await?;
        return Err(invalid("bad control token"));
    }

    let status = state.session.status().await?;
    let welcome = ServerFrame::Welcome {
        version: CONTROL_PROTOCOL_VERSION,
        status,
    };
    send_frame(conn, &state.codec, &welcome).await?;

    Ok(name)
}

/// Handles one frame after the handshake.
async fn handle_frame(
    conn: &WebSocketConnection,
    state: &ServerState,
    client: &str,
    limiter: &mut RateLimiter,
    data: &[u8],
) -> Result<(), VigilError> {
    let frame: ClientFrame = match state.codec.decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            let message = format!("invalid frame: {e}");
            return send_error(conn, &state.codec, CODE_BAD_REQUEST, &message).await;
        }
    };

    match frame {
        ClientFrame::Hello { .. } => {
            send_error(conn, &state.codec, CODE_BAD_REQUEST, "already greeted").await
        }
        ClientFrame::Command { id, command } => {
            if !limiter.try_consume(1) {
                let retry_ms = limiter.wait_time(1).map_or(0, |d| d.as_millis());
                tracing::debug!(conn_id = %conn.id(), client, id, "command rate limited");
                let message = format!("rate limited; retry in {retry_ms} ms");
                return send_error(conn, &state.codec, CODE_RATE_LIMITED, &message).await;
            }

            let reply = dispatch(&state.session, client, command).await;
            send_frame(conn, &state.codec, &ServerFrame::Reply { id, reply }).await
        }
    }
}

/// Runs one command against the session.
async fn dispatch(session: &SessionHandle, client: &str, command: ControlCommand) -> ControlReply {
    tracing::debug!(client, ?command, "control command");

    let result = match command {
        ControlCommand::Connect => {
            tracing::info!(client, "connect requested");
            session.connect().await.map(|()| ControlReply::Ack)
        }
        ControlCommand::Disconnect { reason } => {
            let reason = reason.unwrap_or_else(|| format!("requested by {client}"));
            tracing::info!(client, %reason, "disconnect requested");
            session.disconnect(reason).await.map(|()| ControlReply::Ack)
        }
        ControlCommand::SendMessage { text } => {
            session.send_message(text).await.map(|()| ControlReply::Ack)
        }
        ControlCommand::GetStatus => session
            .status()
            .await
            .map(|status| ControlReply::Status { status }),
        ControlCommand::SetSafetyEnabled { enabled } => {
            tracing::info!(client, enabled, "safety toggled");
            session
                .set_safety_enabled(enabled)
                .await
                .map(|()| ControlReply::Ack)
        }
        ControlCommand::GetSafetyConfig => session
            .safety_config()
            .await
            .map(|config| ControlReply::SafetyConfig { config }),
    };

    result.unwrap_or_else(|e| ControlReply::Rejected {
        reason: e.to_string(),
    })
}

async fn send_frame(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    frame: &ServerFrame,
) -> Result<(), VigilError> {
    let text = codec.encode_text(frame)?;
    conn.send_text(&text).await?;
    Ok(())
}

async fn send_error(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    code: u16,
    message: &str,
) -> Result<(), VigilError> {
    let frame = ServerFrame::Error {
        code,
        message: message.to_owned(),
    };
    send_frame(conn, codec, &frame).await
}

fn invalid(message: &str) -> VigilError {
    VigilError::Protocol(ProtocolError::InvalidMessage(message.to_owned()))
}
