//! `VigilServer` builder and accept loop.
//!
//! The control server ties the layers together: transport → control
//! frames → session handle, with the notifier routing safety alerts back
//! out to control clients.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use vigil_protocol::JsonCodec;
use vigil_session::SessionHandle;
use vigil_transport::{Connection, Transport, WebSocketTransport};

use crate::VigilError;
use crate::config::ControlConfig;
use crate::handler::handle_connection;
use crate::notifier::Notifier;
use crate::rate_limit::RateLimiter;
use crate::registry::ControlClients;

/// Shared state handed to every connection task.
pub(crate) struct ServerState {
    pub(crate) session: SessionHandle,
    pub(crate) clients: Arc<ControlClients>,
    pub(crate) token: String,
    pub(crate) codec: JsonCodec,
    pub(crate) command_burst: u32,
    pub(crate) command_rate: f64,
}

/// Builder for the control server.
///
/// # Example
///
/// ```rust,ignore
/// let server = VigilServer::builder("s3cret")
///     .bind("127.0.0.1:8787")
///     .owner("ops")
///     .build(session)
///     .await?;
/// server.run().await
/// ```
pub struct VigilServerBuilder {
    control: ControlConfig,
}

impl VigilServerBuilder {
    /// Default limits, listening on the default control address.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            control: ControlConfig::new(token),
        }
    }

    pub fn from_config(control: ControlConfig) -> Self {
        Self { control }
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.control.bind = addr.to_owned();
        self
    }

    /// Control-client name that receives safety alerts directly.
    pub fn owner(mut self, name: impl Into<String>) -> Self {
        self.control.owner = Some(name.into());
        self
    }

    /// Per-connection command bucket.
    pub fn command_limit(mut self, burst: u32, per_sec: f64) -> Self {
        self.control.command_burst = burst;
        self.control.command_rate = per_sec;
        self
    }

    /// Server-wide connection admission bucket.
    pub fn accept_limit(mut self, burst: u32, per_sec: f64) -> Self {
        self.control.accept_burst = burst;
        self.control.accept_rate = per_sec;
        self
    }

    /// Binds the listener and starts the alert notifier.
    pub async fn build(self, session: SessionHandle) -> Result<VigilServer, VigilError> {
        let transport = WebSocketTransport::bind(&self.control.bind).await?;
        let clients = Arc::new(ControlClients::new());

        let notifier = Notifier::new(Arc::clone(&clients), self.control.owner.clone())
            .spawn(session.subscribe());

        let state = Arc::new(ServerState {
            session,
            clients,
            token: self.control.token,
            codec: JsonCodec,
            command_burst: self.control.command_burst,
            command_rate: self.control.command_rate,
        });

        Ok(VigilServer {
            transport,
            state,
            admission: RateLimiter::new(self.control.accept_burst, self.control.accept_rate),
            notifier,
        })
    }
}

/// A bound control server.
///
/// Call [`run()`](Self::run) to start accepting control clients.
pub struct VigilServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    admission: RateLimiter,
    notifier: JoinHandle<()>,
}

impl VigilServer {
    pub fn builder(token: impl Into<String>) -> VigilServerBuilder {
        VigilServerBuilder::new(token)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop forever.
    pub async fn run(self) -> Result<(), VigilError> {
        self.run_until(future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// Connections over the admission budget are closed right after the
    /// WebSocket handshake. Connection tasks already running are left to
    /// finish on their own.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), VigilError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("control server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => self.admit(conn).await,
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }

        self.notifier.abort();
        self.transport.shutdown().await?;
        tracing::info!("control server stopped");
        Ok(())
    }

    async fn admit(&mut self, conn: <WebSocketTransport as Transport>::Connection) {
        let conn_id = conn.id();
        if !self.admission.try_consume(1) {
            tracing::warn!(%conn_id, peer = ?conn.peer_addr(), "connection refused: accept rate exceeded");
            if let Err(e) = conn.close().await {
                tracing::debug!(%conn_id, error = %e, "close after refusal failed");
            }
            return;
        }

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(conn, state).await {
                tracing::debug!(%conn_id, error = %e, "control connection ended with error");
            }
        });
    }
}
