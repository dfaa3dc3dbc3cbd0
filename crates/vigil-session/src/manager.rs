//! The game-session lifecycle.
//!
//! [`SessionManager`] owns everything about the one session Vigil keeps
//! alive: the game client, the [`ConnectionState`] machine, the reconnect
//! timer, the [`SafetyMonitor`], and the facts the client has reported
//! (world, position, health, pending authentication).
//!
//! # Driving it
//!
//! The manager never spawns tasks. Operator commands are plain `&mut self`
//! methods, and everything asynchronous (client events, captured auth
//! prompts, the reconnect timer, the periodic safety check) comes in through
//! [`SessionManager::next_input`]:
//!
//! ```ignore
//! loop {
//!     let input = manager.next_input().await;
//!     manager.handle_input(input);
//! }
//! ```
//!
//! [`spawn_session`](crate::spawn_session) runs exactly that loop on a task
//! and interleaves operator commands with it.
//!
//! # Generations
//!
//! Every client the manager creates gets a fresh generation number, and the
//! number is bumped again when the client is closed. Events and auth
//! prompts carry the generation they were produced under; anything older
//! than the current generation is dropped, so a client that keeps talking
//! after `quit()` cannot disturb its successor.

use std::io::{self, Write};
use std::pin::Pin;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant, Sleep};
use vigil_client::{
    ClientEvent, ClientEventSender, ClientFactory, ClientLink, ClientOptions,
    GameClient, TaggedEvent,
};
use vigil_protocol::{
    AuthChallenge, ConnectionStatus, PlayerSighting, Position, ReconnectInfo,
    SafetyAlert, SafetyConfig, SessionEvent, StatusSnapshot, UNKNOWN_WORLD,
};
use vigil_safety::{DEFAULT_HEALTH, Observation, SafetyMonitor, TrustLists};

use crate::auth_capture::{AuthCapture, CapturedChallenge};
use crate::state::{ConnectionState, ListenerId, Transition, TransitionMeta};
use crate::{ReconnectPolicy, SessionError};

/// Capacity of the session event broadcast channel. Slow subscribers that
/// fall further behind than this see `RecvError::Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

type SinkFactory = Box<dyn FnMut() -> Box<dyn Write + Send> + Send>;

/// Something the manager has to react to.
#[derive(Debug)]
pub enum SessionInput {
    /// An event from a game client.
    Client(TaggedEvent),
    /// A device-code prompt scraped from a client's diagnostics.
    AuthPrompt(CapturedChallenge),
    /// The scheduled reconnect delay has elapsed.
    ReconnectDue,
    /// The periodic safety check is due.
    SafetyCheck,
}

pub struct SessionManager {
    options: ClientOptions,
    policy: ReconnectPolicy,
    factory: Box<dyn ClientFactory>,
    make_sink: SinkFactory,

    state: ConnectionState,
    monitor: SafetyMonitor,
    client: Option<Box<dyn GameClient>>,
    generation: u64,

    client_tx: mpsc::UnboundedSender<TaggedEvent>,
    client_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    auth_tx: mpsc::UnboundedSender<CapturedChallenge>,
    auth_rx: mpsc::UnboundedReceiver<CapturedChallenge>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,

    reconnect_attempts: u32,
    should_reconnect: bool,
    username: Option<String>,
    world: String,
    position: Position,
    health: u8,
    auth_challenge: Option<AuthChallenge>,
    last_error: Option<String>,

    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Creates a disconnected manager with the default reconnect policy,
    /// default safety thresholds, empty trust lists, and client diagnostics
    /// going to stderr.
    pub fn new<F: ClientFactory>(factory: F, options: ClientOptions) -> Self {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut state = ConnectionState::new();
        let state_events = events.clone();
        state.subscribe(move |t: &Transition| {
            let _ = state_events.send(SessionEvent::StateChange {
                from: t.from,
                to: t.to,
                reason: t.meta.reason.clone(),
                forced: t.meta.forced,
            });
        });

        Self {
            options,
            policy: ReconnectPolicy::default(),
            factory: Box::new(factory),
            make_sink: Box::new(|| -> Box<dyn Write + Send> { Box::new(io::stderr()) }),
            state,
            monitor: SafetyMonitor::new(
                SafetyConfig::default(),
                TrustLists::default(),
            ),
            client: None,
            generation: 0,
            client_tx,
            client_rx,
            auth_tx,
            auth_rx,
            reconnect_timer: None,
            reconnect_attempts: 0,
            should_reconnect: false,
            username: None,
            world: UNKNOWN_WORLD.to_owned(),
            position: Position::ORIGIN,
            health: DEFAULT_HEALTH,
            auth_challenge: None,
            last_error: None,
            events,
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_safety(mut self, config: SafetyConfig, trust: TrustLists) -> Self {
        self.monitor = SafetyMonitor::new(config, trust);
        self
    }

    /// Sets where client diagnostics end up. Called once per client
    /// construction; the returned writer is wrapped in an [`AuthCapture`].
    pub fn with_diagnostics<F>(mut self, make_sink: F) -> Self
    where
        F: FnMut() -> Box<dyn Write + Send> + Send + 'static,
    {
        self.make_sink = Box::new(make_sink);
        self
    }

    // -----------------------------------------------------------------------
    // Operator commands
    // -----------------------------------------------------------------------

    /// Starts a connect sequence.
    ///
    /// Returns as soon as the client is constructed; login and spawn are
    /// reported later as events. Rejected with
    /// [`SessionError::AlreadyActive`] when the state machine does not allow
    /// a move to `Connecting` (already connected, connect in flight, ...).
    ///
    /// A client construction failure is not an error for the caller: it is
    /// recorded in `last_error` and handed to the reconnect policy.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        let status = self.state.current();
        if !status.can_transition_to(ConnectionStatus::Connecting) {
            return Err(SessionError::AlreadyActive(status));
        }
        if !self.should_reconnect {
            // A fresh intent gets a fresh attempt budget.
            self.reconnect_attempts = 0;
        }
        self.begin_connect("connect requested")
    }

    /// Takes the session down and stops reconnecting. Always succeeds.
    pub fn disconnect(&mut self, reason: &str) {
        self.should_reconnect = false;
        self.reconnect_timer = None;
        self.reconnect_attempts = 0;
        self.monitor.detach();
        self.close_client(reason);
        self.reset_session_facts();

        self.state
            .force(ConnectionStatus::Disconnected, TransitionMeta::reason(reason));
        tracing::info!(reason, "session disconnected on request");
        self.emit(SessionEvent::Disconnected {
            reason: reason.to_owned(),
            details: None,
            user_requested: true,
        });
    }

    /// Sends a chat line through the live client.
    pub fn send_message(&mut self, text: &str) -> Result<(), SessionError> {
        let status = self.state.current();
        if status != ConnectionStatus::Connected {
            return Err(SessionError::NotConnected(status));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let client = self
            .client
            .as_mut()
            .ok_or(SessionError::NotConnected(status))?;
        client.chat(text)?;
        tracing::debug!(len = text.len(), "chat message sent");
        Ok(())
    }

    pub fn set_safety_enabled(&mut self, enabled: bool) {
        self.monitor.set_enabled(enabled);
        tracing::info!(enabled, "safety monitor setting changed");
    }

    pub fn safety_config(&self) -> SafetyConfig {
        self.monitor.config().clone()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.state.current() == ConnectionStatus::Connected
    }

    pub fn state(&self) -> ConnectionStatus {
        self.state.current()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn health(&self) -> u8 {
        self.health
    }

    pub fn auth_challenge(&self) -> Option<AuthChallenge> {
        self.auth_challenge.clone()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn reconnect_info(&self) -> ReconnectInfo {
        ReconnectInfo {
            attempts: self.reconnect_attempts,
            max_attempts: self.policy.max_attempts,
            should_reconnect: self.should_reconnect,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            connected: self.is_connected(),
            state: self.state.current(),
            username: self.username.clone(),
            world: self.world.clone(),
            position: self.position,
            health: self.health,
            reconnect: self.reconnect_info(),
            auth_challenge: self.auth_challenge.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Recorded state transitions, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Transition> {
        self.state.history()
    }

    /// Generation of the current (or most recently closed) client.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a reconnect is scheduled and waiting for its delay.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// A sender for the session event channel, for handles that subscribe
    /// without going through the manager.
    pub fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Registers a synchronous state-transition listener.
    pub fn subscribe_state<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Transition) + Send + 'static,
    {
        self.state.subscribe(listener)
    }

    pub fn unsubscribe_state(&mut self, id: ListenerId) -> bool {
        self.state.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Event pump
    // -----------------------------------------------------------------------

    /// Waits for the next thing the session must react to.
    ///
    /// Cancel-safe: dropping the future loses nothing.
    pub async fn next_input(&mut self) -> SessionInput {
        tokio::select! {
            Some(event) = self.client_rx.recv() => SessionInput::Client(event),
            Some(prompt) = self.auth_rx.recv() => SessionInput::AuthPrompt(prompt),
            () = reconnect_due(&mut self.reconnect_timer) => SessionInput::ReconnectDue,
            () = self.monitor.wait_for_check() => SessionInput::SafetyCheck,
        }
    }

    pub fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Client(TaggedEvent { generation, event }) => {
                if generation != self.generation {
                    tracing::debug!(
                        generation,
                        current = self.generation,
                        ?event,
                        "dropping event from superseded client"
                    );
                    return;
                }
                self.handle_client_event(event);
            }
            SessionInput::AuthPrompt(CapturedChallenge {
                generation,
                challenge,
            }) => {
                if generation != self.generation {
                    tracing::debug!(generation, "dropping auth prompt from superseded client");
                    return;
                }
                self.handle_auth_prompt(challenge);
            }
            SessionInput::ReconnectDue => self.handle_reconnect_due(),
            SessionInput::SafetyCheck => self.handle_safety_check(),
        }
    }

    /// Waits for one input and applies it.
    pub async fn step(&mut self) {
        let input = self.next_input().await;
        self.handle_input(input);
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn begin_connect(&mut self, reason: &str) -> Result<(), SessionError> {
        let status = self.state.current();
        if !status.can_transition_to(ConnectionStatus::Connecting) {
            return Err(SessionError::AlreadyActive(status));
        }
        self.should_reconnect = true;
        self.reconnect_timer = None;
        self.state
            .transition(ConnectionStatus::Connecting, TransitionMeta::reason(reason));
        tracing::info!(
            address = %self.options.address(),
            username = %self.options.username,
            auth = %self.options.auth_mode,
            "connecting"
        );
        self.open_client();
        Ok(())
    }

    fn open_client(&mut self) {
        self.close_client("replaced by a new connection");
        self.generation += 1;

        let sink = (self.make_sink)();
        let diagnostics =
            AuthCapture::new(sink, self.generation, self.auth_tx.clone());
        let link = ClientLink::new(
            ClientEventSender::new(self.generation, self.client_tx.clone()),
            Box::new(diagnostics),
        );

        match self.factory.create(&self.options, link) {
            Ok(client) => {
                tracing::debug!(generation = self.generation, "game client created");
                self.client = Some(client);
            }
            Err(err) => {
                tracing::error!(%err, "failed to create game client");
                let message = err.to_string();
                self.state.force(
                    ConnectionStatus::Error,
                    TransitionMeta::reason("client construction failed")
                        .with_details(message.clone()),
                );
                self.last_error = Some(message);
                if self.should_reconnect {
                    self.schedule_reconnect();
                }
            }
        }
    }

    /// Quits and forgets the current client, if any.
    fn close_client(&mut self, reason: &str) {
        if let Some(mut client) = self.client.take() {
            client.quit(reason);
            self.generation += 1;
            tracing::debug!(reason, "game client closed");
        }
    }

    fn reset_session_facts(&mut self) {
        self.world = UNKNOWN_WORLD.to_owned();
        self.position = Position::ORIGIN;
        self.auth_challenge = None;
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Login => self.on_login(),
            ClientEvent::Spawn => {
                self.refresh_from_client();
                // Clients re-send spawn on world changes; keep the cooldowns.
                if self.monitor.is_attached() {
                    self.monitor.reseed_health(self.health);
                } else {
                    self.monitor.attach(self.health);
                }
                tracing::info!(
                    world = %self.world,
                    position = %self.position,
                    health = self.health,
                    "spawned"
                );
                self.emit(SessionEvent::Spawned {
                    world: self.world.clone(),
                    position: self.position,
                    health: self.health,
                });
            }
            ClientEvent::Respawn => {
                self.refresh_from_client();
                if self.monitor.is_attached() {
                    self.monitor.reseed_health(self.health);
                } else {
                    self.monitor.attach(self.health);
                }
                tracing::info!(position = %self.position, "respawned");
                self.emit(SessionEvent::Respawned {
                    world: self.world.clone(),
                    position: self.position,
                    health: self.health,
                });
            }
            ClientEvent::Move(position) => {
                self.position = position;
                self.check_proximity();
            }
            ClientEvent::Health(health) => {
                self.health = health;
                let alerts = self.monitor.check_health(health, Instant::now());
                self.apply_alerts(alerts);
            }
            ClientEvent::PlayerJoined(name) | ClientEvent::PlayerLeft(name) => {
                tracing::debug!(player = %name, "visible players changed");
                self.check_proximity();
            }
            ClientEvent::Message { username, text } => {
                tracing::debug!(%username, "chat message received");
                self.emit(SessionEvent::ChatMessage { username, text });
            }
            ClientEvent::End { reason } => {
                self.handle_disconnect("connection ended", Some(reason));
            }
            ClientEvent::Error { message } => {
                self.last_error = Some(message.clone());
                self.handle_disconnect("client error", Some(message));
            }
            ClientEvent::Kicked { reason } => {
                self.handle_disconnect("kicked", Some(reason));
            }
        }
    }

    fn on_login(&mut self) {
        self.reconnect_attempts = 0;
        self.auth_challenge = None;
        self.last_error = None;
        self.username = self
            .client
            .as_ref()
            .and_then(|c| c.username())
            .or_else(|| Some(self.options.username.clone()));

        let meta = TransitionMeta::reason("logged in");
        if !self.state.transition(ConnectionStatus::Connected, meta.clone()) {
            self.state.force(ConnectionStatus::Connected, meta);
        }
        tracing::info!(username = self.username.as_deref().unwrap_or(""), "connected");
        self.emit(SessionEvent::Connected {
            username: self.username.clone(),
        });
    }

    /// Copies world, position and health from the client after a spawn.
    fn refresh_from_client(&mut self) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        self.world = client.world().unwrap_or_else(|| UNKNOWN_WORLD.to_owned());
        if let Some(position) = client.position() {
            self.position = position;
        }
        self.health = client.health().unwrap_or(DEFAULT_HEALTH);
    }

    fn handle_auth_prompt(&mut self, challenge: AuthChallenge) {
        tracing::info!(url = %challenge.url, code = %challenge.code, "authentication required");
        self.auth_challenge = Some(challenge.clone());
        // Refused when the prompt arrives outside a connect sequence; the
        // challenge is still worth surfacing.
        self.state.transition(
            ConnectionStatus::Authenticating,
            TransitionMeta::reason("device-code authentication pending"),
        );
        self.emit(SessionEvent::AuthRequired { challenge });
    }

    /// The client reported that the session died.
    fn handle_disconnect(&mut self, reason: &str, details: Option<String>) {
        self.monitor.detach();
        if self.client.take().is_some() {
            self.generation += 1;
        }
        self.reset_session_facts();

        let mut meta = TransitionMeta::reason(reason);
        meta.details = details.clone();
        self.state.force(ConnectionStatus::Disconnected, meta);
        tracing::warn!(reason, details = details.as_deref().unwrap_or(""), "session lost");
        self.emit(SessionEvent::Disconnected {
            reason: reason.to_owned(),
            details,
            user_requested: false,
        });

        if self.should_reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        let max_attempts = self.policy.max_attempts;
        if self.policy.is_exhausted(self.reconnect_attempts) {
            self.should_reconnect = false;
            self.reconnect_timer = None;
            if self.state.current() != ConnectionStatus::Disconnected {
                self.state.force(
                    ConnectionStatus::Disconnected,
                    TransitionMeta::reason("reconnect attempts exhausted"),
                );
            }
            tracing::warn!(attempts = self.reconnect_attempts, "giving up on reconnecting");
            self.emit(SessionEvent::ReconnectFailed {
                attempts: self.reconnect_attempts,
            });
            return;
        }

        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        let delay = self.policy.delay_for(attempt);
        self.state.force(
            ConnectionStatus::Reconnecting,
            TransitionMeta::reason(format!("reconnect attempt {attempt}/{max_attempts}")),
        );
        self.reconnect_timer = Some(Box::pin(time::sleep(delay)));

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(attempt, max_attempts, delay_ms, "reconnect scheduled");
        self.emit(SessionEvent::Reconnecting {
            attempt,
            max_attempts,
            delay_ms,
        });
    }

    fn handle_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        if !self.should_reconnect || self.is_connected() {
            tracing::debug!("reconnect no longer wanted");
            return;
        }
        self.state.force(
            ConnectionStatus::Disconnected,
            TransitionMeta::reason("reconnect delay elapsed"),
        );
        if let Err(err) = self.begin_connect("reconnecting") {
            tracing::warn!(%err, "reconnect attempt refused");
        }
    }

    fn handle_safety_check(&mut self) {
        let observation = Observation {
            health: Some(self.health),
            position: Some(self.position),
            players: self.visible_players(),
        };
        let alerts = self.monitor.run_checks(&observation, Instant::now());
        self.apply_alerts(alerts);
    }

    fn check_proximity(&mut self) {
        let players = self.visible_players();
        let alert =
            self.monitor
                .check_proximity(Some(self.position), &players, Instant::now());
        self.apply_alerts(alert.into_iter().collect());
    }

    fn visible_players(&self) -> Vec<PlayerSighting> {
        self.client
            .as_ref()
            .map(|c| c.players())
            .unwrap_or_default()
    }

    /// Publishes alerts, then severs the session if any of them asks for it.
    fn apply_alerts(&mut self, alerts: Vec<SafetyAlert>) {
        let mut sever = None;
        for alert in alerts {
            if sever.is_none() && alert.recommends_disconnect() {
                sever = Some(format!("safety: {}", alert.kind()));
            }
            self.emit(SessionEvent::SafetyAlert { alert });
        }
        if let Some(reason) = sever {
            tracing::warn!(%reason, "safety monitor requested disconnect");
            self.disconnect(&reason);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
