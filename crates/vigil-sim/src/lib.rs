//! Deterministic simulated game client.
//!
//! Implements the [`vigil_client`] contract without any network. A test (or
//! the demo) holds a [`SimWorld`] and scripts what "the server" does:
//! logins, spawns, damage, players walking by, kicks. The session manager
//! sees exactly what it would see from a real client library.
//!
//! ```ignore
//! let world = SimWorld::new();
//! let manager = SessionManager::new(world.factory(), options);
//! // ... manager.connect() ...
//! world.login();
//! world.spawn("overworld", Position::new(500.0, 64.0, 500.0), 20);
//! world.set_health(5);
//! ```
//!
//! Scripted events always go to the client created most recently, unless
//! it has quit. [`SimWorld::emit_from`] can impersonate an older client to
//! exercise stale-event handling.

use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use vigil_client::{
    ClientError, ClientEvent, ClientEventSender, ClientFactory, ClientLink,
    ClientOptions, GameClient,
};
use vigil_protocol::{PlayerSighting, Position};

#[derive(Default)]
struct WorldState {
    clients_created: u32,
    /// Construction errors to return from the next `create` calls.
    failures: VecDeque<String>,
    auto_join: bool,
    /// Event senders by client generation.
    links: BTreeMap<u64, ClientEventSender>,
    active: Option<u64>,
    diagnostics: Option<Box<dyn Write + Send>>,
    last_options: Option<ClientOptions>,

    username: Option<String>,
    world: Option<String>,
    position: Option<Position>,
    health: Option<u8>,
    players: BTreeMap<String, Position>,
    chat_log: Vec<String>,
    /// When set, `chat` fails with this message.
    chat_failure: Option<String>,
    quits: Vec<String>,
}

/// The scriptable world shared by the factory, its clients, and the test.
///
/// Cheap to clone; all clones see the same state.
#[derive(Clone, Default)]
pub struct SimWorld {
    inner: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that builds clients living in this world.
    pub fn factory(&self) -> SimFactory {
        SimFactory {
            world: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // -- setup -------------------------------------------------------------

    /// Makes the next `count` client constructions fail with `message`.
    pub fn fail_next_create(&self, count: usize, message: &str) {
        let mut state = self.lock();
        state
            .failures
            .extend(std::iter::repeat_n(message.to_owned(), count));
    }

    /// When set, every new client logs in and spawns at the origin as
    /// soon as it is created.
    pub fn set_auto_join(&self, auto_join: bool) {
        self.lock().auto_join = auto_join;
    }

    // -- scripting ---------------------------------------------------------

    /// Sends `event` as the active client. Returns `false` if there is no
    /// active client or the session manager is gone.
    pub fn emit(&self, event: ClientEvent) -> bool {
        let state = self.lock();
        let Some(link) = state.active.and_then(|g| state.links.get(&g)) else {
            return false;
        };
        link.emit(event)
    }

    /// Sends `event` as the client created under `generation`, active or not.
    pub fn emit_from(&self, generation: u64, event: ClientEvent) -> bool {
        self.lock()
            .links
            .get(&generation)
            .is_some_and(|link| link.emit(event))
    }

    pub fn login(&self) -> bool {
        self.emit(ClientEvent::Login)
    }

    pub fn spawn(&self, world: &str, position: Position, health: u8) -> bool {
        {
            let mut state = self.lock();
            state.world = Some(world.to_owned());
            state.position = Some(position);
            state.health = Some(health);
        }
        self.emit(ClientEvent::Spawn)
    }

    pub fn respawn(&self, position: Position) -> bool {
        {
            let mut state = self.lock();
            state.position = Some(position);
            state.health = Some(20);
        }
        self.emit(ClientEvent::Respawn)
    }

    pub fn set_health(&self, health: u8) -> bool {
        self.lock().health = Some(health);
        self.emit(ClientEvent::Health(health))
    }

    pub fn move_to(&self, position: Position) -> bool {
        self.lock().position = Some(position);
        self.emit(ClientEvent::Move(position))
    }

    pub fn add_player(&self, name: &str, position: Position) -> bool {
        self.lock().players.insert(name.to_owned(), position);
        self.emit(ClientEvent::PlayerJoined(name.to_owned()))
    }

    /// Moves another player. No event is sent; the session notices on its
    /// next proximity check.
    pub fn move_player(&self, name: &str, position: Position) {
        if let Some(p) = self.lock().players.get_mut(name) {
            *p = position;
        }
    }

    /// Moves another player by a random step of at most `max_step` blocks
    /// on each horizontal axis. Returns the new position.
    pub fn wander_player(&self, name: &str, max_step: f64) -> Option<Position> {
        let mut rng = rand::rng();
        let mut state = self.lock();
        let p = state.players.get_mut(name)?;
        p.x += rng.random_range(-max_step..=max_step);
        p.z += rng.random_range(-max_step..=max_step);
        Some(*p)
    }

    pub fn remove_player(&self, name: &str) -> bool {
        self.lock().players.remove(name);
        self.emit(ClientEvent::PlayerLeft(name.to_owned()))
    }

    pub fn chat_from(&self, username: &str, text: &str) -> bool {
        self.emit(ClientEvent::Message {
            username: username.to_owned(),
            text: text.to_owned(),
        })
    }

    /// Writes one diagnostic line through the active client's sink.
    pub fn print(&self, line: &str) -> bool {
        let mut state = self.lock();
        let Some(sink) = state.diagnostics.as_mut() else {
            return false;
        };
        writeln!(sink, "{line}").and_then(|()| sink.flush()).is_ok()
    }

    /// Prints the prompt a client library shows for device-code login.
    pub fn prompt_device_code(&self, url: &str, code: &str) -> bool {
        self.print(&format!(
            "[msa] First time signing in. Please authenticate now:\n\
             To sign in, use a web browser to open the page {url} and use the code {code} to authenticate."
        ))
    }

    pub fn end(&self, reason: &str) -> bool {
        self.terminate(ClientEvent::End {
            reason: reason.to_owned(),
        })
    }

    pub fn kick(&self, reason: &str) -> bool {
        self.terminate(ClientEvent::Kicked {
            reason: reason.to_owned(),
        })
    }

    pub fn fail(&self, message: &str) -> bool {
        self.terminate(ClientEvent::Error {
            message: message.to_owned(),
        })
    }

    fn terminate(&self, event: ClientEvent) -> bool {
        let sent = self.emit(event);
        let mut state = self.lock();
        state.active = None;
        state.diagnostics = None;
        sent
    }

    /// Makes every following `chat` call fail until cleared with `None`.
    pub fn fail_chat(&self, message: Option<&str>) {
        self.lock().chat_failure = message.map(str::to_owned);
    }

    // -- inspection --------------------------------------------------------

    pub fn clients_created(&self) -> u32 {
        self.lock().clients_created
    }

    /// Generation of the active client.
    pub fn active_generation(&self) -> Option<u64> {
        self.lock().active
    }

    pub fn chat_log(&self) -> Vec<String> {
        self.lock().chat_log.clone()
    }

    /// Reasons passed to `quit`, in order.
    pub fn quits(&self) -> Vec<String> {
        self.lock().quits.clone()
    }

    pub fn last_options(&self) -> Option<ClientOptions> {
        self.lock().last_options.clone()
    }
}

/// [`ClientFactory`] for simulated clients.
pub struct SimFactory {
    world: SimWorld,
}

impl ClientFactory for SimFactory {
    fn create(
        &mut self,
        options: &ClientOptions,
        link: ClientLink,
    ) -> Result<Box<dyn GameClient>, ClientError> {
        let generation = link.generation();
        let auto_join = {
            let mut state = self.world.lock();
            state.last_options = Some(options.clone());
            if let Some(message) = state.failures.pop_front() {
                tracing::debug!(generation, %message, "simulated construction failure");
                return Err(ClientError::Construction(message));
            }

            state.clients_created += 1;
            let (events, diagnostics) = link.into_parts();
            state.links.insert(generation, events);
            state.active = Some(generation);
            state.diagnostics = Some(diagnostics);
            state.username = Some(options.username.clone());
            state.world = None;
            state.position = None;
            state.health = None;
            state.auto_join
        };
        tracing::debug!(generation, address = %options.address(), "simulated client created");

        if auto_join {
            self.world.login();
            self.world.spawn("overworld", Position::ORIGIN, 20);
        }

        Ok(Box::new(SimClient {
            world: self.world.clone(),
            generation,
            closed: false,
        }))
    }
}

/// A simulated [`GameClient`]. Reads everything from its [`SimWorld`].
pub struct SimClient {
    world: SimWorld,
    generation: u64,
    closed: bool,
}

impl SimClient {
    fn is_active(&self, state: &WorldState) -> bool {
        !self.closed && state.active == Some(self.generation)
    }
}

impl GameClient for SimClient {
    fn username(&self) -> Option<String> {
        self.world.lock().username.clone()
    }

    fn health(&self) -> Option<u8> {
        self.world.lock().health
    }

    fn position(&self) -> Option<Position> {
        self.world.lock().position
    }

    fn world(&self) -> Option<String> {
        self.world.lock().world.clone()
    }

    fn players(&self) -> Vec<PlayerSighting> {
        self.world
            .lock()
            .players
            .iter()
            .map(|(name, position)| PlayerSighting {
                name: name.clone(),
                position: *position,
            })
            .collect()
    }

    fn chat(&mut self, text: &str) -> Result<(), ClientError> {
        let mut state = self.world.lock();
        if !self.is_active(&state) {
            return Err(ClientError::Closed);
        }
        if let Some(message) = &state.chat_failure {
            return Err(ClientError::Send(message.clone()));
        }
        state.chat_log.push(text.to_owned());
        Ok(())
    }

    fn quit(&mut self, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.world.lock();
        state.quits.push(reason.to_owned());
        if state.active == Some(self.generation) {
            state.active = None;
            state.diagnostics = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use vigil_client::TaggedEvent;
    use vigil_protocol::AuthMode;

    use super::*;

    fn options() -> ClientOptions {
        ClientOptions {
            host: "localhost".into(),
            port: 25565,
            version: None,
            auth_mode: AuthMode::Offline,
            username: "sentry".into(),
        }
    }

    fn link(
        generation: u64,
    ) -> (ClientLink, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = ClientLink::new(
            ClientEventSender::new(generation, tx),
            Box::new(std::io::sink()),
        );
        (link, rx)
    }

    #[test]
    fn test_create_routes_events_to_active_client() {
        let world = SimWorld::new();
        let mut factory = world.factory();
        let (l, mut rx) = link(1);
        let _client = factory.create(&options(), l).unwrap();

        assert!(world.login());
        let got = rx.try_recv().unwrap();
        assert_eq!((got.generation, got.event), (1, ClientEvent::Login));
        assert_eq!(world.clients_created(), 1);
    }

    #[test]
    fn test_fail_next_create() {
        let world = SimWorld::new();
        let mut factory = world.factory();
        world.fail_next_create(1, "boom");

        let (l, _rx) = link(1);
        assert!(matches!(
            factory.create(&options(), l),
            Err(ClientError::Construction(m)) if m == "boom"
        ));
        let (l, _rx2) = link(2);
        assert!(factory.create(&options(), l).is_ok());
        assert_eq!(world.clients_created(), 1);
    }

    #[test]
    fn test_quit_detaches_and_blocks_chat() {
        let world = SimWorld::new();
        let mut factory = world.factory();
        let (l, _rx) = link(1);
        let mut client = factory.create(&options(), l).unwrap();

        client.chat("hello").unwrap();
        client.quit("bye");
        client.quit("bye again");

        assert!(matches!(client.chat("late"), Err(ClientError::Closed)));
        assert_eq!(world.chat_log(), vec!["hello".to_owned()]);
        assert_eq!(world.quits(), vec!["bye".to_owned()]);
        assert!(!world.login());
    }

    #[test]
    fn test_players_are_reported_with_positions() {
        let world = SimWorld::new();
        let mut factory = world.factory();
        let (l, _rx) = link(1);
        let client = factory.create(&options(), l).unwrap();

        world.add_player("alice", Position::new(1.0, 2.0, 3.0));
        world.move_player("alice", Position::new(4.0, 5.0, 6.0));
        assert_eq!(
            client.players(),
            vec![PlayerSighting {
                name: "alice".into(),
                position: Position::new(4.0, 5.0, 6.0),
            }]
        );
    }

    #[test]
    fn test_wander_player_stays_within_step() {
        let world = SimWorld::new();
        world.lock().players.insert("bob".into(), Position::ORIGIN);
        let p = world.wander_player("bob", 2.0).unwrap();
        assert!(p.x.abs() <= 2.0 && p.z.abs() <= 2.0);
        assert_eq!(p.y, 0.0);
        assert!(world.wander_player("nobody", 2.0).is_none());
    }
}
