//! The connection state machine.
//!
//! [`ConnectionState`] wraps a [`ConnectionStatus`] with guarded
//! transitions, a bounded history, and synchronous listeners.
//!
//! There are two ways to move it:
//!
//! - [`transition`](ConnectionState::transition) obeys the allowed-move
//!   table on [`ConnectionStatus`]. It is used for moves the session itself
//!   initiates, so a second `connect` while one is in flight is refused.
//! - [`force`](ConnectionState::force) ignores the table. It is used when
//!   the game client reports a fact ("the socket closed") and the machine
//!   must follow reality.
//!
//! Both record a [`Transition`] and notify every listener in registration
//! order before returning.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::SystemTime;

use vigil_protocol::ConnectionStatus;

/// Maximum number of transitions kept in the history.
pub const HISTORY_CAPACITY: usize = 100;

/// Free-form context attached to a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionMeta {
    pub reason: Option<String>,
    pub details: Option<String>,
    /// Set by [`ConnectionState::force`].
    pub forced: bool,
}

impl TransitionMeta {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
    pub at: SystemTime,
    pub meta: TransitionMeta,
}

/// Handle returned by [`ConnectionState::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&Transition) + Send>;

pub struct ConnectionState {
    current: ConnectionStatus,
    history: VecDeque<Transition>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl ConnectionState {
    /// Starts in [`ConnectionStatus::Disconnected`] with no history.
    pub fn new() -> Self {
        Self {
            current: ConnectionStatus::Disconnected,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn current(&self) -> ConnectionStatus {
        self.current
    }

    pub fn can_transition_to(&self, target: ConnectionStatus) -> bool {
        self.current.can_transition_to(target)
    }

    /// Applies a guarded transition. Returns `false` (and logs) if the move
    /// is not allowed; the state is then unchanged.
    pub fn transition(
        &mut self,
        target: ConnectionStatus,
        meta: TransitionMeta,
    ) -> bool {
        if !self.can_transition_to(target) {
            tracing::warn!(
                from = %self.current,
                to = %target,
                reason = meta.reason.as_deref().unwrap_or(""),
                "refused state transition"
            );
            return false;
        }
        self.apply(target, meta);
        true
    }

    /// Moves to `target` unconditionally, marking the transition as forced.
    pub fn force(&mut self, target: ConnectionStatus, mut meta: TransitionMeta) {
        meta.forced = true;
        self.apply(target, meta);
    }

    fn apply(&mut self, target: ConnectionStatus, meta: TransitionMeta) {
        let record = Transition {
            from: self.current,
            to: target,
            at: SystemTime::now(),
            meta,
        };
        self.current = target;

        tracing::debug!(
            from = %record.from,
            to = %record.to,
            forced = record.meta.forced,
            reason = record.meta.reason.as_deref().unwrap_or(""),
            "state transition"
        );

        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());

        for (id, listener) in &mut self.listeners {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| listener(&record)));
            if outcome.is_err() {
                tracing::error!(listener = id.0, "state listener panicked");
            }
        }
    }

    /// Registers a listener called after every applied transition.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Transition) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Transition> {
        self.history.iter()
    }

    pub fn last_transition(&self) -> Option<&Transition> {
        self.history.back()
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("current", &self.current)
            .field("history_len", &self.history.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    use vigil_protocol::ConnectionStatus::*;

    /// Walks the machine to `target` through allowed moves.
    fn state_at(target: ConnectionStatus) -> ConnectionState {
        let mut s = ConnectionState::new();
        let path: &[ConnectionStatus] = match target {
            Disconnected => &[],
            Connecting => &[Connecting],
            Authenticating => &[Connecting, Authenticating],
            Connected => &[Connecting, Connected],
            Error => &[Connecting, Error],
            Reconnecting => &[Connecting, Error, Reconnecting],
        };
        for step in path {
            assert!(s.transition(*step, TransitionMeta::default()));
        }
        s
    }

    #[test]
    fn test_transition_mutates_iff_allowed() {
        for from in ConnectionStatus::ALL {
            for to in ConnectionStatus::ALL {
                let mut s = state_at(from);
                let allowed = s.can_transition_to(to);
                assert_eq!(s.transition(to, TransitionMeta::default()), allowed);
                let expected = if allowed { to } else { from };
                assert_eq!(s.current(), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_force_always_mutates() {
        for from in ConnectionStatus::ALL {
            for to in ConnectionStatus::ALL {
                let mut s = state_at(from);
                s.force(to, TransitionMeta::reason("reality"));
                assert_eq!(s.current(), to);
                let last = s.last_transition().unwrap();
                assert!(last.meta.forced);
                assert_eq!(last.meta.reason.as_deref(), Some("reality"));
            }
        }
    }

    #[test]
    fn test_refused_transition_is_not_recorded() {
        let mut s = ConnectionState::new();
        assert!(!s.transition(Connected, TransitionMeta::default()));
        assert_eq!(s.history().len(), 0);
        assert!(s.last_transition().is_none());
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let mut s = ConnectionState::new();
        for i in 0..(HISTORY_CAPACITY + 20) {
            let target = if i % 2 == 0 { Connecting } else { Disconnected };
            s.force(target, TransitionMeta::reason(i.to_string()));
        }
        assert_eq!(s.history().len(), HISTORY_CAPACITY);
        let first = s.history().next().unwrap();
        assert_eq!(first.meta.reason.as_deref(), Some("20"));
        let last = s.last_transition().unwrap();
        assert_eq!(last.meta.reason.as_deref(), Some("119"));
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut s = ConnectionState::new();
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            s.subscribe(move |t| seen.lock().unwrap().push((tag, t.to)));
        }

        s.transition(Connecting, TransitionMeta::default());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a", Connecting), ("b", Connecting), ("c", Connecting)]
        );
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let seen = Arc::new(Mutex::new(0));
        let mut s = ConnectionState::new();
        s.subscribe(|_| panic!("listener bug"));
        {
            let seen = Arc::clone(&seen);
            s.subscribe(move |_| *seen.lock().unwrap() += 1);
        }

        assert!(s.transition(Connecting, TransitionMeta::default()));
        s.force(Disconnected, TransitionMeta::default());

        assert_eq!(*seen.lock().unwrap(), 2);
        assert_eq!(s.current(), Disconnected);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let seen = Arc::new(Mutex::new(0));
        let mut s = ConnectionState::new();
        let id = {
            let seen = Arc::clone(&seen);
            s.subscribe(move |_| *seen.lock().unwrap() += 1)
        };

        s.transition(Connecting, TransitionMeta::default());
        assert!(s.unsubscribe(id));
        assert!(!s.unsubscribe(id));
        s.transition(Connected, TransitionMeta::default());

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_transition_records_from_to_and_meta() {
        let mut s = state_at(Connecting);
        s.transition(
            Error,
            TransitionMeta::reason("construction failed").with_details("bad host"),
        );
        let last = s.last_transition().unwrap();
        assert_eq!((last.from, last.to), (Connecting, Error));
        assert!(!last.meta.forced);
        assert_eq!(last.meta.details.as_deref(), Some("bad host"));
    }
}
