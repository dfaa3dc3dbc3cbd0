//! The channel a client uses to talk back to the session manager.

use std::fmt;
use std::io::Write;

use tokio::sync::mpsc;

use crate::ClientEvent;

/// A client event stamped with the generation of the client that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: ClientEvent,
}

/// Cloneable event sender. Hand copies to background tasks spawned by the
/// client library.
#[derive(Clone)]
pub struct ClientEventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl ClientEventSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Reports an event. Returns `false` once the session manager is gone.
    pub fn emit(&self, event: ClientEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for ClientEventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEventSender")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Everything a freshly created client needs to report back: an event
/// sender and a diagnostic writer.
pub struct ClientLink {
    events: ClientEventSender,
    diagnostics: Box<dyn Write + Send>,
}

impl ClientLink {
    pub fn new(
        events: ClientEventSender,
        diagnostics: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            events,
            diagnostics,
        }
    }

    pub fn generation(&self) -> u64 {
        self.events.generation()
    }

    pub fn emit(&self, event: ClientEvent) -> bool {
        self.events.emit(event)
    }

    pub fn events(&self) -> &ClientEventSender {
        &self.events
    }

    /// Where the client must write its diagnostic output, line by line.
    pub fn diagnostics(&mut self) -> &mut (dyn Write + Send) {
        self.diagnostics.as_mut()
    }

    pub fn into_parts(self) -> (ClientEventSender, Box<dyn Write + Send>) {
        (self.events, self.diagnostics)
    }
}

impl fmt::Debug for ClientLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientLink")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = ClientLink::new(
            ClientEventSender::new(4, tx),
            Box::new(std::io::sink()),
        );

        assert!(link.emit(ClientEvent::Login));

        let tagged = rx.try_recv().expect("event should be queued");
        assert_eq!(tagged.generation, 4);
        assert_eq!(tagged.event, ClientEvent::Login);
    }

    #[test]
    fn test_emit_after_receiver_dropped_returns_false() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ClientEventSender::new(1, tx);
        drop(rx);
        assert!(!sender.emit(ClientEvent::Spawn));
    }
}
