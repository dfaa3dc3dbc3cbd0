//! Control-surface vocabulary: commands in, replies and events out.
//!
//! A control client (chat bot, dashboard, CLI) talks to Vigil in frames:
//!
//! ```text
//! client                              vigil
//!   │── hello {token, name, version} ──→│
//!   │←──────── welcome {status} ────────│
//!   │── command {id, command} ─────────→│
//!   │←──────── reply {id, reply} ───────│
//!   │←──────── event {event} ───────────│   (pushed at any time)
//! ```
//!
//! Every command maps onto exactly one session-manager operation, and the
//! server dispatches them with an exhaustive `match`; adding a variant here
//! is a compile error until the handler covers it.

use serde::{Deserialize, Serialize};

use crate::{
    AuthChallenge, ConnectionStatus, Position, SafetyAlert, SafetyConfig,
    StatusSnapshot,
};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// An operator command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Bring the session up (and keep it up).
    Connect,
    /// Take the session down and stop reconnecting.
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Say something in game chat.
    SendMessage { text: String },
    /// Ask for a [`StatusSnapshot`].
    GetStatus,
    /// Turn the safety monitor on or off.
    SetSafetyEnabled { enabled: bool },
    /// Ask for the current [`SafetyConfig`].
    GetSafetyConfig,
}

/// The answer to a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    /// The command was accepted.
    Ack,
    Status { status: StatusSnapshot },
    SafetyConfig { config: SafetyConfig },
    /// The session is in a state where the command makes no sense.
    /// `reason` names the precondition that failed.
    Rejected { reason: String },
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Something that happened to the session, pushed to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChange {
        from: ConnectionStatus,
        to: ConnectionStatus,
        reason: Option<String>,
        forced: bool,
    },
    /// Login completed.
    Connected { username: Option<String> },
    Spawned {
        world: String,
        position: Position,
        health: u8,
    },
    Respawned {
        world: String,
        position: Position,
        health: u8,
    },
    Disconnected {
        reason: String,
        details: Option<String>,
        /// `true` when an operator (or the safety monitor acting for one)
        /// asked for the disconnect.
        user_requested: bool,
    },
    /// A device-code authentication is waiting for a human.
    AuthRequired { challenge: AuthChallenge },
    SafetyAlert { alert: SafetyAlert },
    Reconnecting {
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
    },
    /// Reconnect attempts are exhausted; the session stays down.
    ReconnectFailed { attempts: u32 },
    ChatMessage { username: String, text: String },
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A frame sent by a control client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Must be the first frame on every connection.
    Hello {
        token: String,
        name: String,
        version: u32,
    },
    Command { id: u64, command: ControlCommand },
}

/// A frame sent by Vigil to a control client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        version: u32,
        status: StatusSnapshot,
    },
    Reply { id: u64, reply: ControlReply },
    Event { event: SessionEvent },
    /// Protocol-level failure (bad handshake, rate limited, garbage frame).
    Error { code: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_wire_shape() {
        let json = r#"{"op":"command","id":7,"command":{"command":"send_message","text":"hi"}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Command {
                id: 7,
                command: ControlCommand::SendMessage { text: "hi".into() },
            }
        );
    }

    #[test]
    fn test_disconnect_reason_is_optional() {
        let json = r#"{"command":"disconnect"}"#;
        let cmd: ControlCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd, ControlCommand::Disconnect { reason: None });
    }

    #[test]
    fn test_event_frame_nests_alert_kind() {
        let frame = ServerFrame::Event {
            event: SessionEvent::SafetyAlert {
                alert: SafetyAlert::LowHealth { health: 8 },
            },
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["op"], "event");
        assert_eq!(value["event"]["type"], "safety_alert");
        assert_eq!(value["event"]["alert"]["kind"], "low-health");
    }

    #[test]
    fn test_unknown_command_is_rejected_by_decoder() {
        let json = r#"{"op":"command","id":1,"command":{"command":"self_destruct"}}"#;
        assert!(serde_json::from_str::<ClientFrame>(json).is_err());
    }
}
