//! Safety monitor for Vigil.
//!
//! Watches the avatar's health and the players around it, and raises
//! [`SafetyAlert`](vigil_protocol::SafetyAlert)s when something looks
//! dangerous. The monitor never acts on its own: it hands alerts back to the
//! session manager, which decides whether to sever the session.
//!
//! # Triggers
//!
//! - **Reactive**: the session manager calls
//!   [`SafetyMonitor::check_health`] on every health change and
//!   [`SafetyMonitor::check_proximity`] on every movement or player
//!   join/leave.
//! - **Periodic**: while attached, [`SafetyMonitor::wait_for_check`]
//!   resolves every [`CHECK_INTERVAL`] so both checks re-run even if events
//!   were missed.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(ev) = events.recv() => { /* reactive checks */ }
//!         _ = monitor.wait_for_check() => {
//!             let alerts = monitor.run_checks(&observation, Instant::now());
//!         }
//!     }
//! }
//! ```

mod error;
mod monitor;
mod trust;

pub use error::TrustError;
pub use monitor::{
    CHECK_INTERVAL, DEFAULT_HEALTH, Observation, SafetyMonitor, THREAT_RADIUS,
};
pub use trust::TrustLists;
