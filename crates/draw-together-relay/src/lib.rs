//! Draw Together relay.
//!
//! Accepts TCP connections, keeps a registry of live participants, and
//! rebroadcasts every line any of them sends to all of them, the sender
//! included. Lines are forwarded opaquely; the relay never decodes the
//! drawing protocol.

pub mod connection;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod state;

pub use error::RelayError;
pub use events::broadcast;
pub use server::{serve_with_shutdown, spawn_health_server, start_relay};
pub use state::{ConnId, ConnectionHandle, RelayState};
