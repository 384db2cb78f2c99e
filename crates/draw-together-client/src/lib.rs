//! Draw Together network client.
//!
//! Dials a relay, sends locally originated events, and applies every line
//! the relay sends back to a shared [`Session`](draw_together_core::Session).

pub mod client;
pub mod error;

pub use client::Client;
pub use error::ClientError;
