//! Core types for Draw Together: the line protocol, the pen state machine,
//! the renderer seam, configuration, and errors.
//!
//! Nothing in this crate touches the network.

pub mod config;
pub mod error;
pub mod protocol;
pub mod render;
pub mod session;

pub use protocol::{ColorSpec, DecodeError, Event, Notice, Pen};
pub use render::{RecordingRenderer, RenderOp, Renderer};
pub use session::{Applied, PenState, Phase, Session};
