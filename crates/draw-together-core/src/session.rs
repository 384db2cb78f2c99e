//! Per-surface pen state machine.
//!
//! A [`Session`] sits between the local pointer, the wire, and a
//! [`Renderer`]. Local pointer actions become [`Event`]s to send; events
//! arriving from the relay are painted through the renderer.
//!
//! Two cursors are tracked:
//!
//! * the local stroke (`Idle`/`Stroking`), driven only by the pointer;
//! * one shared cursor for events applied from the wire.
//!
//! The relay echoes every line back to its sender, so a participant's own
//! strokes also flow through the shared cursor. Every painted segment names
//! both of its ends, taken from the cursor it belongs to, so that echo never
//! moves the local pen mid-stroke.
//!
//! The shared cursor is a single cursor per surface, not one per sender.
//! Lines carry no sender identity, so when two participants draw at the
//! same time their segments are stitched onto each other.

use tracing::{debug, warn};

use crate::protocol::{self, ColorSpec, DecodeError, Event, Notice, Pen};
use crate::render::Renderer;

/// Thinnest stroke the local pointer may select.
pub const MIN_WIDTH: f64 = 1.0;
/// Thickest stroke the local pointer may select.
pub const MAX_WIDTH: f64 = 20.0;
pub const DEFAULT_WIDTH: f64 = 2.0;

/// Last known position of an in-progress stroke.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PenState {
    pub position: Option<(f64, f64)>,
    pub active: bool,
}

impl PenState {
    fn start(&mut self, x: f64, y: f64) {
        self.position = Some((x, y));
        self.active = true;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Stroking,
}

/// Outcome of applying one line or event from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Started,
    Segment,
    /// A segment arrived with no cursor and was treated as a stroke start.
    ImplicitStart,
    Cleared,
    Notice(Notice),
    Ignored(DecodeError),
}

pub struct Session<R> {
    renderer: R,
    ink: ColorSpec,
    eraser: bool,
    width: f64,
    local: PenState,
    stroke_pen: Pen,
    stroke_width: f64,
    cursor: PenState,
}

impl<R: Renderer> Session<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            ink: ColorSpec::black(),
            eraser: false,
            width: DEFAULT_WIDTH,
            local: PenState::default(),
            stroke_pen: Pen::default(),
            stroke_width: DEFAULT_WIDTH,
            cursor: PenState::default(),
        }
    }

    pub fn with_tool(mut self, ink: ColorSpec, width: f64) -> Self {
        self.ink = ink;
        self.set_width(width);
        self
    }

    pub fn phase(&self) -> Phase {
        if self.local.active {
            Phase::Stroking
        } else {
            Phase::Idle
        }
    }

    /// The local pointer stroke.
    pub fn local(&self) -> PenState {
        self.local
    }

    /// The shared cursor driven by applied events.
    pub fn cursor(&self) -> PenState {
        self.cursor
    }

    /// Pen the next local stroke will use.
    pub fn current_pen(&self) -> Pen {
        if self.eraser {
            Pen::Eraser
        } else {
            Pen::Ink(self.ink.clone())
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn set_ink(&mut self, ink: ColorSpec) {
        self.ink = ink;
    }

    pub fn set_eraser(&mut self, on: bool) {
        self.eraser = on;
    }

    /// Clamp to `MIN_WIDTH..=MAX_WIDTH`. Non-finite input is ignored.
    pub fn set_width(&mut self, width: f64) {
        if width.is_finite() {
            self.width = width.clamp(MIN_WIDTH, MAX_WIDTH);
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Start a local stroke. Pressing again while stroking restarts it.
    pub fn pointer_down(&mut self, x: f64, y: f64) -> Option<Event> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        self.stroke_pen = self.current_pen();
        self.stroke_width = self.width;
        self.local.start(x, y);
        self.renderer
            .begin_stroke(x, y, &self.stroke_pen, self.stroke_width);
        Some(Event::StrokeStart {
            x,
            y,
            pen: self.stroke_pen.clone(),
            width: self.stroke_width,
        })
    }

    /// Extend the local stroke. A no-op while idle.
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<Event> {
        if !self.local.active || !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let from = self.local.position?;
        self.renderer
            .segment(from, (x, y), &self.stroke_pen, self.stroke_width);
        self.local.position = Some((x, y));
        Some(Event::StrokeSegment {
            x,
            y,
            pen: self.stroke_pen.clone(),
            width: self.stroke_width,
        })
    }

    /// Finish the local stroke. Nothing goes on the wire.
    pub fn pointer_up(&mut self) {
        self.local.active = false;
    }

    /// Wipe the surface locally and produce the event announcing it.
    pub fn clear(&mut self) -> Event {
        self.renderer.clear();
        self.local.reset();
        self.cursor.reset();
        Event::ClearSurface
    }

    /// Apply an event received from the relay.
    ///
    /// Independent of the local pointer phase, except that a clear also ends
    /// any local stroke.
    pub fn apply(&mut self, event: &Event) -> Applied {
        let outcome = match event {
            Event::StrokeStart { x, y, pen, width } => {
                self.renderer.begin_stroke(*x, *y, pen, *width);
                self.cursor.start(*x, *y);
                Applied::Started
            }
            Event::StrokeSegment { x, y, pen, width } => {
                if let Some(from) = self.cursor.position {
                    self.renderer.segment(from, (*x, *y), pen, *width);
                    self.cursor.position = Some((*x, *y));
                    Applied::Segment
                } else {
                    debug!(x, y, "Segment without a cursor, starting a stroke there");
                    self.renderer.begin_stroke(*x, *y, pen, *width);
                    self.cursor.start(*x, *y);
                    Applied::ImplicitStart
                }
            }
            Event::ClearSurface => {
                self.renderer.clear();
                self.cursor.reset();
                self.local.reset();
                Applied::Cleared
            }
        };
        self.renderer.event_applied(event);
        outcome
    }

    /// Decode and apply one line from the relay. Malformed lines are dropped.
    pub fn apply_line(&mut self, line: &str) -> Applied {
        if let Some(notice) = protocol::notice(line) {
            debug!(%notice, "Presence notice");
            self.renderer.notice(&notice);
            return Applied::Notice(notice);
        }
        match protocol::decode(line) {
            Ok(event) => self.apply(&event),
            Err(e) => {
                warn!(%e, line, "Dropping undecodable line");
                Applied::Ignored(e)
            }
        }
    }
}
