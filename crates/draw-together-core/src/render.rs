//! The seam between the pen state machine and whatever paints pixels.

use crate::protocol::{Event, Notice, Pen};

/// Paints strokes for a [`Session`](crate::session::Session).
///
/// The session decides *what* to draw; implementors decide *how*. The eraser
/// is expected to paint with the background color.
pub trait Renderer: Send {
    /// A stroke starts at `(x, y)`. Nothing is painted yet.
    fn begin_stroke(&mut self, x: f64, y: f64, pen: &Pen, width: f64);

    /// Paint a straight segment from `from` to `to`.
    ///
    /// Both ends come from the session; implementors must not keep a cursor
    /// of their own, since local and remote strokes interleave.
    fn segment(&mut self, from: (f64, f64), to: (f64, f64), pen: &Pen, width: f64);

    /// Wipe the whole surface.
    fn clear(&mut self);

    /// Called once per event applied from the network, after painting.
    fn event_applied(&mut self, _event: &Event) {}

    /// The relay connection is gone; the surface stays as it is.
    fn connection_lost(&mut self, _reason: &str) {}

    /// A participant joined or left.
    fn notice(&mut self, _notice: &Notice) {}
}

/// A single call received by a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    Begin { x: f64, y: f64, pen: Pen, width: f64 },
    Line {
        from: (f64, f64),
        to: (f64, f64),
        pen: Pen,
        width: f64,
    },
    Clear,
    Applied(Event),
    ConnectionLost(String),
    Notice(Notice),
}

/// Renderer that records every call. Useful headless and in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    pub ops: Vec<RenderOp>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the painting calls, without bookkeeping notifications.
    pub fn strokes(&self) -> Vec<RenderOp> {
        self.ops
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    RenderOp::Begin { .. } | RenderOp::Line { .. } | RenderOp::Clear
                )
            })
            .cloned()
            .collect()
    }

    /// Events reported through [`Renderer::event_applied`], in order.
    pub fn applied(&self) -> Vec<Event> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RenderOp::Applied(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn begin_stroke(&mut self, x: f64, y: f64, pen: &Pen, width: f64) {
        self.ops.push(RenderOp::Begin {
            x,
            y,
            pen: pen.clone(),
            width,
        });
    }

    fn segment(&mut self, from: (f64, f64), to: (f64, f64), pen: &Pen, width: f64) {
        self.ops.push(RenderOp::Line {
            from,
            to,
            pen: pen.clone(),
            width,
        });
    }

    fn clear(&mut self) {
        self.ops.push(RenderOp::Clear);
    }

    fn event_applied(&mut self, event: &Event) {
        self.ops.push(RenderOp::Applied(event.clone()));
    }

    fn connection_lost(&mut self, reason: &str) {
        self.ops.push(RenderOp::ConnectionLost(reason.to_string()));
    }

    fn notice(&mut self, notice: &Notice) {
        self.ops.push(RenderOp::Notice(notice.clone()));
    }
}
