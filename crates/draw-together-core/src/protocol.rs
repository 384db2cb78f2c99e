//! Draw Together line protocol.
//!
//! Every drawing action travels as one newline-terminated text line of
//! space-separated tokens:
//!
//! ```text
//! START <x> <y> <pen> <width>
//! DRAW  <x> <y> <pen> <width>
//! CLEAR
//! ```
//!
//! `<pen>` is the literal `ERASER` or a color specification. There is no
//! escaping, so a color can never contain whitespace; [`ColorSpec::new`]
//! rejects such values instead of producing a line that cannot be decoded.
//!
//! The relay also emits presence [`Notice`] lines. They are not drawing
//! events and [`decode`] reports them as [`DecodeError::UnknownVerb`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pen token meaning "paint with the background color".
pub const ERASER_TOKEN: &str = "ERASER";

const VERB_START: &str = "START";
const VERB_DRAW: &str = "DRAW";
const VERB_CLEAR: &str = "CLEAR";

const NOTICE_JOINED: &str = "Client connected: ";
const NOTICE_LEFT: &str = "Client disconnected: ";

/// A printable, whitespace-free color specification.
///
/// The wire format treats the value opaquely; [`ColorSpec::rgba`] resolves
/// the common spellings for renderers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorSpec(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("color is empty")]
    Empty,

    #[error("color {0:?} contains whitespace or control characters")]
    Unprintable(String),

    #[error("color {0:?} collides with the eraser token")]
    Reserved(String),
}

impl ColorSpec {
    pub fn new(spec: impl Into<String>) -> Result<Self, ColorError> {
        let spec = spec.into();
        if spec.is_empty() {
            return Err(ColorError::Empty);
        }
        if spec.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ColorError::Unprintable(spec));
        }
        if spec == ERASER_TOKEN {
            return Err(ColorError::Reserved(spec));
        }
        Ok(Self(spec))
    }

    /// Opaque black, the default ink.
    pub fn black() -> Self {
        Self("#000000".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve to `[r, g, b, a]`.
    ///
    /// Understands `#rgb`, `#rrggbb`, `#rrggbbaa`, `0xrrggbb`, `0xrrggbbaa`
    /// and a handful of color names. Returns `None` for anything else.
    pub fn rgba(&self) -> Option<[u8; 4]> {
        let s = self.0.as_str();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return match hex.len() {
                6 | 8 => parse_hex(hex),
                _ => None,
            };
        }
        let named = match s.to_ascii_lowercase().as_str() {
            "black" => [0, 0, 0, 255],
            "white" => [255, 255, 255, 255],
            "red" => [255, 0, 0, 255],
            "green" => [0, 128, 0, 255],
            "blue" => [0, 0, 255, 255],
            "yellow" => [255, 255, 0, 255],
            "transparent" => [0, 0, 0, 0],
            _ => return None,
        };
        Some(named)
    }
}

fn parse_hex(hex: &str) -> Option<[u8; 4]> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let mut out = [255u8; 4];
            for (slot, c) in out.iter_mut().zip(hex.chars()) {
                let v = c.to_digit(16)? as u8;
                *slot = v * 17;
            }
            Some(out)
        }
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ColorSpec {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ColorSpec> for String {
    fn from(value: ColorSpec) -> Self {
        value.0
    }
}

impl FromStr for ColorSpec {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// What a stroke paints with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pen {
    Eraser,
    Ink(ColorSpec),
}

impl Default for Pen {
    fn default() -> Self {
        Pen::Ink(ColorSpec::black())
    }
}

impl fmt::Display for Pen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pen::Eraser => f.write_str(ERASER_TOKEN),
            Pen::Ink(color) => fmt::Display::fmt(color, f),
        }
    }
}

impl FromStr for Pen {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ERASER_TOKEN {
            Ok(Pen::Eraser)
        } else {
            ColorSpec::new(s).map(Pen::Ink)
        }
    }
}

/// One synchronized drawing action.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StrokeStart { x: f64, y: f64, pen: Pen, width: f64 },
    StrokeSegment { x: f64, y: f64, pen: Pen, width: f64 },
    ClearSurface,
}

impl Event {
    pub fn verb(&self) -> &'static str {
        match self {
            Event::StrokeStart { .. } => VERB_START,
            Event::StrokeSegment { .. } => VERB_DRAW,
            Event::ClearSurface => VERB_CLEAR,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::StrokeStart { x, y, pen, width } | Event::StrokeSegment { x, y, pen, width } => {
                write!(
                    f,
                    "{} {} {} {} {}",
                    self.verb(),
                    format_number(*x),
                    format_number(*y),
                    pen,
                    format_number(*width)
                )
            }
            Event::ClearSurface => f.write_str(VERB_CLEAR),
        }
    }
}

impl FromStr for Event {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Two fractional digits when that is exact, the shortest exact form otherwise.
fn format_number(value: f64) -> String {
    let fixed = format!("{value:.2}");
    if fixed.parse::<f64>() == Ok(value) {
        fixed
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,

    #[error("unknown verb {0:?}")]
    UnknownVerb(String),

    #[error("{verb} expects {expected} tokens, found {found}")]
    Arity {
        verb: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("stroke width must be positive, got {0}")]
    InvalidWidth(f64),

    #[error("invalid pen: {0}")]
    InvalidPen(#[from] ColorError),
}

/// Encode an event as a single line without the terminator.
pub fn encode(event: &Event) -> String {
    event.to_string()
}

/// Decode one line. Never panics; every malformed input is a [`DecodeError`].
pub fn decode(line: &str) -> Result<Event, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&verb) = tokens.first() else {
        return Err(DecodeError::Empty);
    };

    match verb {
        VERB_CLEAR => {
            expect_arity(verb, &tokens, 1)?;
            Ok(Event::ClearSurface)
        }
        VERB_START | VERB_DRAW => {
            expect_arity(verb, &tokens, 5)?;
            let x = parse_coordinate("x", tokens[1])?;
            let y = parse_coordinate("y", tokens[2])?;
            let pen: Pen = tokens[3].parse()?;
            let width = parse_width(tokens[4])?;
            if verb == VERB_START {
                Ok(Event::StrokeStart { x, y, pen, width })
            } else {
                Ok(Event::StrokeSegment { x, y, pen, width })
            }
        }
        other => Err(DecodeError::UnknownVerb(other.to_string())),
    }
}

fn expect_arity(verb: &str, tokens: &[&str], expected: usize) -> Result<(), DecodeError> {
    if tokens.len() == expected {
        Ok(())
    } else {
        Err(DecodeError::Arity {
            verb: verb.to_string(),
            expected,
            found: tokens.len(),
        })
    }
}

fn parse_coordinate(field: &'static str, token: &str) -> Result<f64, DecodeError> {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::InvalidNumber {
            field,
            value: token.to_string(),
        }),
    }
}

fn parse_width(token: &str) -> Result<f64, DecodeError> {
    let width = parse_coordinate("width", token)?;
    if width > 0.0 {
        Ok(width)
    } else {
        Err(DecodeError::InvalidWidth(width))
    }
}

/// Presence line emitted by the relay when a participant joins or leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Joined(String),
    Left(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Joined(who) => write!(f, "{NOTICE_JOINED}{who}"),
            Notice::Left(who) => write!(f, "{NOTICE_LEFT}{who}"),
        }
    }
}

/// Recognize a relay presence line.
pub fn notice(line: &str) -> Option<Notice> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(who) = line.strip_prefix(NOTICE_JOINED) {
        Some(Notice::Joined(who.to_string()))
    } else {
        line.strip_prefix(NOTICE_LEFT)
            .map(|who| Notice::Left(who.to_string()))
    }
}
