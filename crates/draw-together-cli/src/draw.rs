//! Line-driven drawing front end: pointer commands on stdin, applied events on stdout.

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use draw_together_client::{Client, ClientError};
use draw_together_core::protocol::{ColorSpec, Event, Notice, Pen};
use draw_together_core::render::Renderer;
use draw_together_core::session::Session;

pub const HELP: &str = "\
commands:
  down X Y       press the pointer at (X, Y)
  move X Y       drag to (X, Y)
  up             release the pointer
  clear          wipe the surface for everyone
  color SPEC     ink color, e.g. #ff0000 or 0x1e90ffff
  eraser on|off  toggle the eraser
  width W        stroke width (1-20)
  quit           leave";

/// One parsed stdin command.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Down(f64, f64),
    Move(f64, f64),
    Up,
    Clear,
    Color(ColorSpec),
    Eraser(bool),
    Width(f64),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<DrawCommand, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let number = |i: usize| -> Result<f64, String> {
        let token = tokens.get(i).ok_or("missing number")?;
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(format!("not a number: {token}")),
        }
    };
    let arity = |n: usize| -> Result<(), String> {
        if tokens.len() == n {
            Ok(())
        } else {
            Err(format!("expected {} argument(s)", n - 1))
        }
    };

    match tokens.first().copied() {
        Some("down") => {
            arity(3)?;
            Ok(DrawCommand::Down(number(1)?, number(2)?))
        }
        Some("move") => {
            arity(3)?;
            Ok(DrawCommand::Move(number(1)?, number(2)?))
        }
        Some("up") => arity(1).map(|_| DrawCommand::Up),
        Some("clear") => arity(1).map(|_| DrawCommand::Clear),
        Some("color") => {
            arity(2)?;
            ColorSpec::new(tokens[1])
                .map(DrawCommand::Color)
                .map_err(|e| e.to_string())
        }
        Some("eraser") => {
            arity(2)?;
            match tokens[1] {
                "on" => Ok(DrawCommand::Eraser(true)),
                "off" => Ok(DrawCommand::Eraser(false)),
                other => Err(format!("expected on or off, got {other}")),
            }
        }
        Some("width") => {
            arity(2)?;
            Ok(DrawCommand::Width(number(1)?))
        }
        Some("help") => Ok(DrawCommand::Help),
        Some("quit") | Some("exit") => Ok(DrawCommand::Quit),
        Some(other) => Err(format!("unknown command: {other}")),
        None => Err("empty command".to_string()),
    }
}

/// Renderer that narrates what it would paint.
pub struct TerminalRenderer<W> {
    out: W,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn say(&mut self, args: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{args}").and_then(|()| self.out.flush()) {
            tracing::debug!(%e, "Could not write to terminal");
        }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn begin_stroke(&mut self, x: f64, y: f64, pen: &Pen, width: f64) {
        tracing::trace!(x, y, %pen, width, "begin stroke");
    }

    fn segment(&mut self, from: (f64, f64), to: (f64, f64), pen: &Pen, width: f64) {
        tracing::trace!(?from, ?to, %pen, width, "segment");
    }

    fn clear(&mut self) {
        tracing::trace!("clear surface");
    }

    fn event_applied(&mut self, event: &Event) {
        self.say(format_args!("<< {event}"));
    }

    fn connection_lost(&mut self, reason: &str) {
        self.say(format_args!("!! {reason}"));
    }

    fn notice(&mut self, notice: &Notice) {
        self.say(format_args!("** {notice}"));
    }
}

/// Connect and run the stdin command loop until `quit` or end of input.
pub async fn run(server: &str, ink: ColorSpec, width: f64) -> anyhow::Result<()> {
    let session = Session::new(TerminalRenderer::new(std::io::stdout())).with_tool(ink, width);
    let mut client = Client::connect_with_session(server, session)
        .await
        .context("Unable to connect to server")?;

    println!("connected to {server} as {}; type `help` for commands", client.local_addr());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let sent = match command {
            DrawCommand::Down(x, y) => client.pointer_down(x, y).await,
            DrawCommand::Move(x, y) => client.pointer_move(x, y).await,
            DrawCommand::Up => {
                client.pointer_up().await;
                Ok(())
            }
            DrawCommand::Clear => client.clear().await,
            DrawCommand::Color(ink) => {
                client.set_ink(ink).await;
                Ok(())
            }
            DrawCommand::Eraser(on) => {
                client.set_eraser(on).await;
                Ok(())
            }
            DrawCommand::Width(w) => {
                client.set_width(w).await;
                Ok(())
            }
            DrawCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            DrawCommand::Quit => break,
        };

        match sent {
            Ok(()) => {}
            Err(ClientError::Disconnected) => {
                tracing::debug!("Not connected; change kept locally only");
            }
            Err(e) => tracing::warn!(%e, "Send failed"),
        }
    }

    client.close().await;
    Ok(())
}
