//! Text console for the operator.
//!
//! The console only reads shared state and queues operator intents; it never
//! touches the transport.

pub mod printer;

use std::fmt;
use std::ops::ControlFlow;

use crate::leaderboard::LEADERBOARD_CAPACITY;
use crate::session::Tuner;
use crate::state::{LinkStatus, Snapshot};

pub use printer::{ColoredText, Printer, PrinterColor};

/// Lines understood by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Toggle the motor driver.
    Bridge,
    /// Start automatic tuning.
    Start,
    /// Stop automatic tuning.
    Stop,
    /// Print the current state.
    Status,
    /// List commands.
    Help,
    /// Shut down and leave.
    Exit,
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge => write!(f, "bridge"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Status => write!(f, "status"),
            Self::Help => write!(f, "help"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// Parse one console line. Case and surrounding whitespace are ignored.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "bridge" | "b" | "toggle" => Some(ConsoleCommand::Bridge),
        "start" | "tune" => Some(ConsoleCommand::Start),
        "stop" | "halt" => Some(ConsoleCommand::Stop),
        "status" | "s" | "" => Some(ConsoleCommand::Status),
        "help" | "h" | "?" => Some(ConsoleCommand::Help),
        "exit" | "quit" | "q" => Some(ConsoleCommand::Exit),
        _ => None,
    }
}

pub const HELP: &str = "\
commands:
  bridge   toggle the Multi-Halfbridge on or off
  start    start automatic tuning
  stop     stop automatic tuning
  status   show angle, gains and best combinations
  exit     stop everything and quit";

/// Act on a parsed line. `Break` means the console should exit; the caller
/// then awaits [`Tuner::exit`].
pub fn dispatch(tuner: &Tuner, command: ConsoleCommand, printer: &Printer) -> ControlFlow<()> {
    match command {
        ConsoleCommand::Bridge => tuner.toggle_actuator(),
        ConsoleCommand::Start => tuner.start_tuning(),
        ConsoleCommand::Stop => tuner.stop_tuning(),
        ConsoleCommand::Status => print_status(&tuner.view().snapshot(), printer),
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Exit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

/// Build the status panel, one entry per output line.
pub fn render_status(snapshot: &Snapshot) -> Vec<Vec<ColoredText>> {
    let mut lines = Vec::new();

    let angle = match snapshot.latest_angle {
        Some(angle) => format!("Angle: {angle:?}"),
        None => "Angle: -".to_string(),
    };
    lines.push(vec![ColoredText::new(angle, PrinterColor::BoldWhite)]);

    let gains = match &snapshot.tuning.current_gains {
        Some(gains) => gains.to_string(),
        None => "kp: -, ki: -, kd: -, alpha: -".to_string(),
    };
    lines.push(vec![ColoredText::new(gains, PrinterColor::White)]);

    let (bridge, bridge_color) = if snapshot.actuator.is_engaged() {
        ("ON", PrinterColor::Green)
    } else {
        ("OFF", PrinterColor::Red)
    };
    lines.push(vec![
        ColoredText::new("Multi-Halfbridge: ", PrinterColor::White),
        ColoredText::new(bridge, bridge_color),
    ]);

    let tuning = if snapshot.tuning.active {
        ColoredText::new(
            format!("running (iteration {})", snapshot.tuning.iteration_count),
            PrinterColor::Yellow,
        )
    } else {
        ColoredText::new("idle", PrinterColor::White)
    };
    lines.push(vec![ColoredText::new("Tuning: ", PrinterColor::White), tuning]);

    if let LinkStatus::Faulted(reason) = &snapshot.link {
        lines.push(vec![ColoredText::new(
            format!("Link faulted: {reason}"),
            PrinterColor::BoldRed,
        )]);
    }

    lines.push(vec![ColoredText::new(
        "Best Combinations:",
        PrinterColor::BoldCyan,
    )]);
    for rank in 0..LEADERBOARD_CAPACITY {
        let text = match snapshot.leaderboard.get(rank) {
            Some(trial) => format!("{}. {}, error: {:.2}", rank + 1, trial.gains, trial.error),
            None => format!("{}. -", rank + 1),
        };
        lines.push(vec![ColoredText::new(text, PrinterColor::White)]);
    }

    lines.push(vec![ColoredText::new(
        format!(
            "Frames: {} accepted, {} rejected",
            snapshot.telemetry.accepted, snapshot.telemetry.rejected
        ),
        PrinterColor::White,
    )]);
    lines
}

pub fn print_status(snapshot: &Snapshot, printer: &Printer) {
    for line in render_status(snapshot) {
        printer.print_colored(&line);
    }
}
