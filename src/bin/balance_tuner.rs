//! balance-tuner operator console.
//!
//! Opens the robot's serial port, starts telemetry and the tuning
//! coordinator, then reads commands from stdin until `exit` or Ctrl-C.
//!
//! # Environment Variables
//!
//! - `BALANCE_TUNER_PORT`: serial endpoint, overridden by `--port`
//! - `RUST_LOG`: tracing filter (default: "info,balance_tuner=debug")
//!
//! # Usage
//!
//! ```bash
//! balance-tuner --port /dev/ttyUSB0 --baud 9600
//! balance-tuner --config tuner.yaml --results trials.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use balance_tuner::console::{self, Printer, PrinterColor};
use balance_tuner::{Tuner, TunerConfig, VERSION};

/// Serial controller and PID auto-tuner for a self-balancing robot.
#[derive(Parser, Debug)]
#[command(name = "balance-tuner", version, about)]
struct Cli {
    /// Serial endpoint (e.g. /dev/ttyUSB0 or COM63).
    #[arg(long, short)]
    port: Option<String>,

    /// Baud rate of the serial link.
    #[arg(long, short)]
    baud: Option<u32>,

    /// Read timeout of the serial link, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// YAML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write a JSON report here whenever a tuning session ends.
    #[arg(long, short)]
    results: Option<PathBuf>,
}

impl Cli {
    fn resolve(&self) -> anyhow::Result<TunerConfig> {
        let mut config = match &self.config {
            Some(path) => TunerConfig::from_yaml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TunerConfig::default(),
        };
        config.apply_env();
        if let Some(port) = &self.port {
            config.link.endpoint = port.clone();
        }
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.link.timeout_ms = timeout_ms;
        }
        if let Some(results) = &self.results {
            config.results_path = Some(results.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,balance_tuner=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve()?;
    tracing::info!(version = VERSION, "balance-tuner starting");

    let tuner = Tuner::open(&config)?;
    let printer = Printer::new();
    printer.print(
        &format!(
            "Connected to {} at {} baud. Type 'help' for commands.",
            tuner.endpoint(),
            config.link.baud_rate
        ),
        PrinterColor::Green,
    );

    // Blocking stdin lives on its own thread so a pending read never holds
    // up runtime shutdown.
    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let view = tuner.view();
    let mut leaderboard = view.subscribe_leaderboard();
    let mut link = view.subscribe_link();

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                match console::parse_command(&line) {
                    Some(command) => {
                        if console::dispatch(&tuner, command, &printer).is_break() {
                            break;
                        }
                    }
                    None => printer.print(
                        &format!("unknown command {:?}, try 'help'", line.trim()),
                        PrinterColor::Yellow,
                    ),
                }
            }
            changed = leaderboard.changed() => {
                if changed.is_err() {
                    break;
                }
                console::print_status(&view.snapshot(), &printer);
            }
            changed = link.changed() => {
                if changed.is_err() {
                    break;
                }
                console::print_status(&view.snapshot(), &printer);
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("interrupted by user");
                break;
            }
        }
    }

    if let Some(report) = tuner.exit().await {
        if let Some(best) = report.best.first() {
            printer.print(
                &format!(
                    "Best of last session: {}, error: {:.2}",
                    best.gains, best.error
                ),
                PrinterColor::BoldCyan,
            );
        }
    }
    Ok(())
}
