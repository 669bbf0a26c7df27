//! # balance-tuner
//!
//! Host-side auto-tuner for a self-balancing robot. The robot's firmware
//! runs its own PID loop and talks newline-delimited text over a serial
//! link: it streams tilt angles (`Angle: 12.5`) and accepts commands
//! (`bridge on`, `reset_pid`, `kp 1.0`, ...). This crate streams that
//! telemetry into shared state, sweeps PID gain sets through the firmware,
//! scores each one and keeps the three best.
//!
//! The pieces:
//!
//! - [`transport`]: the exclusive serial link and its line framing.
//! - [`telemetry`]: background reader publishing angles.
//! - [`tuning`]: the coordinator running the gain search.
//! - [`state`]: shared state and its read-only [`StateView`].
//! - [`session`]: the [`Tuner`] handle wiring it all together.
//! - [`console`]: the operator's text console.

pub mod config;
pub mod console;
pub mod error;
pub mod gains;
pub mod leaderboard;
pub mod protocol;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod transport;
pub mod tuning;

pub use config::TunerConfig;
pub use error::{ConfigError, ReportError, TelemetryError, TransportError};
pub use gains::{Gain, GainSet, GainStep, StopCondition};
pub use leaderboard::{Leaderboard, Trial};
pub use session::Tuner;
pub use state::{Snapshot, StateView};
pub use tuning::{ErrorMetric, MetricConfig, SearchPlan, SessionEnd, TuningReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
