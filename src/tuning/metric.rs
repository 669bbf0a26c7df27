//! Trial scoring strategies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gains::GainSet;

/// Angle samples observed while a trial's gains were active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryWindow {
    pub samples: Vec<f64>,
}

impl TelemetryWindow {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean absolute deviation from `setpoint`, `None` for an empty window.
    pub fn mean_abs_deviation(&self, setpoint: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|a| (a - setpoint).abs()).sum();
        Some(total / self.samples.len() as f64)
    }
}

/// Scores a trial. Lower is better.
pub trait ErrorMetric: Send + Sync {
    fn score(&self, gains: &GainSet, window: &TelemetryWindow) -> f64;

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// TargetDistance
// ---------------------------------------------------------------------------

/// Sum of absolute distances of each gain from a fixed target.
///
/// Ignores telemetry entirely, which makes it suitable for bench-testing the
/// search with the motors off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetDistance {
    pub target: GainSet,
}

impl TargetDistance {
    pub const DEFAULT_TARGET: GainSet = GainSet::new(1.2, 0.6, 0.2, 0.7);
}

impl Default for TargetDistance {
    fn default() -> Self {
        Self {
            target: Self::DEFAULT_TARGET,
        }
    }
}

impl ErrorMetric for TargetDistance {
    fn score(&self, gains: &GainSet, _window: &TelemetryWindow) -> f64 {
        (gains.alpha - self.target.alpha).abs()
            + (gains.kp - self.target.kp).abs()
            + (gains.ki - self.target.ki).abs()
            + (gains.kd - self.target.kd).abs()
    }

    fn name(&self) -> &'static str {
        "target_distance"
    }
}

// ---------------------------------------------------------------------------
// SettledAngleError
// ---------------------------------------------------------------------------

/// Mean absolute tilt error over the settle window.
///
/// Only meaningful with a non-zero settle window: the window holds the
/// angles received between the last gain frame and scoring.
///
/// A trial that produced no telemetry scores `f64::INFINITY`, so it can
/// never outrank a measured one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SettledAngleError {
    pub setpoint: f64,
}

impl SettledAngleError {
    /// Settle window used when the config does not name one.
    pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);
}

impl ErrorMetric for SettledAngleError {
    fn score(&self, _gains: &GainSet, window: &TelemetryWindow) -> f64 {
        window
            .mean_abs_deviation(self.setpoint)
            .unwrap_or(f64::INFINITY)
    }

    fn name(&self) -> &'static str {
        "settled_angle"
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Which metric to use, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricConfig {
    TargetDistance {
        #[serde(default = "default_target")]
        target: GainSet,
    },
    SettledAngle {
        #[serde(default)]
        setpoint: f64,
    },
}

fn default_target() -> GainSet {
    TargetDistance::DEFAULT_TARGET
}

impl Default for MetricConfig {
    fn default() -> Self {
        MetricConfig::TargetDistance {
            target: default_target(),
        }
    }
}

impl MetricConfig {
    /// Whether scores depend on telemetry received during the trial.
    pub fn needs_telemetry(&self) -> bool {
        matches!(self, MetricConfig::SettledAngle { .. })
    }

    /// Settle window to use when none is configured.
    pub fn default_settle(&self) -> Duration {
        match self {
            MetricConfig::TargetDistance { .. } => Duration::ZERO,
            MetricConfig::SettledAngle { .. } => SettledAngleError::DEFAULT_SETTLE,
        }
    }

    pub fn build(&self) -> Box<dyn ErrorMetric> {
        match *self {
            MetricConfig::TargetDistance { target } => Box::new(TargetDistance { target }),
            MetricConfig::SettledAngle { setpoint } => Box::new(SettledAngleError { setpoint }),
        }
    }
}
