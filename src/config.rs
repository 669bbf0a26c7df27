//! Tuner configuration.
//!
//! Values are resolved once at startup: built-in defaults, then an optional
//! YAML file, then the `BALANCE_TUNER_PORT` environment variable, then
//! command-line flags (applied by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::tuning::{MetricConfig, SearchPlan, Timing};

/// Environment variable that overrides [`LinkConfig::endpoint`].
pub const PORT_ENV: &str = "BALANCE_TUNER_PORT";

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub endpoint: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
        }
    }
}

impl LinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Loop intervals, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub command_delay_ms: u64,
    pub iteration_delay_ms: u64,
    /// Wait between the last gain frame and scoring. When unset, the
    /// metric picks its own window.
    pub settle_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            command_delay_ms: 100,
            iteration_delay_ms: 1000,
            settle_ms: None,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Complete tuner configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub link: LinkConfig,
    pub search: SearchPlan,
    pub timing: TimingConfig,
    pub metric: MetricConfig,
    /// Where to write a JSON report when a session ends.
    pub results_path: Option<PathBuf>,
}

impl TunerConfig {
    /// Waits used by the coordinator, with the settle window resolved
    /// against the metric.
    pub fn coordinator_timing(&self) -> Timing {
        let settle = match self.timing.settle_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.metric.default_settle(),
        };
        Timing {
            command_delay: Duration::from_millis(self.timing.command_delay_ms),
            settle,
            iteration_delay: Duration::from_millis(self.timing.iteration_delay_ms),
        }
    }

    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Apply `BALANCE_TUNER_PORT` if it is set and not empty.
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var(PORT_ENV) {
            if !port.trim().is_empty() {
                self.link.endpoint = port.trim().to_string();
            }
        }
    }

    /// Reject values the tuner cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("link.endpoint is empty".into()));
        }
        if self.link.baud_rate == 0 {
            return Err(ConfigError::Invalid("link.baud_rate must be positive".into()));
        }
        if !self.search.initial.is_finite() {
            return Err(ConfigError::Invalid(
                "search.initial gains must be finite".into(),
            ));
        }
        if !self.search.step.is_finite() {
            return Err(ConfigError::Invalid("search.step must be finite".into()));
        }
        if !self.search.stop.threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "search.stop.threshold must be finite".into(),
            ));
        }
        if self.metric.needs_telemetry() && self.coordinator_timing().settle.is_zero() {
            return Err(ConfigError::Invalid(
                "metric settled_angle needs timing.settle_ms > 0".into(),
            ));
        }
        if !self
            .search
            .stop
            .reachable_from(&self.search.initial, &self.search.step)
        {
            warn!(
                stop = %self.search.stop,
                "stop condition is never reached; tuning runs until stopped"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gains::{Crossing, Gain, GainSet, GainStep};
    use crate::tuning::SettledAngleError;
    use std::io::Write;

    #[test]
    fn test_defaults_match_bench_setup() {
        let cfg = TunerConfig::default();
        assert_eq!(cfg.link.baud_rate, 9600);
        assert_eq!(cfg.link.timeout(), Duration::from_secs(1));
        assert_eq!(cfg.search.initial, GainSet::new(1.0, 0.5, 0.1, 0.9));
        assert_eq!(cfg.timing.poll_interval(), Duration::from_millis(100));
        assert_eq!(cfg.coordinator_timing(), Timing::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = TunerConfig::from_yaml_str(
            r#"
link:
  endpoint: /dev/ttyACM0
search:
  stop:
    gain: kp
    threshold: 2.0
    crossing: at_or_above
metric:
  kind: settled_angle
results_path: trials.json
"#,
        )
        .unwrap();
        assert_eq!(cfg.link.endpoint, "/dev/ttyACM0");
        assert_eq!(cfg.link.baud_rate, 9600);
        assert_eq!(cfg.search.stop.gain, Gain::Kp);
        assert_eq!(cfg.search.stop.crossing, Crossing::AtOrAbove);
        assert_eq!(cfg.search.initial, GainSet::default());
        assert_eq!(cfg.metric, MetricConfig::SettledAngle { setpoint: 0.0 });
        assert_eq!(cfg.results_path, Some(PathBuf::from("trials.json")));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(TunerConfig::from_yaml_str("  \n").unwrap(), TunerConfig::default());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timing:\n  command_delay_ms: 5\n  iteration_delay_ms: 0").unwrap();
        let cfg = TunerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(cfg.timing.command_delay_ms, 5);
        assert_eq!(cfg.coordinator_timing().iteration_delay, Duration::ZERO);
        assert_eq!(cfg.timing.poll_interval_ms, 100);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = TunerConfig::from_yaml_file(Path::new("/nonexistent/tuner.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_bad_yaml_is_parse_error() {
        let err = TunerConfig::from_yaml_str("link: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = TunerConfig::default();
        cfg.link.baud_rate = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = TunerConfig::default();
        cfg.search.initial.kd = f64::INFINITY;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = TunerConfig::default();
        cfg.link.endpoint = " ".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_settled_angle_gets_a_settle_window() {
        let cfg = TunerConfig::from_yaml_str("metric:\n  kind: settled_angle\n").unwrap();
        assert_eq!(cfg.timing.settle_ms, None);
        assert_eq!(
            cfg.coordinator_timing().settle,
            SettledAngleError::DEFAULT_SETTLE
        );
        assert!(cfg.validate().is_ok());

        let cfg = TunerConfig::from_yaml_str(
            "metric:\n  kind: settled_angle\ntiming:\n  settle_ms: 250\n",
        )
        .unwrap();
        assert_eq!(cfg.coordinator_timing().settle, Duration::from_millis(250));
    }

    #[test]
    fn test_settled_angle_rejects_zero_settle() {
        let cfg = TunerConfig::from_yaml_str(
            "metric:\n  kind: settled_angle\ntiming:\n  settle_ms: 0\n",
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        // The bench metric ignores telemetry, so no window is fine.
        let cfg = TunerConfig::from_yaml_str("timing:\n  settle_ms: 0\n").unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_gain_entries_fill_defaults() {
        let cfg = TunerConfig::from_yaml_str(
            "search:\n  step:\n    alpha: -0.02\n  initial:\n    kp: 2.0\n  stop:\n    threshold: 0.4\n",
        )
        .unwrap();
        assert_eq!(cfg.search.step.alpha, -0.02);
        assert_eq!(cfg.search.step.kp, GainStep::default().kp);
        assert_eq!(cfg.search.initial, GainSet::new(2.0, 0.5, 0.1, 0.9));
        assert_eq!(cfg.search.stop.threshold, 0.4);
        assert_eq!(cfg.search.stop.gain, Gain::Alpha);
        assert_eq!(cfg.search.stop.crossing, Crossing::AtOrBelow);
    }

    #[test]
    fn test_unreachable_stop_is_only_a_warning() {
        let mut cfg = TunerConfig::default();
        cfg.search.step.alpha = 0.0;
        assert!(cfg.validate().is_ok());
    }
}
