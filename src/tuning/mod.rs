//! Gain search: the coordinator, its scoring strategies and session reports.

pub mod coordinator;
pub mod metric;
pub mod report;

pub use coordinator::{
    IterationOutcome, OperatorCommand, SearchPlan, Timing, TuningCoordinator, TuningSession,
};
pub use metric::{ErrorMetric, MetricConfig, SettledAngleError, TargetDistance, TelemetryWindow};
pub use report::{SessionEnd, TuningReport};
