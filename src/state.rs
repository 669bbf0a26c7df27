//! State shared between the background units and the presentation layer.
//!
//! Every observable value lives in its own single-slot overwrite channel
//! (`tokio::sync::watch`): writers replace the value atomically, readers get
//! the latest copy and may subscribe to changes. Writes go through
//! [`SharedState`], which only the telemetry reader and the coordinator hold;
//! the presentation layer receives a [`StateView`] that can only read.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::gains::GainSet;
use crate::leaderboard::Trial;

/// Number of recent angle samples kept for trial scoring.
pub const SAMPLE_HISTORY: usize = 512;

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Motor power stage ("bridge") state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorState {
    Engaged,
    #[default]
    Disengaged,
}

impl ActuatorState {
    pub fn is_engaged(self) -> bool {
        self == ActuatorState::Engaged
    }

    pub fn toggled(self) -> Self {
        match self {
            ActuatorState::Engaged => ActuatorState::Disengaged,
            ActuatorState::Disengaged => ActuatorState::Engaged,
        }
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorState::Engaged => f.write_str("ON"),
            ActuatorState::Disengaged => f.write_str("OFF"),
        }
    }
}

/// Health of the serial link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Up,
    /// An I/O error ended the session; no more traffic is attempted.
    Faulted(String),
}

impl LinkStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkStatus::Up)
    }
}

/// Tuning progress as seen from outside the coordinator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TuningStatus {
    pub active: bool,
    pub session_id: Option<Uuid>,
    pub iteration_count: u32,
    /// Last gain set written to the firmware.
    pub current_gains: Option<GainSet>,
}

/// Frame counters kept by the telemetry reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// One accepted angle reading with its arrival order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleSample {
    pub seq: u64,
    pub angle: f64,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of everything the presentation layer may show.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub latest_angle: Option<f64>,
    pub tuning: TuningStatus,
    pub leaderboard: Vec<Trial>,
    pub actuator: ActuatorState,
    pub link: LinkStatus,
    pub telemetry: TelemetryStats,
}

// ---------------------------------------------------------------------------
// Shared storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Samples {
    next_seq: u64,
    recent: VecDeque<AngleSample>,
    stats: TelemetryStats,
}

struct Inner {
    angle: watch::Sender<Option<f64>>,
    tuning: watch::Sender<TuningStatus>,
    leaderboard: watch::Sender<Vec<Trial>>,
    actuator: watch::Sender<ActuatorState>,
    link: watch::Sender<LinkStatus>,
    samples: Mutex<Samples>,
}

/// Writer handle, held by the telemetry reader and the coordinator.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Inner>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                angle: watch::Sender::new(None),
                tuning: watch::Sender::new(TuningStatus::default()),
                leaderboard: watch::Sender::new(Vec::new()),
                actuator: watch::Sender::new(ActuatorState::default()),
                link: watch::Sender::new(LinkStatus::Up),
                samples: Mutex::new(Samples::default()),
            }),
        }
    }

    /// Read-only handle for the presentation layer.
    pub fn view(&self) -> StateView {
        StateView {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Replace the latest angle and append it to the sample history.
    pub fn publish_angle(&self, angle: f64) {
        {
            let mut samples = self.inner.samples.lock();
            let seq = samples.next_seq;
            samples.next_seq += 1;
            samples.stats.accepted += 1;
            if samples.recent.len() == SAMPLE_HISTORY {
                samples.recent.pop_front();
            }
            samples.recent.push_back(AngleSample {
                seq,
                angle,
                at: Utc::now(),
            });
        }
        self.inner.angle.send_replace(Some(angle));
    }

    pub fn record_rejected_frame(&self) {
        self.inner.samples.lock().stats.rejected += 1;
    }

    /// Sequence number the next accepted sample will get.
    pub fn sample_mark(&self) -> u64 {
        self.inner.samples.lock().next_seq
    }

    /// Angles accepted at or after `mark`, oldest first.
    pub fn samples_since(&self, mark: u64) -> Vec<f64> {
        self.inner
            .samples
            .lock()
            .recent
            .iter()
            .filter(|s| s.seq >= mark)
            .map(|s| s.angle)
            .collect()
    }

    pub fn publish_tuning(&self, status: TuningStatus) {
        self.inner.tuning.send_replace(status);
    }

    pub fn publish_leaderboard(&self, trials: Vec<Trial>) {
        self.inner.leaderboard.send_replace(trials);
    }

    pub fn publish_actuator(&self, state: ActuatorState) {
        self.inner.actuator.send_replace(state);
    }

    /// Mark the link faulted. The first reason wins.
    pub fn mark_faulted(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.inner.link.send_if_modified(|link| {
            if link.is_up() {
                *link = LinkStatus::Faulted(reason);
                true
            } else {
                false
            }
        });
    }

    pub fn link_is_up(&self) -> bool {
        self.inner.link.borrow().is_up()
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedState")
            .field("snapshot", &self.view().snapshot())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// StateView
// ---------------------------------------------------------------------------

/// Read-only access to the shared state. Every accessor returns a copy.
#[derive(Clone)]
pub struct StateView {
    inner: Arc<Inner>,
}

impl StateView {
    pub fn latest_angle(&self) -> Option<f64> {
        *self.inner.angle.borrow()
    }

    pub fn tuning(&self) -> TuningStatus {
        self.inner.tuning.borrow().clone()
    }

    pub fn leaderboard(&self) -> Vec<Trial> {
        self.inner.leaderboard.borrow().clone()
    }

    pub fn actuator(&self) -> ActuatorState {
        *self.inner.actuator.borrow()
    }

    pub fn link(&self) -> LinkStatus {
        self.inner.link.borrow().clone()
    }

    pub fn telemetry_stats(&self) -> TelemetryStats {
        self.inner.samples.lock().stats
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            latest_angle: self.latest_angle(),
            tuning: self.tuning(),
            leaderboard: self.leaderboard(),
            actuator: self.actuator(),
            link: self.link(),
            telemetry: self.telemetry_stats(),
        }
    }

    pub fn subscribe_angle(&self) -> watch::Receiver<Option<f64>> {
        self.inner.angle.subscribe()
    }

    pub fn subscribe_tuning(&self) -> watch::Receiver<TuningStatus> {
        self.inner.tuning.subscribe()
    }

    pub fn subscribe_leaderboard(&self) -> watch::Receiver<Vec<Trial>> {
        self.inner.leaderboard.subscribe()
    }

    pub fn subscribe_actuator(&self) -> watch::Receiver<ActuatorState> {
        self.inner.actuator.subscribe()
    }

    pub fn subscribe_link(&self) -> watch::Receiver<LinkStatus> {
        self.inner.link.subscribe()
    }
}

impl fmt::Debug for StateView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateView")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let snap = SharedState::new().view().snapshot();
        assert_eq!(snap.latest_angle, None);
        assert!(!snap.tuning.active);
        assert!(snap.leaderboard.is_empty());
        assert_eq!(snap.actuator, ActuatorState::Disengaged);
        assert_eq!(snap.link, LinkStatus::Up);
        assert_eq!(snap.telemetry, TelemetryStats::default());
    }

    #[test]
    fn test_publish_angle_overwrites_and_counts() {
        let state = SharedState::new();
        state.publish_angle(1.5);
        state.publish_angle(-2.0);
        state.record_rejected_frame();
        let view = state.view();
        assert_eq!(view.latest_angle(), Some(-2.0));
        assert_eq!(
            view.telemetry_stats(),
            TelemetryStats {
                accepted: 2,
                rejected: 1
            }
        );
    }

    #[test]
    fn test_samples_since_mark() {
        let state = SharedState::new();
        state.publish_angle(1.0);
        let mark = state.sample_mark();
        state.publish_angle(2.0);
        state.publish_angle(3.0);
        assert_eq!(state.samples_since(mark), vec![2.0, 3.0]);
        assert!(state.samples_since(state.sample_mark()).is_empty());
    }

    #[test]
    fn test_sample_history_is_bounded() {
        let state = SharedState::new();
        for i in 0..(SAMPLE_HISTORY + 10) {
            state.publish_angle(i as f64);
        }
        let all = state.samples_since(0);
        assert_eq!(all.len(), SAMPLE_HISTORY);
        assert_eq!(all[0], 10.0);
    }

    #[test]
    fn test_first_fault_reason_wins() {
        let state = SharedState::new();
        state.mark_faulted("unplugged");
        state.mark_faulted("second");
        assert_eq!(
            state.view().link(),
            LinkStatus::Faulted("unplugged".into())
        );
        assert!(!state.link_is_up());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let state = SharedState::new();
        let mut rx = state.view().subscribe_actuator();
        state.publish_actuator(ActuatorState::Engaged);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ActuatorState::Engaged);
    }

    #[test]
    fn test_actuator_toggle() {
        assert_eq!(
            ActuatorState::Disengaged.toggled(),
            ActuatorState::Engaged
        );
        assert!(ActuatorState::Engaged.is_engaged());
        assert_eq!(ActuatorState::Engaged.to_string(), "ON");
    }
}
