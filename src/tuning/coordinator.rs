//! The auto-tuning coordinator.
//!
//! The coordinator owns the search over gain sets. Each iteration writes one
//! candidate to the firmware (`reset_pid` then `kp`, `ki`, `kd`, `alpha`),
//! scores it, and ranks it on the leaderboard. Operator commands arrive on a
//! channel and are only acted on between iterations, so a trial is either
//! fully applied and recorded or, on a transport failure, discarded.
//!
//! [`TuningCoordinator::run_iteration`] performs exactly one trial and is
//! what the tests drive; [`TuningCoordinator::run`] wraps it in the timed
//! loop used by the live session.

use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::metric::{ErrorMetric, TelemetryWindow};
use super::report::{SessionEnd, TuningReport};
use crate::error::TransportError;
use crate::gains::{GainSet, GainStep, StopCondition};
use crate::leaderboard::{Leaderboard, Trial};
use crate::protocol::{parse_telemetry, Command};
use crate::state::{ActuatorState, LinkStatus, SharedState, TuningStatus};
use crate::transport::SharedTransport;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Operator intents. All of them are fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    ToggleActuator,
    StartTuning,
    StopTuning,
    Exit,
}

/// Where the search starts, how it moves and when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPlan {
    pub initial: GainSet,
    pub step: GainStep,
    pub stop: StopCondition,
}

/// Waits inserted by the coordinator. All of them may be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// After each command frame, before the opportunistic ack read.
    pub command_delay: Duration,
    /// Between the last gain frame and scoring.
    pub settle: Duration,
    /// Between two trials.
    pub iteration_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            command_delay: Duration::from_millis(100),
            settle: Duration::ZERO,
            iteration_delay: Duration::from_secs(1),
        }
    }
}

impl Timing {
    /// No waits at all.
    pub const fn immediate() -> Self {
        Self {
            command_delay: Duration::ZERO,
            settle: Duration::ZERO,
            iteration_delay: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A running search. Exists only while the coordinator is `Running`.
#[derive(Debug, Clone)]
pub struct TuningSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub iteration_count: u32,
    /// Gain set the next iteration will apply.
    pub candidate: GainSet,
    /// Every trial committed in this session.
    pub history: Vec<Trial>,
}

impl TuningSession {
    fn new(initial: GainSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            iteration_count: 0,
            candidate: initial,
            history: Vec::new(),
        }
    }
}

/// What one call to [`TuningCoordinator::run_iteration`] did.
#[derive(Debug)]
pub enum IterationOutcome {
    /// The coordinator is idle; nothing was sent.
    NotRunning,
    /// The trial was recorded and the search continues.
    Recorded(Trial),
    /// The trial was recorded and the session ended.
    Finished(Trial, SessionEnd),
    /// The transport failed mid-trial; the trial was discarded.
    Aborted(TransportError),
}

// ---------------------------------------------------------------------------
// TuningCoordinator
// ---------------------------------------------------------------------------

/// Owns the search loop, the leaderboard and the actuator state.
pub struct TuningCoordinator {
    link: SharedTransport,
    state: SharedState,
    plan: SearchPlan,
    metric: Box<dyn ErrorMetric>,
    timing: Timing,
    results_path: Option<PathBuf>,
    session: Option<TuningSession>,
    status: TuningStatus,
    leaderboard: Leaderboard,
    actuator: ActuatorState,
    last_report: Option<TuningReport>,
}

impl TuningCoordinator {
    pub fn new(
        link: SharedTransport,
        state: SharedState,
        plan: SearchPlan,
        metric: Box<dyn ErrorMetric>,
        timing: Timing,
    ) -> Self {
        Self {
            link,
            state,
            plan,
            metric,
            timing,
            results_path: None,
            session: None,
            status: TuningStatus::default(),
            leaderboard: Leaderboard::new(),
            actuator: ActuatorState::default(),
            last_report: None,
        }
    }

    /// Write a [`TuningReport`] to `path` whenever a session ends.
    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = Some(path.into());
        self
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&TuningSession> {
        self.session.as_ref()
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    pub fn actuator(&self) -> ActuatorState {
        self.actuator
    }

    /// Report of the most recently ended session.
    pub fn last_report(&self) -> Option<&TuningReport> {
        self.last_report.as_ref()
    }

    // -----------------------------------------------------------------------
    // Operator transitions
    // -----------------------------------------------------------------------

    /// Enter `Running` with a fresh session. No-op if already running or if
    /// the link has faulted. Returns whether a session was started.
    pub fn start(&mut self) -> bool {
        if self.session.is_some() {
            debug!("start ignored, already tuning");
            return false;
        }
        if !self.state.link_is_up() {
            warn!("start ignored, serial link is faulted");
            return false;
        }

        let session = TuningSession::new(self.plan.initial);
        info!(
            session = %session.id,
            initial = %self.plan.initial,
            stop = %self.plan.stop,
            metric = self.metric.name(),
            "tuning started"
        );
        self.status.active = true;
        self.status.session_id = Some(session.id);
        self.status.iteration_count = 0;
        self.session = Some(session);
        self.publish_status();
        true
    }

    /// Return to `Idle`. No-op if already idle.
    pub fn stop(&mut self) -> bool {
        if self.session.is_none() {
            debug!("stop ignored, not tuning");
            return false;
        }
        self.end_session(SessionEnd::Stopped);
        true
    }

    /// Flip actuator power. The state only changes once the frame was
    /// written.
    pub async fn toggle_actuator(&mut self) -> Result<ActuatorState, TransportError> {
        if !self.state.link_is_up() {
            return Err(TransportError::Closed);
        }
        let wanted = self.actuator.toggled();
        let command = match wanted {
            ActuatorState::Engaged => Command::BridgeOn,
            ActuatorState::Disengaged => Command::BridgeOff,
        };
        if let Err(e) = self.send_command(command).await {
            self.fault(&e);
            return Err(e);
        }
        self.actuator = wanted;
        self.state.publish_actuator(wanted);
        info!(actuator = %wanted, "actuator toggled");
        Ok(wanted)
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Run one complete trial if a session is active.
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        if self.session.is_none() {
            return IterationOutcome::NotRunning;
        }
        if !self.check_link() {
            return IterationOutcome::Aborted(TransportError::Closed);
        }
        let (gains, iteration) = match &self.session {
            Some(session) => (session.candidate, session.iteration_count + 1),
            None => return IterationOutcome::NotRunning,
        };

        for command in Command::apply_sequence(&gains) {
            if let Err(e) = self.send_command(command).await {
                warn!(iteration, error = %e, "trial aborted, discarding");
                self.fault(&e);
                return IterationOutcome::Aborted(e);
            }
        }
        self.status.current_gains = Some(gains);
        self.publish_status();

        let mark = self.state.sample_mark();
        if !self.timing.settle.is_zero() {
            sleep(self.timing.settle).await;
        }
        let window = TelemetryWindow::new(self.state.samples_since(mark));
        let error = self.metric.score(&gains, &window);
        let trial = Trial::new(iteration, gains, error);

        let rank = self.leaderboard.insert(trial.clone());
        self.state.publish_leaderboard(self.leaderboard.snapshot());
        info!(
            iteration,
            gains = %gains,
            error,
            samples = window.samples.len(),
            rank = ?rank.map(|r| r + 1),
            "trial recorded"
        );

        let next = self.plan.step.apply(&gains);
        if let Some(session) = self.session.as_mut() {
            session.iteration_count = iteration;
            session.history.push(trial.clone());
            session.candidate = next;
        }
        self.status.iteration_count = iteration;
        self.publish_status();

        if !next.is_finite() {
            warn!(next = ?next, "next candidate is not finite");
            self.end_session(SessionEnd::Diverged);
            return IterationOutcome::Finished(trial, SessionEnd::Diverged);
        }
        if self.plan.stop.is_met(&next) {
            self.end_session(SessionEnd::Completed);
            return IterationOutcome::Finished(trial, SessionEnd::Completed);
        }
        IterationOutcome::Recorded(trial)
    }

    /// Drive the coordinator until `Exit`, shutdown, or the command channel
    /// closes. Returns the coordinator so callers can inspect final state.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<OperatorCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        info!("tuning coordinator started");
        let mut link = self.state.view().subscribe_link();
        'outer: loop {
            if *shutdown.borrow() {
                break;
            }
            self.check_link();
            // Commands that queued up while a trial was in flight.
            while let Ok(command) = commands.try_recv() {
                if self.handle(command).await.is_break() {
                    break 'outer;
                }
            }

            if self.is_running() {
                if !matches!(self.run_iteration().await, IterationOutcome::Recorded(_)) {
                    continue;
                }
                let deadline = Instant::now() + self.timing.iteration_delay;
                loop {
                    tokio::select! {
                        _ = sleep_until(deadline) => break,
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break 'outer;
                            }
                            break;
                        }
                        command = commands.recv() => match command {
                            Some(command) => {
                                if self.handle(command).await.is_break() {
                                    break 'outer;
                                }
                                if !self.is_running() {
                                    break;
                                }
                            }
                            None => break 'outer,
                        },
                        _ = link.changed() => {
                            if !self.check_link() {
                                break;
                            }
                        }
                    }
                }
            } else {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    command = commands.recv() => match command {
                        Some(command) => {
                            if self.handle(command).await.is_break() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = link.changed() => {
                        self.check_link();
                    }
                }
            }
        }

        if self.is_running() {
            self.end_session(SessionEnd::Shutdown);
        }
        info!("tuning coordinator stopped");
        self
    }

    async fn handle(&mut self, command: OperatorCommand) -> ControlFlow<()> {
        debug!(?command, "operator command");
        match command {
            OperatorCommand::ToggleActuator => {
                if let Err(e) = self.toggle_actuator().await {
                    warn!(error = %e, "actuator toggle failed");
                }
            }
            OperatorCommand::StartTuning => {
                self.start();
            }
            OperatorCommand::StopTuning => {
                self.stop();
            }
            OperatorCommand::Exit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Write one frame, wait, then read one optional acknowledgement.
    async fn send_command(&self, command: Command) -> Result<(), TransportError> {
        let frame = command.to_string();
        self.link.lock().send(&frame)?;

        if !self.timing.command_delay.is_zero() {
            sleep(self.timing.command_delay).await;
        }
        let reply = self.link.lock().try_receive()?;
        match reply {
            // The reader and this ack read share one stream; keep telemetry
            // that lands here instead of dropping it.
            Some(reply) => match parse_telemetry(&reply) {
                Ok(angle) => self.state.publish_angle(angle),
                Err(_) => debug!(%frame, %reply, "firmware replied"),
            },
            None => debug!(%frame, "no reply"),
        }
        Ok(())
    }

    /// End the session if another unit has marked the link faulted.
    /// Returns whether the link is still up.
    fn check_link(&mut self) -> bool {
        let reason = match self.state.view().link() {
            LinkStatus::Up => return true,
            LinkStatus::Faulted(reason) => reason,
        };
        if self.session.is_some() {
            warn!(%reason, "serial link faulted, ending session");
            self.end_session(SessionEnd::Faulted(reason));
        }
        false
    }

    fn fault(&mut self, e: &TransportError) {
        self.state.mark_faulted(e.to_string());
        if self.session.is_some() {
            self.end_session(SessionEnd::Faulted(e.to_string()));
        }
    }

    fn end_session(&mut self, end: SessionEnd) {
        let Some(session) = self.session.take() else {
            return;
        };
        info!(
            session = %session.id,
            iterations = session.iteration_count,
            end = ?end,
            "tuning ended"
        );

        let report = TuningReport {
            session_id: session.id,
            metric: self.metric.name().to_string(),
            started_at: session.started_at,
            ended_at: Utc::now(),
            end,
            trials: session.history,
            best: self.leaderboard.snapshot(),
        };
        if let Some(path) = &self.results_path {
            match report.write_to(path) {
                Ok(()) => info!(path = %path.display(), "tuning report written"),
                Err(e) => error!(error = %e, "could not write tuning report"),
            }
        }
        self.last_report = Some(report);

        self.status.active = false;
        self.status.session_id = None;
        self.publish_status();
    }

    fn publish_status(&self) {
        self.state.publish_tuning(self.status.clone());
    }
}

impl fmt::Debug for TuningCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TuningCoordinator")
            .field("plan", &self.plan)
            .field("metric", &self.metric.name())
            .field("timing", &self.timing)
            .field("session", &self.session.as_ref().map(|s| s.id))
            .field("leaderboard", &self.leaderboard.len())
            .field("actuator", &self.actuator)
            .finish()
    }
}
