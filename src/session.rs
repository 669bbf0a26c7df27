//! The running tuner: both background units plus the operator handle.
//!
//! [`Tuner::spawn`] takes ownership of an open transport, starts the
//! telemetry reader and the coordinator as tokio tasks and hands back a
//! handle. Operator controls are queued to the coordinator and return
//! immediately. [`Tuner::exit`] flips the shared shutdown flag, joins both
//! tasks and drops the transport.

use std::fmt;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::TunerConfig;
use crate::error::TransportError;
use crate::state::{SharedState, StateView};
use crate::telemetry::TelemetryReader;
use crate::transport::{self, SerialTransport, Transport};
use crate::tuning::{OperatorCommand, TuningCoordinator, TuningReport};

/// Handle to a running tuner.
pub struct Tuner {
    endpoint: String,
    state: SharedState,
    commands: mpsc::UnboundedSender<OperatorCommand>,
    shutdown: watch::Sender<bool>,
    reader: JoinHandle<()>,
    coordinator: JoinHandle<TuningCoordinator>,
}

impl Tuner {
    /// Open the serial endpoint named in `config` and spawn the tuner on it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &TunerConfig) -> Result<Self, TransportError> {
        let link = &config.link;
        let port = SerialTransport::open(&link.endpoint, link.baud_rate, link.timeout())?;
        Ok(Self::spawn(port, config))
    }

    /// Spawn the reader and coordinator tasks over `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(transport: impl Transport + 'static, config: &TunerConfig) -> Self {
        let endpoint = transport.endpoint().to_string();
        let link = transport::shared(transport);
        let state = SharedState::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let reader = TelemetryReader::new(
            link.clone(),
            state.clone(),
            config.timing.poll_interval(),
        );
        let mut coordinator = TuningCoordinator::new(
            link,
            state.clone(),
            config.search,
            config.metric.build(),
            config.coordinator_timing(),
        );
        if let Some(path) = &config.results_path {
            coordinator = coordinator.with_results_path(path);
        }

        let reader = tokio::spawn(reader.run(shutdown_rx.clone()));
        let coordinator = tokio::spawn(coordinator.run(command_rx, shutdown_rx));
        info!(%endpoint, "tuner running");

        Self {
            endpoint,
            state,
            commands,
            shutdown,
            reader,
            coordinator,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Read-only view of the shared state.
    pub fn view(&self) -> StateView {
        self.state.view()
    }

    pub fn toggle_actuator(&self) {
        self.queue(OperatorCommand::ToggleActuator);
    }

    pub fn start_tuning(&self) {
        self.queue(OperatorCommand::StartTuning);
    }

    pub fn stop_tuning(&self) {
        self.queue(OperatorCommand::StopTuning);
    }

    /// Stop both units, release the transport and return the report of the
    /// last session that ended, if any.
    pub async fn exit(self) -> Option<TuningReport> {
        info!(endpoint = %self.endpoint, "tuner exiting");
        self.queue(OperatorCommand::Exit);
        self.shutdown.send_replace(true);

        if let Err(e) = self.reader.await {
            error!(error = %e, "telemetry reader task failed");
        }
        match self.coordinator.await {
            // The coordinator held the last transport handle; dropping it
            // here closes the port.
            Ok(coordinator) => coordinator.last_report().cloned(),
            Err(e) => {
                error!(error = %e, "tuning coordinator task failed");
                None
            }
        }
    }

    fn queue(&self, command: OperatorCommand) {
        if self.commands.send(command).is_err() {
            debug!(?command, "coordinator gone, command dropped");
        }
    }
}

impl fmt::Debug for Tuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuner")
            .field("endpoint", &self.endpoint)
            .field("shutdown", &*self.shutdown.borrow())
            .finish()
    }
}
