//! Background unit that turns inbound frames into angle telemetry.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::protocol::parse_telemetry;
use crate::state::SharedState;
use crate::transport::SharedTransport;

/// Default pause between polls of the transport.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one poll of the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Nothing complete was buffered.
    Idle,
    /// A frame decoded and the latest angle was replaced.
    Updated(f64),
    /// A frame arrived but did not decode; state is untouched.
    Discarded(String),
}

/// Polls the shared transport and publishes decoded angles.
#[derive(Clone)]
pub struct TelemetryReader {
    link: SharedTransport,
    state: SharedState,
    poll_interval: Duration,
}

impl TelemetryReader {
    pub fn new(link: SharedTransport, state: SharedState, poll_interval: Duration) -> Self {
        Self {
            link,
            state,
            poll_interval,
        }
    }

    /// Read and handle at most one frame.
    pub fn poll_once(&self) -> Result<PollOutcome, TransportError> {
        let frame = match self.link.lock().try_receive()? {
            Some(frame) => frame,
            None => return Ok(PollOutcome::Idle),
        };

        match parse_telemetry(&frame) {
            Ok(angle) => {
                self.state.publish_angle(angle);
                Ok(PollOutcome::Updated(angle))
            }
            Err(e) => {
                warn!(error = %e, "discarding telemetry frame");
                self.state.record_rejected_frame();
                Ok(PollOutcome::Discarded(frame))
            }
        }
    }

    /// Drain every buffered frame. Returns how many frames were handled.
    pub fn drain(&self) -> Result<usize, TransportError> {
        let mut handled = 0;
        while self.poll_once()? != PollOutcome::Idle {
            handled += 1;
        }
        Ok(handled)
    }

    /// Poll until `shutdown` flips to `true` or the link faults.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.poll_interval, "telemetry reader started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if !self.state.link_is_up() {
                debug!("link faulted, telemetry halted");
                break;
            }
            if let Err(e) = self.drain() {
                warn!(error = %e, "telemetry read failed");
                self.state.mark_faulted(e.to_string());
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("telemetry reader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LinkStatus;
    use crate::transport::{self, scripted::ScriptedTransport};

    fn reader_with(script: &ScriptedTransport) -> (TelemetryReader, SharedState) {
        let state = SharedState::new();
        let reader = TelemetryReader::new(
            transport::shared(script.clone()),
            state.clone(),
            Duration::ZERO,
        );
        (reader, state)
    }

    #[test]
    fn test_mixed_stream_yields_two_updates() {
        let script = ScriptedTransport::new();
        for line in ["Angle: 12.5", "garbage", "Angle:-3.0", ""] {
            script.push_line(line);
        }
        let (reader, state) = reader_with(&script);

        let mut updates = Vec::new();
        loop {
            match reader.poll_once().unwrap() {
                PollOutcome::Idle => break,
                PollOutcome::Updated(angle) => updates.push(angle),
                PollOutcome::Discarded(_) => {}
            }
        }

        assert_eq!(updates, vec![12.5, -3.0]);
        let view = state.view();
        assert_eq!(view.latest_angle(), Some(-3.0));
        assert_eq!(view.telemetry_stats().accepted, 2);
        assert_eq!(view.telemetry_stats().rejected, 2);
    }

    #[test]
    fn test_discarded_frame_leaves_angle_untouched() {
        let script = ScriptedTransport::new();
        script.push_line("Angle: 4.0");
        script.push_line("Angle: oops");
        let (reader, state) = reader_with(&script);

        assert_eq!(reader.poll_once().unwrap(), PollOutcome::Updated(4.0));
        assert_eq!(
            reader.poll_once().unwrap(),
            PollOutcome::Discarded("Angle: oops".into())
        );
        assert_eq!(state.view().latest_angle(), Some(4.0));
    }

    #[test]
    fn test_split_frames_reassemble() {
        let script = ScriptedTransport::new();
        script.push_bytes(b"Angle: 1");
        script.push_bytes(b".25\n");
        let (reader, state) = reader_with(&script);

        assert_eq!(reader.drain().unwrap(), 1);
        assert_eq!(state.view().latest_angle(), Some(1.25));
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let script = ScriptedTransport::new();
        script.push_line("Angle: 2.0");
        let (reader, state) = reader_with(&script);
        let (tx, rx) = watch::channel(false);
        let mut angle = state.view().subscribe_angle();

        let handle = tokio::spawn(reader.run(rx));
        angle.changed().await.unwrap();
        tx.send_replace(true);
        handle.await.unwrap();

        assert_eq!(state.view().latest_angle(), Some(2.0));
    }

    #[tokio::test]
    async fn test_receive_failure_faults_link_and_stops() {
        let script = ScriptedTransport::new();
        script.fail_receive();
        let (reader, state) = reader_with(&script);
        let (_tx, rx) = watch::channel(false);

        reader.run(rx).await;

        assert!(matches!(state.view().link(), LinkStatus::Faulted(_)));
    }
}
