//! In-memory transport for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{LineBuffer, Transport};
use crate::error::TransportError;

#[derive(Debug, Default)]
struct Script {
    inbound: LineBuffer,
    queued: VecDeque<Vec<u8>>,
    sent: Vec<String>,
    fail_send_at: Option<usize>,
    fail_receive: bool,
    ack: bool,
}

/// Transport double that records outbound frames and replays inbound bytes.
///
/// Clones share the same script, so a test keeps one clone to inspect
/// traffic after handing the other to the code under test.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue one inbound line; it becomes readable on the next poll.
    pub(crate) fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.script.lock().queued.push_back(bytes);
    }

    pub(crate) fn push_bytes(&self, bytes: &[u8]) {
        self.script.lock().queued.push_back(bytes.to_vec());
    }

    /// Fail the `n`th send (0-based, counted over the transport's lifetime).
    pub(crate) fn fail_send_at(&self, n: usize) {
        self.script.lock().fail_send_at = Some(n);
    }

    pub(crate) fn fail_receive(&self) {
        self.script.lock().fail_receive = true;
    }

    /// Reply `OK <frame>` to every successful send.
    pub(crate) fn ack_commands(&self) {
        self.script.lock().ack = true;
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.script.lock().sent.clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut script = self.script.lock();
        let index = script.sent.len();
        if script.fail_send_at == Some(index) {
            script.fail_send_at = None;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted send failure",
            )));
        }
        script.sent.push(frame.to_string());
        if script.ack {
            script.queued.push_back(format!("OK {frame}\n").into_bytes());
        }
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<String>, TransportError> {
        let mut script = self.script.lock();
        if script.fail_receive {
            return Err(TransportError::Closed);
        }
        while let Some(chunk) = script.queued.pop_front() {
            script.inbound.push(&chunk);
        }
        Ok(script.inbound.next_frame())
    }

    fn endpoint(&self) -> &str {
        "scripted"
    }
}
