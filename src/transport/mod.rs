//! Exclusive line-oriented link to the robot controller.
//!
//! The [`Transport`] trait is the seam between the tuner and the physical
//! serial port. Both background units share one transport behind a single
//! lock ([`SharedTransport`]), so frames from the coordinator and reads from
//! the telemetry reader never interleave mid-frame.

pub mod framing;

#[cfg(test)]
pub(crate) mod scripted;

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::TransportError;

pub use framing::LineBuffer;

/// A transport shared between the telemetry reader and the coordinator.
///
/// The lock must never be held across an `.await`.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Wrap a transport for sharing between the background units.
pub fn shared(transport: impl Transport + 'static) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Newline-framed, exclusively owned connection to one endpoint.
pub trait Transport: Send {
    /// Write `frame` followed by a single `\n`.
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Return the next complete frame if one is buffered, without blocking.
    fn try_receive(&mut self) -> Result<Option<String>, TransportError>;

    /// Human-readable endpoint name for logs.
    fn endpoint(&self) -> &str;
}

// ---------------------------------------------------------------------------
// SerialTransport
// ---------------------------------------------------------------------------

/// [`Transport`] over a local serial port.
///
/// The port handle is closed when this value is dropped.
pub struct SerialTransport {
    endpoint: String,
    port: Box<dyn serialport::SerialPort>,
    lines: LineBuffer,
}

impl SerialTransport {
    /// Open `endpoint` at `baud_rate`, 8N1, with `timeout` bounding every
    /// blocking read and write.
    pub fn open(endpoint: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(endpoint, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(|source| TransportError::Open {
                endpoint: endpoint.to_string(),
                source,
            })?;

        info!(endpoint, baud_rate, ?timeout, "serial link open");
        Ok(Self {
            endpoint: endpoint.to_string(),
            port,
            lines: LineBuffer::new(),
        })
    }

    /// Move whatever the driver has buffered into the line buffer.
    fn fill(&mut self) -> Result<(), TransportError> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(());
        }
        let mut chunk = vec![0u8; available];
        let read = self.port.read(&mut chunk)?;
        self.lines.push(&chunk[..read]);
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut bytes = Vec::with_capacity(frame.len() + 1);
        bytes.extend_from_slice(frame.as_bytes());
        bytes.push(b'\n');
        self.port.write_all(&bytes)?;
        self.port.flush()?;
        debug!(endpoint = %self.endpoint, frame, "sent");
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<String>, TransportError> {
        if let Some(frame) = self.lines.next_frame() {
            return Ok(Some(frame));
        }
        self.fill()?;
        Ok(self.lines.next_frame())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        info!(endpoint = %self.endpoint, "serial link closed");
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("endpoint", &self.endpoint)
            .field("pending", &self.lines.pending_len())
            .finish()
    }
}
