//! JSON report of a finished tuning session.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReportError;
use crate::leaderboard::Trial;

/// Why a session went back to idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SessionEnd {
    /// The operator asked to stop.
    Stopped,
    /// The stop condition was met.
    Completed,
    /// The next candidate was not a finite gain set.
    Diverged,
    /// A transport error aborted the session.
    Faulted(String),
    /// The process is exiting.
    Shutdown,
}

/// Everything a session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningReport {
    pub session_id: Uuid,
    pub metric: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end: SessionEnd,
    /// Every committed trial, in iteration order.
    pub trials: Vec<Trial>,
    /// Leaderboard at the moment the session ended.
    pub best: Vec<Trial>,
}

impl TuningReport {
    /// Write the report as pretty-printed JSON, replacing `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        let io_err = |source: std::io::Error| ReportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }
}
