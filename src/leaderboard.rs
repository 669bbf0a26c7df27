//! Trials and the bounded best-trials ranking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gains::GainSet;

/// How many trials the leaderboard keeps.
pub const LEADERBOARD_CAPACITY: usize = 3;

/// One evaluated gain set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// 1-based iteration within the session that produced this trial.
    pub iteration: u32,
    pub gains: GainSet,
    /// Lower is better.
    pub error: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Trial {
    pub fn new(iteration: u32, gains: GainSet, error: f64) -> Self {
        Self {
            iteration,
            gains,
            error,
            recorded_at: Utc::now(),
        }
    }
}

/// Best trials so far, sorted ascending by error.
///
/// Ties keep insertion order, so an earlier trial outranks a later one with
/// the same error.
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    entries: Vec<Trial>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trial, re-sort and truncate to [`LEADERBOARD_CAPACITY`].
    ///
    /// Returns the 0-based rank the trial landed on, or `None` if it did not
    /// make the cut.
    pub fn insert(&mut self, trial: Trial) -> Option<usize> {
        // `entries` is always sorted, so the rank is the count of entries
        // that are not worse than the newcomer.
        let rank = self
            .entries
            .partition_point(|t| t.error.total_cmp(&trial.error).is_le());
        if rank >= LEADERBOARD_CAPACITY {
            return None;
        }
        self.entries.insert(rank, trial);
        self.entries.truncate(LEADERBOARD_CAPACITY);
        Some(rank)
    }

    /// Owned copy for display; the live ranking is never handed out.
    pub fn snapshot(&self) -> Vec<Trial> {
        self.entries.clone()
    }

    pub fn best(&self) -> Option<&Trial> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
