//! Controller gain sets and the deterministic search step.
//!
//! A [`GainSet`] is one candidate configuration for the firmware's balance
//! loop: the three PID gains plus the complementary-filter `alpha`. The
//! search walks the gain space with a fixed additive [`GainStep`] until a
//! [`StopCondition`] fires, so two runs from the same start produce the same
//! candidates.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Gain
// ---------------------------------------------------------------------------

/// One of the four tunable controller parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gain {
    Kp,
    Ki,
    Kd,
    Alpha,
}

impl Gain {
    /// All gains in the order the firmware expects them to be written.
    pub const ORDER: [Gain; 4] = [Gain::Kp, Gain::Ki, Gain::Kd, Gain::Alpha];

    /// Protocol keyword for this gain.
    pub fn keyword(self) -> &'static str {
        match self {
            Gain::Kp => "kp",
            Gain::Ki => "ki",
            Gain::Kd => "kd",
            Gain::Alpha => "alpha",
        }
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// ---------------------------------------------------------------------------
// GainSet
// ---------------------------------------------------------------------------

/// A complete controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainSet {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub alpha: f64,
}

impl Default for GainSet {
    /// The bench starting point used by the firmware bring-up sketches.
    fn default() -> Self {
        Self::new(1.0, 0.5, 0.1, 0.9)
    }
}

impl GainSet {
    pub const fn new(kp: f64, ki: f64, kd: f64, alpha: f64) -> Self {
        Self { kp, ki, kd, alpha }
    }

    /// Value of a single gain.
    pub fn get(&self, gain: Gain) -> f64 {
        match gain {
            Gain::Kp => self.kp,
            Gain::Ki => self.ki,
            Gain::Kd => self.kd,
            Gain::Alpha => self.alpha,
        }
    }

    /// `(gain, value)` pairs in protocol order.
    pub fn entries(&self) -> [(Gain, f64); 4] {
        Gain::ORDER.map(|g| (g, self.get(g)))
    }

    pub fn is_finite(&self) -> bool {
        self.entries().iter().all(|(_, v)| v.is_finite())
    }
}

impl fmt::Display for GainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kp: {:?}, ki: {:?}, kd: {:?}, alpha: {:?}",
            self.kp, self.ki, self.kd, self.alpha
        )
    }
}

// ---------------------------------------------------------------------------
// GainStep
// ---------------------------------------------------------------------------

/// Additive per-gain deltas applied after every trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainStep {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub alpha: f64,
}

impl Default for GainStep {
    fn default() -> Self {
        Self {
            kp: 0.1,
            ki: 0.05,
            kd: 0.01,
            alpha: -0.01,
        }
    }
}

impl GainStep {
    pub fn get(&self, gain: Gain) -> f64 {
        match gain {
            Gain::Kp => self.kp,
            Gain::Ki => self.ki,
            Gain::Kd => self.kd,
            Gain::Alpha => self.alpha,
        }
    }

    /// Next candidate after `gains`.
    pub fn apply(&self, gains: &GainSet) -> GainSet {
        GainSet {
            kp: gains.kp + self.kp,
            ki: gains.ki + self.ki,
            kd: gains.kd + self.kd,
            alpha: gains.alpha + self.alpha,
        }
    }

    pub fn is_finite(&self) -> bool {
        Gain::ORDER.iter().all(|g| self.get(*g).is_finite())
    }
}

// ---------------------------------------------------------------------------
// StopCondition
// ---------------------------------------------------------------------------

/// Which side of the threshold ends the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    /// Stop once the gain is `<=` the threshold.
    AtOrBelow,
    /// Stop once the gain is `>=` the threshold.
    AtOrAbove,
}

/// Natural end of a tuning session: one gain crossing a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopCondition {
    pub gain: Gain,
    pub threshold: f64,
    pub crossing: Crossing,
}

impl Default for StopCondition {
    fn default() -> Self {
        Self {
            gain: Gain::Alpha,
            threshold: 0.5,
            crossing: Crossing::AtOrBelow,
        }
    }
}

impl StopCondition {
    pub fn is_met(&self, gains: &GainSet) -> bool {
        let value = gains.get(self.gain);
        match self.crossing {
            Crossing::AtOrBelow => value <= self.threshold,
            Crossing::AtOrAbove => value >= self.threshold,
        }
    }

    /// Whether repeatedly applying `step` from `start` ever meets the
    /// condition.
    pub fn reachable_from(&self, start: &GainSet, step: &GainStep) -> bool {
        if self.is_met(start) {
            return true;
        }
        let delta = step.get(self.gain);
        match self.crossing {
            Crossing::AtOrBelow => delta < 0.0,
            Crossing::AtOrAbove => delta > 0.0,
        }
    }
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.crossing {
            Crossing::AtOrBelow => "<=",
            Crossing::AtOrAbove => ">=",
        };
        write!(f, "{} {} {:?}", self.gain, op, self.threshold)
    }
}
