//! Line protocol spoken with the robot controller.
//!
//! Outbound frames are single-line text commands. Inbound frames are either
//! angle telemetry (`Angle: 12.5` or a bare number) or free-form replies the
//! firmware prints after handling a command.

use std::fmt;

use crate::error::TelemetryError;
use crate::gains::{Gain, GainSet};

/// Label the firmware may put in front of an angle reading.
pub const TELEMETRY_PREFIX: &str = "Angle:";

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

/// A command frame for the firmware. `Display` renders the wire text
/// without the trailing newline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    BridgeOn,
    BridgeOff,
    /// Clear the controller's integral and derivative accumulators.
    ResetPid,
    Set(Gain, f64),
}

impl Command {
    /// The `reset_pid` + four parameter frames that apply one gain set, in
    /// the order the firmware must receive them.
    pub fn apply_sequence(gains: &GainSet) -> [Command; 5] {
        let [kp, ki, kd, alpha] = gains.entries();
        [
            Command::ResetPid,
            Command::Set(kp.0, kp.1),
            Command::Set(ki.0, ki.1),
            Command::Set(kd.0, kd.1),
            Command::Set(alpha.0, alpha.1),
        ]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::BridgeOn => f.write_str("bridge on"),
            Command::BridgeOff => f.write_str("bridge off"),
            Command::ResetPid => f.write_str("reset_pid"),
            // `{:?}` keeps the decimal point on whole numbers ("1.0", not "1").
            Command::Set(gain, value) => write!(f, "{} {:?}", gain.keyword(), value),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound telemetry
// ---------------------------------------------------------------------------

/// Decode one telemetry frame into an angle, in the firmware's unit.
pub fn parse_telemetry(frame: &str) -> Result<f64, TelemetryError> {
    let payload = frame.trim();
    let payload = payload
        .strip_prefix(TELEMETRY_PREFIX)
        .map(str::trim)
        .unwrap_or(payload);

    let angle: f64 = payload.parse().map_err(|_| TelemetryError::Malformed {
        frame: frame.to_string(),
    })?;
    if !angle.is_finite() {
        return Err(TelemetryError::NonFinite {
            frame: frame.to_string(),
        });
    }
    Ok(angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_text() {
        assert_eq!(Command::BridgeOn.to_string(), "bridge on");
        assert_eq!(Command::BridgeOff.to_string(), "bridge off");
        assert_eq!(Command::ResetPid.to_string(), "reset_pid");
        assert_eq!(Command::Set(Gain::Kp, 1.0).to_string(), "kp 1.0");
        assert_eq!(Command::Set(Gain::Alpha, 0.89).to_string(), "alpha 0.89");
    }

    #[test]
    fn test_apply_sequence_order() {
        let frames: Vec<String> = Command::apply_sequence(&GainSet::new(1.0, 0.5, 0.1, 0.9))
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            frames,
            ["reset_pid", "kp 1.0", "ki 0.5", "kd 0.1", "alpha 0.9"]
        );
    }

    #[test]
    fn test_parse_prefixed_and_bare() {
        assert_eq!(parse_telemetry("Angle: 12.5"), Ok(12.5));
        assert_eq!(parse_telemetry("Angle:-3.0"), Ok(-3.0));
        assert_eq!(parse_telemetry("  7.25 "), Ok(7.25));
    }

    #[test]
    fn test_parse_rejects_garbage_and_empty() {
        assert!(matches!(
            parse_telemetry("garbage"),
            Err(TelemetryError::Malformed { .. })
        ));
        assert!(matches!(
            parse_telemetry(""),
            Err(TelemetryError::Malformed { .. })
        ));
        assert!(matches!(
            parse_telemetry("Angle:"),
            Err(TelemetryError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        assert!(matches!(
            parse_telemetry("Angle: NaN"),
            Err(TelemetryError::NonFinite { .. })
        ));
        assert!(matches!(
            parse_telemetry("inf"),
            Err(TelemetryError::NonFinite { .. })
        ));
    }
}
