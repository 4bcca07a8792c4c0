//! # Telemetry module
//!
//! Response structures returned by the control executive. Every command
//! produces exactly one `CmdResponse`, serialised with a `"status"` tag so a
//! front end can switch on one field.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A pose estimate as reported to front ends.
///
/// The heading goes out in degrees, displays deal in degrees while control
/// code deals in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseTm {
    /// Units: meters
    #[serde(rename = "x")]
    pub x_m: f64,

    /// Units: meters
    #[serde(rename = "y")]
    pub y_m: f64,

    /// Units: degrees
    pub theta_deg: f64,
}

/// The shared PID gain set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGainsTm {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// One control cycle's worth of telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleSampleTm {
    /// PWM duty sent to each wheel, in [-100, 100].
    pub pwm: [i8; 4],

    /// Demanded wheel rates.
    ///
    /// Units: radians/second
    pub wheel_demand_rads: [f64; 4],

    /// Measured wheel rates.
    ///
    /// Units: radians/second
    pub wheel_measured_rads: [f64; 4],

    /// Pose estimate at the end of the cycle, when odometry is enabled.
    pub pose: Option<PoseTm>,
}

/// A full status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusTm {
    pub odometry_enabled: bool,

    /// Pose estimate, `null` while odometry is disabled.
    pub pose: Option<PoseTm>,

    /// Current PID gains (shared by all four wheels).
    pub pid: PidGainsTm,

    /// Battery voltage read live from the controller, 0.0 when the reading
    /// failed or was implausible.
    ///
    /// Units: volts
    #[serde(rename = "battery_voltage")]
    pub battery_v: f64,

    /// Number of successful encoder velocity readings since the last reset.
    pub reading_count: u64,

    /// Default teleoperation speed profile.
    ///
    /// Units: meters/second
    #[serde(rename = "speed_profile")]
    pub speed_profile_ms: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Response to a command, tagged by outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CmdResponse {
    /// A move ran to completion.
    MoveCompleted {
        /// Units: seconds
        #[serde(rename = "duration")]
        duration_s: f64,

        /// The last control cycle of the move.
        #[serde(rename = "samples")]
        sample: Option<CycleSampleTm>,
    },

    /// A stop command finished.
    Stopped {
        /// Whether the zero demand was confirmed on the bus.
        ok: bool,
    },

    OdometryEnabled,

    OdometryDisabled,

    /// The pose estimate was overwritten.
    PoseReset {
        /// The new pose, `null` while odometry is disabled.
        pose: Option<PoseTm>,
    },

    /// A status snapshot.
    Status(StatusTm),

    /// Homing reached the origin.
    Home { pose: Option<PoseTm> },

    /// Homing gave up after its timeout. The robot has been stopped; this
    /// is a normal outcome, not an error.
    Timeout { pose: Option<PoseTm> },

    /// PID gains were updated and the controller reset.
    PidUpdated { pid: PidGainsTm },

    /// The speed profile was updated.
    SpeedProfileUpdated {
        /// Units: meters/second
        #[serde(rename = "speed")]
        speed_ms: f64,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseTm {
    /// Build the telemetry form of a pose from its radians representation.
    pub fn new(x_m: f64, y_m: f64, theta_rad: f64) -> Self {
        Self {
            x_m,
            y_m,
            theta_deg: theta_rad.to_degrees(),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_status_tag() {
        let resp = CmdResponse::OdometryEnabled;
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"status":"odometry_enabled"}"#);
    }

    #[test]
    fn test_status_snapshot_fields() {
        let resp = CmdResponse::Status(StatusTm {
            odometry_enabled: true,
            pose: Some(PoseTm::new(1.0, -2.0, std::f64::consts::PI / 2.0)),
            pid: PidGainsTm {
                kp: 1.2,
                ki: 0.4,
                kd: 0.05,
            },
            battery_v: 7.4,
            reading_count: 120,
            speed_profile_ms: 0.5,
        });

        let val: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(val["status"], "status");
        assert_eq!(val["battery_voltage"], 7.4);
        assert_eq!(val["reading_count"], 120);
        assert_eq!(val["speed_profile"], 0.5);
        assert_eq!(val["pose"]["x"], 1.0);
        assert!((val["pose"]["theta_deg"].as_f64().unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_pose_null_when_odometry_disabled() {
        let resp = CmdResponse::PoseReset { pose: None };
        let val: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(val["status"], "pose_reset");
        assert!(val["pose"].is_null());
    }

    #[test]
    fn test_move_completed_round_trip() {
        let resp = CmdResponse::MoveCompleted {
            duration_s: 1.5,
            sample: Some(CycleSampleTm {
                pwm: [41, -41, -41, 41],
                wheel_demand_rads: [20.0, 20.0, 20.0, 20.0],
                wheel_measured_rads: [19.5, -19.9, -20.1, 20.3],
                pose: None,
            }),
        };

        let json = serde_json::to_string(&resp).unwrap();
        let back: CmdResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);

        let val: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val["status"], "move_completed");
        assert_eq!(val["duration"], 1.5);
        assert_eq!(val["samples"]["pwm"][1], -41);
    }

    #[test]
    fn test_outcome_tags() {
        let val = serde_json::to_value(&CmdResponse::Stopped { ok: true }).unwrap();
        assert_eq!(val["status"], "stopped");
        assert_eq!(val["ok"], true);

        let val =
            serde_json::to_value(&CmdResponse::SpeedProfileUpdated { speed_ms: 0.7 }).unwrap();
        assert_eq!(val["status"], "speed_profile_updated");
        assert_eq!(val["speed"], 0.7);
    }
}
