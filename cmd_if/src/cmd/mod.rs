//! # Command module
//!
//! Commands arrive as JSON objects with an `"action"` key naming the
//! operation and the remaining keys carrying that operation's parameters,
//! for example:
//!
//! ```json
//! {"action": "move", "vx": 0.2, "vy": 0.0, "omega": 0.5, "duration": 2.0}
//! ```
//!
//! Parsing is deliberately two-stage: the action key is inspected by hand so
//! a missing or unknown action gets its own error, then the payload is
//! deserialised into the matching parameter struct.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command to the control executive.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    /// Drive at a body-frame velocity for a fixed duration.
    Move(MoveCmd),

    /// Bring all wheels to a stop.
    Stop,

    /// Enable dead-reckoning odometry, resetting the pose to the origin.
    EnableOdometry,

    /// Disable dead-reckoning odometry.
    DisableOdometry,

    /// Overwrite the odometry pose estimate.
    ResetPose(ResetPoseCmd),

    /// Report a status snapshot.
    Status,

    /// Drive back to the odometry origin.
    Home(HomeCmd),

    /// Retune the wheel PID controllers.
    UpdatePid(UpdatePidCmd),

    /// Set the default teleoperation speed profile.
    SetSpeed(SetSpeedCmd),
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum CmdParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Command has no \"action\" string")]
    MissingAction,

    #[error("\"{0}\" is not a recognised action")]
    UnknownAction(String),

    #[error("Invalid payload for \"{action}\": {source}")]
    InvalidPayload {
        action: &'static str,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of a `move` command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveCmd {
    /// Body-frame velocity along the robot's forward axis.
    ///
    /// Units: meters/second
    #[serde(rename = "vx", default)]
    pub vx_ms: f64,

    /// Body-frame velocity along the robot's left axis.
    ///
    /// Units: meters/second
    #[serde(rename = "vy", default)]
    pub vy_ms: f64,

    /// Body rotation rate, positive anticlockwise when viewed from above.
    ///
    /// Units: radians/second
    #[serde(rename = "omega", default)]
    pub omega_rads: f64,

    /// How long to hold the demand for.
    ///
    /// Units: seconds
    #[serde(rename = "duration", default = "default_duration_s")]
    pub duration_s: f64,

    /// Whether to command a full stop once the duration has elapsed.
    #[serde(default = "default_true")]
    pub stop_after: bool,
}

/// Parameters of a `reset_pose` command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResetPoseCmd {
    /// New x position.
    ///
    /// Units: meters
    #[serde(rename = "x", default)]
    pub x_m: f64,

    /// New y position.
    ///
    /// Units: meters
    #[serde(rename = "y", default)]
    pub y_m: f64,

    /// New heading. Note this is given in degrees, front ends deal in
    /// degrees.
    ///
    /// Units: degrees
    #[serde(default)]
    pub theta_deg: f64,
}

/// Parameters of a `home` command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomeCmd {
    /// Radius around the origin inside which the robot counts as home.
    ///
    /// Units: meters
    #[serde(rename = "tolerance", default = "default_home_tolerance_m")]
    pub tolerance_m: f64,

    /// Give up (stopping the robot) after this long.
    ///
    /// Units: seconds
    #[serde(rename = "timeout", default = "default_home_timeout_s")]
    pub timeout_s: f64,
}

/// Parameters of an `update_pid` command. Gains that are not given keep
/// their current value; at least one must be given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdatePidCmd {
    /// New proportional gain.
    #[serde(default)]
    pub kp: Option<f64>,

    /// New integral gain.
    #[serde(default)]
    pub ki: Option<f64>,

    /// New derivative gain.
    #[serde(default)]
    pub kd: Option<f64>,
}

/// Parameters of a `set_speed` command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetSpeedCmd {
    /// Requested default speed profile, clamped by the executive into its
    /// allowed range. When not given the current profile is kept (the
    /// command then just reports it back).
    ///
    /// Units: meters/second
    #[serde(rename = "speed", default)]
    pub speed_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Cmd {
    /// Parse a new command from a JSON envelope.
    pub fn from_json(json_str: &str) -> Result<Self, CmdParseError> {
        // Parse the JSON string into a value
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(CmdParseError::InvalidJson(e)),
        };

        // Get the action of the command
        let action = match val["action"].as_str() {
            Some(s) => String::from(s),
            None => return Err(CmdParseError::MissingAction),
        };

        // Deserialise the payload for the action. Unknown keys in the
        // envelope are ignored, missing ones take their defaults.
        match action.as_str() {
            "move" => Ok(Cmd::Move(Self::payload("move", val)?)),
            "stop" => Ok(Cmd::Stop),
            "enable_odometry" => Ok(Cmd::EnableOdometry),
            "disable_odometry" => Ok(Cmd::DisableOdometry),
            "reset_pose" => Ok(Cmd::ResetPose(Self::payload("reset_pose", val)?)),
            "status" => Ok(Cmd::Status),
            "home" => Ok(Cmd::Home(Self::payload("home", val)?)),
            "update_pid" => Ok(Cmd::UpdatePid(Self::payload("update_pid", val)?)),
            "set_speed" => Ok(Cmd::SetSpeed(Self::payload("set_speed", val)?)),
            _ => Err(CmdParseError::UnknownAction(action)),
        }
    }

    /// The wire name of this command's action.
    pub fn action(&self) -> &'static str {
        match self {
            Cmd::Move(_) => "move",
            Cmd::Stop => "stop",
            Cmd::EnableOdometry => "enable_odometry",
            Cmd::DisableOdometry => "disable_odometry",
            Cmd::ResetPose(_) => "reset_pose",
            Cmd::Status => "status",
            Cmd::Home(_) => "home",
            Cmd::UpdatePid(_) => "update_pid",
            Cmd::SetSpeed(_) => "set_speed",
        }
    }

    /// Deserialise an action's parameter struct out of the whole envelope.
    fn payload<P: serde::de::DeserializeOwned>(
        action: &'static str,
        val: Value,
    ) -> Result<P, CmdParseError> {
        serde_json::from_value(val)
            .map_err(|e| CmdParseError::InvalidPayload { action, source: e })
    }
}

// ---------------------------------------------------------------------------
// DEFAULT VALUE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_duration_s() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_home_tolerance_m() -> f64 {
    0.1
}

fn default_home_timeout_s() -> f64 {
    60.0
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
