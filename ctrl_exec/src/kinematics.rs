//! # Mecanum chassis kinematics
//!
//! Pure maths relating body-frame velocity to the four wheel angular
//! velocities. The forward map is the fixed 4x3 kinematic matrix `W` built
//! from the chassis geometry; the reverse map is its Moore-Penrose
//! pseudo-inverse. Both are computed once at construction and never change.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3x4, Matrix4x3, Vector3, Vector4};
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Chassis geometry parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Wheel radius.
    ///
    /// Units: meters
    pub wheel_radius_m: f64,

    /// Half the front-to-back wheel separation.
    ///
    /// Units: meters
    pub half_wheelbase_m: f64,

    /// Half the left-to-right wheel separation.
    ///
    /// Units: meters
    pub half_track_m: f64,

    /// Fastest the motors can spin a wheel. Demands are scaled down as a
    /// set so no wheel is asked to exceed this.
    ///
    /// Units: radians/second
    pub wheel_speed_max_rads: f64,
}

/// A body-frame velocity demand or estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyVel {
    /// Velocity along the forward axis.
    ///
    /// Units: meters/second
    pub vx_ms: f64,

    /// Velocity along the left axis.
    ///
    /// Units: meters/second
    pub vy_ms: f64,

    /// Rotation rate, positive anticlockwise when viewed from above.
    ///
    /// Units: radians/second
    pub omega_rads: f64,
}

/// The chassis kinematic model.
#[derive(Debug, Clone, Copy)]
pub struct MecanumModel {
    /// Body velocity to wheel velocities.
    fwd: Matrix4x3<f64>,

    /// Wheel velocities to body velocity (pseudo-inverse of `fwd`).
    inv: Matrix3x4<f64>,

    /// Units: radians/second
    wheel_speed_max_rads: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("wheel_radius_m must be positive, got {0}")]
    NonPositiveWheelRadius(f64),

    #[error("Chassis half-dimensions must be positive, got {0} and {1}")]
    NonPositiveHalfDim(f64, f64),

    #[error("wheel_speed_max_rads must be positive, got {0}")]
    NonPositiveSpeedLimit(f64),
}

#[derive(Debug, Error)]
pub enum ModelError {
    /// The geometry produced a kinematic matrix whose normal equations are
    /// singular, so no pseudo-inverse exists.
    #[error("Chassis geometry gives a degenerate kinematic matrix")]
    DegenerateGeometry,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.wheel_radius_m <= 0.0 {
            return Err(ParamsError::NonPositiveWheelRadius(self.wheel_radius_m));
        }

        if self.half_wheelbase_m <= 0.0 || self.half_track_m <= 0.0 {
            return Err(ParamsError::NonPositiveHalfDim(
                self.half_wheelbase_m,
                self.half_track_m,
            ));
        }

        if self.wheel_speed_max_rads <= 0.0 {
            return Err(ParamsError::NonPositiveSpeedLimit(self.wheel_speed_max_rads));
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            wheel_radius_m: 0.048,
            half_wheelbase_m: 0.097,
            half_track_m: 0.109,
            wheel_speed_max_rads: 50.0,
        }
    }
}

impl BodyVel {
    pub fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self {
            vx_ms,
            vy_ms,
            omega_rads,
        }
    }
}

impl MecanumModel {
    /// Build the kinematic model from the chassis geometry.
    pub fn new(params: &Params) -> Result<Self, ModelError> {
        let r_inv = 1.0 / params.wheel_radius_m;
        let k = params.half_wheelbase_m + params.half_track_m;

        // Wheel order front-left, front-right, rear-left, rear-right
        let fwd = Matrix4x3::new(
            r_inv, -r_inv, k * r_inv,
            r_inv, r_inv, k * r_inv,
            r_inv, r_inv, -k * r_inv,
            r_inv, -r_inv, -k * r_inv,
        );

        // Moore-Penrose pseudo-inverse via the normal equations
        let normal = fwd.transpose() * fwd;
        let inv = match normal.try_inverse() {
            Some(n) => n * fwd.transpose(),
            None => return Err(ModelError::DegenerateGeometry),
        };

        Ok(Self {
            fwd,
            inv,
            wheel_speed_max_rads: params.wheel_speed_max_rads,
        })
    }

    /// The wheel speed limit the model scales demands against.
    ///
    /// Units: radians/second
    pub fn wheel_speed_max_rads(&self) -> f64 {
        self.wheel_speed_max_rads
    }

    /// Wheel angular velocity demands for a body velocity.
    ///
    /// When any wheel would exceed the speed limit the whole set is scaled
    /// down together, keeping the direction of travel at reduced speed
    /// rather than distorting it by clipping wheels individually.
    pub fn wheel_speeds(&self, body_vel: &BodyVel) -> [f64; 4] {
        let demand = self.fwd
            * Vector3::new(body_vel.vx_ms, body_vel.vy_ms, body_vel.omega_rads);

        let max_abs = demand.iter().fold(0.0f64, |max, v| max.max(v.abs()));
        let scale = if max_abs > self.wheel_speed_max_rads {
            self.wheel_speed_max_rads / max_abs
        } else {
            1.0
        };

        [
            demand[0] * scale,
            demand[1] * scale,
            demand[2] * scale,
            demand[3] * scale,
        ]
    }

    /// Body velocity estimate from measured wheel angular velocities.
    ///
    /// Takes raw encoder-derived rates, wiring polarity included. The
    /// kinematic frame's axes are swapped and negated relative to the body
    /// frame, the remapping below was verified on the robot and must match
    /// the wheel wiring polarity.
    pub fn body_velocity(&self, wheel_rads: &[f64; 4]) -> BodyVel {
        let r = self.inv
            * Vector4::new(wheel_rads[0], wheel_rads[1], wheel_rads[2], wheel_rads[3]);

        BodyVel {
            vx_ms: -r[1],
            vy_ms: -r[0],
            omega_rads: r[2],
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
