//! # Velocity control module parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

use crate::pid;
use super::NUM_WHEELS;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the velocity control module.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Proportional gain applied to every wheel loop.
    ///
    /// Units: PWM duty per radian per second
    pub kp: f64,

    /// Integral gain applied to every wheel loop.
    ///
    /// Units: PWM duty per radian
    pub ki: f64,

    /// Derivative gain applied to every wheel loop.
    ///
    /// Units: PWM duty seconds per radian
    pub kd: f64,

    /// Encoder counts per full wheel revolution.
    ///
    /// Units: counts/revolution
    pub counts_per_rev: f64,

    /// Wheel rates with a magnitude above this value are treated as encoder
    /// glitches and replaced with zero.
    ///
    /// Units: radians/second
    pub wheel_speed_glitch_rads: f64,

    /// Sign of each wheel's drive direction relative to the kinematic
    /// model, in the order front left, front right, rear left, rear right.
    ///
    /// Units: none (each entry must be +1.0 or -1.0)
    pub wheel_polarity: [f64; NUM_WHEELS],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which indicate that the loaded parameters are invalid.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("counts_per_rev must be positive but is {0}")]
    NonPositiveCountsPerRev(f64),

    #[error("wheel_speed_glitch_rads must be positive but is {0}")]
    NonPositiveGlitchBound(f64),

    #[error("wheel_polarity entries must be +1.0 or -1.0 but entry {0} is {1}")]
    BadPolarity(usize, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Perform a validity check on the loaded parameters.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.counts_per_rev <= 0.0 {
            return Err(ParamsError::NonPositiveCountsPerRev(self.counts_per_rev));
        }

        if self.wheel_speed_glitch_rads <= 0.0 {
            return Err(ParamsError::NonPositiveGlitchBound(
                self.wheel_speed_glitch_rads,
            ));
        }

        for (i, p) in self.wheel_polarity.iter().enumerate() {
            if (p.abs() - 1.0).abs() > f64::EPSILON {
                return Err(ParamsError::BadPolarity(i, *p));
            }
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            kp: pid::DEFAULT_KP,
            ki: pid::DEFAULT_KI,
            kd: pid::DEFAULT_KD,
            counts_per_rev: 1560.0,
            wheel_speed_glitch_rads: 200.0,
            wheel_polarity: [1.0, -1.0, -1.0, 1.0],
        }
    }
}
