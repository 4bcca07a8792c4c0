//! # Robot system parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the robot system facade.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Period of the move and homing control loops.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Speed profile handed to teleoperation front ends at boot.
    ///
    /// Units: meters/second
    pub default_speed_ms: f64,

    /// Lower bound of the allowed speed profile range.
    ///
    /// Units: meters/second
    pub speed_profile_min_ms: f64,

    /// Upper bound of the allowed speed profile range.
    ///
    /// Units: meters/second
    pub speed_profile_max_ms: f64,

    /// Cap on the homing approach speed, applied per body axis.
    ///
    /// Units: meters/second
    pub home_speed_max_ms: f64,

    /// Gain mapping distance-to-origin to homing approach speed.
    ///
    /// Units: 1/second
    pub home_gain: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which indicate that the loaded parameters are invalid.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("cycle_period_s must be positive but is {0}")]
    NonPositiveCyclePeriod(f64),

    #[error("speed profile range [{0}, {1}] is not a positive, ordered range")]
    BadSpeedProfileRange(f64, f64),

    #[error("default_speed_ms {0} lies outside the speed profile range")]
    DefaultSpeedOutOfRange(f64),

    #[error("home_speed_max_ms must be positive but is {0}")]
    NonPositiveHomeSpeed(f64),

    #[error("home_gain must be positive but is {0}")]
    NonPositiveHomeGain(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Perform a validity check on the loaded parameters.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.cycle_period_s <= 0.0 {
            return Err(ParamsError::NonPositiveCyclePeriod(self.cycle_period_s));
        }

        if self.speed_profile_min_ms <= 0.0
            || self.speed_profile_max_ms <= self.speed_profile_min_ms
        {
            return Err(ParamsError::BadSpeedProfileRange(
                self.speed_profile_min_ms,
                self.speed_profile_max_ms,
            ));
        }

        if self.default_speed_ms < self.speed_profile_min_ms
            || self.default_speed_ms > self.speed_profile_max_ms
        {
            return Err(ParamsError::DefaultSpeedOutOfRange(self.default_speed_ms));
        }

        if self.home_speed_max_ms <= 0.0 {
            return Err(ParamsError::NonPositiveHomeSpeed(self.home_speed_max_ms));
        }

        if self.home_gain <= 0.0 {
            return Err(ParamsError::NonPositiveHomeGain(self.home_gain));
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.1,
            default_speed_ms: 0.5,
            speed_profile_min_ms: 0.1,
            speed_profile_max_ms: 0.9,
            home_speed_max_ms: 0.3,
            home_gain: 0.5,
        }
    }
}
