//! # Wheel PID loop
//!
//! One independent feedback controller per wheel, driving measured wheel
//! rate towards the demanded rate. Outputs are PWM correction units added
//! to the feed-forward demand by the velocity controller.
//!
//! No exceptions and no surprises live here: non-positive timesteps are
//! floored, the integrator and the output are clamped, and that is the
//! whole failure policy.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Instant;

// Internal
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest correction magnitude the loop may output, in PWM units.
pub const OUTPUT_LIMIT: f64 = 100.0;

/// Anti-windup clamp on the integral accumulator.
pub const INTEGRAL_LIMIT: f64 = 30.0;

/// Substitute timestep when two updates land on the same clock reading.
///
/// Units: seconds
const MIN_DT_S: f64 = 0.01;

/// Default proportional gain, tuned on the robot.
pub const DEFAULT_KP: f64 = 1.2;

/// Default integral gain, tuned on the robot.
pub const DEFAULT_KI: f64 = 0.4;

/// Default derivative gain, tuned on the robot.
pub const DEFAULT_KD: f64 = 0.05;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single wheel's feedback controller.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,

    integral: f64,
    prev_error: f64,
    last_time: Instant,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            prev_error: 0.0,
            last_time: Instant::now(),
        }
    }

    /// Advance the loop one step and get the correction to apply.
    pub fn update(&mut self, setpoint: f64, measurement: f64) -> f64 {
        let now = Instant::now();
        let mut dt_s = now.duration_since(self.last_time).as_secs_f64();
        if dt_s <= 0.0 {
            dt_s = MIN_DT_S;
        }

        let error = setpoint - measurement;

        self.integral = clamp(
            self.integral + error * dt_s,
            -INTEGRAL_LIMIT,
            INTEGRAL_LIMIT,
        );

        let output = self.kp * error
            + self.ki * self.integral
            + self.kd * (error - self.prev_error) / dt_s;

        self.prev_error = error;
        self.last_time = now;

        clamp(output, -OUTPUT_LIMIT, OUTPUT_LIMIT)
    }

    /// Drop the accumulated error history and re-stamp time.
    ///
    /// Callers must do this when a motion command starts fresh or after a
    /// gain change, otherwise the derivative term kicks against an error
    /// from an unrelated manoeuvre.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.last_time = Instant::now();
    }

    /// Apply any gains that are given, keeping the others.
    pub fn set_gains(&mut self, kp: Option<f64>, ki: Option<f64>, kd: Option<f64>) {
        if let Some(kp) = kp {
            self.kp = kp;
        }
        if let Some(ki) = ki {
            self.ki = ki;
        }
        if let Some(kd) = kd {
            self.kd = kd;
        }
    }

    pub fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new(DEFAULT_KP, DEFAULT_KI, DEFAULT_KD)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
