//! # Velocity control module
//!
//! The closed loop at the heart of the executive. Each cycle takes a body
//! velocity demand, turns it into wheel rate targets through the kinematic
//! model, measures actual wheel rates from encoder deltas, runs one PID
//! step per wheel and emits corrected PWM duties. The same measurement
//! feeds the dead-reckoning odometry, so control and pose estimation never
//! disagree about what the wheels did.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of driven wheels on the chassis.
pub const NUM_WHEELS: usize = 4;
