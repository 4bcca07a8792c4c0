//! # Control library.
//!
//! This library holds the modules of the control executive so that tools and
//! tests in the workspace can reach them outside the executable itself.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Bus channel - paced, retrying access to the motor controller bus
pub mod bus;

/// Command processor - background worker draining the command queue
pub mod cmd_proc;

/// Mecanum kinematics - body velocity to wheel rates and back
pub mod kinematics;

/// Motor driver - register level interface to the motor controller board
pub mod mot_driver;

/// Odometry - dead-reckoning pose estimation from wheel rates
pub mod odometry;

/// PID - the per-wheel velocity loop controller
pub mod pid;

/// Robot system - the facade commands execute against
pub mod robot_sys;

/// Velocity control module - the per-cycle closed loop
pub mod vel_ctrl;
