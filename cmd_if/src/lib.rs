//! # Command interface library
//!
//! This library defines the command and telemetry interface of the robot's
//! control executive: the JSON command envelopes a front end sends in, and
//! the response structures the executive sends back. Keeping both in one
//! crate lets the executive and any client agree on the wire format by
//! construction.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Command envelopes - parsing of incoming JSON commands.
pub mod cmd;

/// Telemetry - response and status structures returned by the executive.
pub mod tm;
