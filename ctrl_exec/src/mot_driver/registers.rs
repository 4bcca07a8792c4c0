//! # Motor controller register map
//!
//! Addresses and magic values for the four-channel motor controller board,
//! fixed by its firmware.

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// I2C address of the motor controller board.
pub const CONTROLLER_ADDR: u16 = 0x34;

/// Battery voltage, 2 bytes, little-endian millivolts.
pub const REG_BATTERY_MV: u8 = 0x00;

/// Motor type selection, 1 byte, written once at startup.
pub const REG_MOTOR_TYPE: u8 = 0x14;

/// Encoder polarity selection, 1 byte, written once at startup.
pub const REG_ENCODER_POLARITY: u8 = 0x15;

/// Fixed PWM duty for all four motors, 4 signed bytes in [-100, 100].
pub const REG_FIXED_PWM: u8 = 0x33;

/// Accumulated encoder counts, 16 bytes, four little-endian `i32`s in wheel
/// order front-left, front-right, rear-left, rear-right.
pub const REG_ENCODER_TOTAL: u8 = 0x3C;

/// Motor type fitted to the chassis (JGB37-520 geared motors).
pub const MOTOR_TYPE: u8 = 3;

/// Encoder polarity matching the chassis wiring.
pub const ENCODER_POLARITY: u8 = 0;
