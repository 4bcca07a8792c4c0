//! # Motor driver
//!
//! Thin mapping from motor controller operations onto bus transactions.
//! All four wheels are commanded and read as a block, matching the board's
//! register layout.
//!
//! Failures keep the bus layer's contract: writes report a boolean, reads
//! report `None`, and nothing here panics or retries beyond what the
//! channel and [`MotDriver::stop`] already do.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod registers;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};
use std::thread;
use std::time::Duration;

// Internal
use crate::bus::BusChannel;
use registers::*;
use util::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest PWM duty magnitude the controller accepts.
pub const PWM_LIMIT: i8 = 100;

/// Battery readings outside this range are implausible and reported as 0.
///
/// Units: volts
const BATTERY_VALID_RANGE_V: (f64, f64) = (5.0, 15.0);

/// Settle time after each one-time configuration write.
const CONFIG_SETTLE: Duration = Duration::from_millis(100);

/// Retry policy for the stop demand, more persistent than normal writes
/// since a missed stop leaves the robot driving.
const STOP_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_millis(100));

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Driver for the four-channel motor controller board.
pub struct MotDriver {
    channel: BusChannel,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotDriver {
    pub fn new(channel: BusChannel) -> Self {
        Self { channel }
    }

    /// Perform the board's one-time configuration.
    ///
    /// Fire-and-forget: a failed write is logged but not fatal, the board
    /// ships with workable defaults.
    pub fn configure(&self) {
        if self.channel.write_byte(REG_MOTOR_TYPE, MOTOR_TYPE) {
            info!("Motor type set to {}", MOTOR_TYPE);
        } else {
            warn!("Could not set motor type, continuing with board default");
        }
        thread::sleep(CONFIG_SETTLE);

        if self.channel.write_byte(REG_ENCODER_POLARITY, ENCODER_POLARITY) {
            info!("Encoder polarity set to {}", ENCODER_POLARITY);
        } else {
            warn!("Could not set encoder polarity, continuing with board default");
        }
        thread::sleep(CONFIG_SETTLE);
    }

    /// Command all four wheel PWM duties at once.
    ///
    /// Duties are clamped to [-100, 100] before they go out. Returns whether
    /// the write was taken by the board.
    pub fn set_pwm(&self, pwm: &[i8; 4]) -> bool {
        let mut data = [0u8; 4];
        for i in 0..4 {
            data[i] = pwm[i].max(-PWM_LIMIT).min(PWM_LIMIT) as u8;
        }

        self.channel.write_block(REG_FIXED_PWM, &data)
    }

    /// Command all wheels to zero duty, retrying harder than [`set_pwm`].
    ///
    /// Returns whether the board confirmed a zero demand.
    ///
    /// [`set_pwm`]: MotDriver::set_pwm
    pub fn stop(&self) -> bool {
        let stopped = STOP_RETRY.run_bool(|| self.channel.write_block(REG_FIXED_PWM, &[0; 4]));

        if !stopped {
            warn!("Stop demand was not confirmed by the motor controller");
        }

        stopped
    }

    /// Read the accumulated encoder counts of all four wheels.
    ///
    /// `None` means the read failed, which callers must treat differently
    /// from four stationary wheels.
    pub fn encoder_counts(&self) -> Option<[i32; 4]> {
        let data = self.channel.read_block(REG_ENCODER_TOTAL, 16)?;

        let mut counts = [0i32; 4];
        LittleEndian::read_i32_into(&data, &mut counts);
        Some(counts)
    }

    /// Read the battery voltage.
    ///
    /// Returns 0.0 for failed or implausible readings.
    pub fn battery_voltage(&self) -> f64 {
        let data = match self.channel.read_block(REG_BATTERY_MV, 2) {
            Some(d) => d,
            None => return 0.0,
        };

        let voltage = LittleEndian::read_u16(&data) as f64 / 1000.0;

        if voltage > BATTERY_VALID_RANGE_V.0 && voltage < BATTERY_VALID_RANGE_V.1 {
            voltage
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;
    use crate::bus::mock::{MockDevice, Txn};
    use crate::bus::Params;
    use std::time::Instant;

    fn driver_on_mock() -> (MotDriver, crate::bus::mock::MockHandle) {
        let (dev, mock) = MockDevice::new();
        let params = Params {
            min_txn_interval_s: 0.0,
            txn_attempts: 2,
            txn_retry_backoff_s: 0.0,
            ..Params::default()
        };
        (MotDriver::new(BusChannel::new(Box::new(dev), &params)), mock)
    }

    #[test]
    fn test_set_pwm_encoding_and_clamp() {
        let (driver, mock) = driver_on_mock();

        assert!(driver.set_pwm(&[120, -120, 50, -50]));

        // Clamped to +-100, negatives as two's complement bytes
        assert_eq!(
            mock.block_writes_to(REG_FIXED_PWM),
            vec![vec![100, 156, 50, 206]]
        );
    }

    #[test]
    fn test_encoder_decode() {
        let (driver, mock) = driver_on_mock();

        let mut data = vec![0u8; 16];
        LittleEndian::write_i32_into(&[1, -1, 0x12345678, -2], &mut data);
        mock.push_read(data);

        assert_eq!(driver.encoder_counts(), Some([1, -1, 0x12345678, -2]));
    }

    #[test]
    fn test_encoder_read_failure_is_none() {
        let (driver, mock) = driver_on_mock();

        mock.fail_next(10);
        assert_eq!(driver.encoder_counts(), None);
    }

    #[test]
    fn test_stop_first_try() {
        let (driver, mock) = driver_on_mock();

        assert!(driver.stop());
        assert_eq!(mock.txns(), vec![Txn::WriteBlock(REG_FIXED_PWM, vec![0; 4])]);
    }

    #[test]
    fn test_stop_gives_up_after_three_attempts() {
        let (driver, mock) = driver_on_mock();

        mock.fail_next(100);
        let start = Instant::now();
        assert!(!driver.stop());

        // 3 stop attempts, each a 2-attempt bus write, 100 ms apart
        assert_eq!(mock.txn_count(), 6);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_battery_plausibility_bounds() {
        let (driver, mock) = driver_on_mock();

        mock.push_read(vec![0xE8, 0x1C]);
        assert!((driver.battery_voltage() - 7.4).abs() < 1e-9);

        // 0 V and 16 V are both outside the plausible window
        mock.push_read(vec![0x00, 0x00]);
        assert_eq!(driver.battery_voltage(), 0.0);

        mock.push_read(vec![0x80, 0x3E]);
        assert_eq!(driver.battery_voltage(), 0.0);
    }

    #[test]
    fn test_configure_is_fire_and_forget() {
        let (driver, mock) = driver_on_mock();

        driver.configure();
        assert_eq!(
            mock.txns(),
            vec![
                Txn::WriteByte(REG_MOTOR_TYPE, MOTOR_TYPE),
                Txn::WriteByte(REG_ENCODER_POLARITY, ENCODER_POLARITY),
            ]
        );

        // A failing board does not stop configuration
        let (driver, mock) = driver_on_mock();
        mock.fail_next(100);
        driver.configure();
        assert_eq!(mock.txn_count(), 4);
    }
}
