//! # Simulated motor controller
//!
//! Stands in for the I2C motor controller board on development machines.
//! PWM demands are integrated into encoder counts at the board's full-scale
//! wheel rate, so the closed loop sees plausible encoder motion and odometry
//! accumulates as it would on the robot.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use std::f64::consts::PI;
use std::time::Instant;

// Internal
use super::{BusError, RegisterBus};
use crate::mot_driver::registers::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Wheel rate the simulated motors reach at full PWM.
///
/// Units: radians/second
const SIM_FULL_SCALE_RADS: f64 = 50.0;

/// Encoder resolution of the simulated motors.
///
/// Units: counts/revolution
const SIM_COUNTS_PER_REV: f64 = 1560.0;

/// Battery voltage the simulated board reports.
///
/// Units: millivolts
const SIM_BATTERY_MV: u16 = 7400;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulated motor controller board.
pub struct SimBus {
    /// Last commanded PWM duties.
    pwm: [i8; 4],

    /// Accumulated encoder counts, kept fractional between reads.
    counts: [f64; 4],

    /// Time the counts were last brought up to date.
    last_integration: Instant,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimBus {
    pub fn new() -> Self {
        debug!("Using simulated motor controller");

        Self {
            pwm: [0; 4],
            counts: [0.0; 4],
            last_integration: Instant::now(),
        }
    }

    /// Advance the encoder counts to the present using the current PWM.
    fn integrate(&mut self) {
        let now = Instant::now();
        let dt_s = now.duration_since(self.last_integration).as_secs_f64();
        self.last_integration = now;

        for i in 0..4 {
            let rate_rads = self.pwm[i] as f64 / 100.0 * SIM_FULL_SCALE_RADS;
            self.counts[i] += rate_rads * dt_s * SIM_COUNTS_PER_REV / (2.0 * PI);
        }
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimBus {
    fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        match reg {
            REG_FIXED_PWM => {
                if data.len() != 4 {
                    return Err(BusError::TransactionFailed(format!(
                        "PWM write wants 4 bytes, got {}",
                        data.len()
                    )));
                }

                // Counts must reflect the outgoing PWM up to this instant
                self.integrate();

                for i in 0..4 {
                    self.pwm[i] = data[i] as i8;
                }

                trace!("SIM: PWM set to {:?}", self.pwm);
            }
            _ => trace!("SIM: block write to 0x{:02X}: {:?}", reg, data),
        }

        Ok(())
    }

    fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        match reg {
            REG_MOTOR_TYPE => debug!("SIM: motor type set to {}", value),
            REG_ENCODER_POLARITY => debug!("SIM: encoder polarity set to {}", value),
            _ => trace!("SIM: byte write to 0x{:02X}: {}", reg, value),
        }

        Ok(())
    }

    fn read_block(&mut self, reg: u8, len: usize) -> Result<Vec<u8>, BusError> {
        let mut data = match reg {
            REG_ENCODER_TOTAL => {
                self.integrate();

                let mut buf = vec![0u8; 16];
                for i in 0..4 {
                    LittleEndian::write_i32(&mut buf[4 * i..4 * (i + 1)], self.counts[i] as i32);
                }
                buf
            }
            REG_BATTERY_MV => {
                let mut buf = vec![0u8; 2];
                LittleEndian::write_u16(&mut buf, SIM_BATTERY_MV);
                buf
            }
            _ => {
                trace!("SIM: read of unmodelled register 0x{:02X}", reg);
                vec![0u8; len]
            }
        };

        // The board answers exactly as many bytes as were asked for
        data.resize(len, 0);
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_counts_track_pwm() {
        let mut sim = SimBus::new();

        sim.write_block(REG_FIXED_PWM, &[50, 50, (-50i8) as u8, 0])
            .unwrap();
        thread::sleep(Duration::from_millis(100));

        let data = sim.read_block(REG_ENCODER_TOTAL, 16).unwrap();
        assert_eq!(data.len(), 16);

        let w0 = LittleEndian::read_i32(&data[0..4]);
        let w2 = LittleEndian::read_i32(&data[8..12]);
        let w3 = LittleEndian::read_i32(&data[12..16]);

        // Half PWM for 0.1 s is roughly 620 counts
        assert!(w0 > 300, "wheel 0 counts {} not advancing", w0);
        assert!(w2 < -300, "wheel 2 counts {} not reversed", w2);
        assert_eq!(w3, 0);
    }

    #[test]
    fn test_battery_reads_nominal() {
        let mut sim = SimBus::new();

        let data = sim.read_block(REG_BATTERY_MV, 2).unwrap();
        let mv = LittleEndian::read_u16(&data);
        assert_eq!(mv, 7400);
    }

    #[test]
    fn test_bad_pwm_length_rejected() {
        let mut sim = SimBus::new();
        assert!(sim.write_block(REG_FIXED_PWM, &[0, 0]).is_err());
    }
}
