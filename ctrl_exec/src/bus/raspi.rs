//! # Raspberry Pi I2C backend
//!
//! Talks to the physical motor controller over the Pi's I2C peripheral.
//! Only built for ARM targets, development machines use [`super::sim`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use rppal::i2c::I2c;

// Internal
use super::{BusError, Params, RegisterBus};
use crate::mot_driver::registers::CONTROLLER_ADDR;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// I2C connection to the motor controller board.
pub struct RaspiBus {
    i2c: I2c,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RaspiBus {
    /// Open the I2C bus given in the parameters and address the controller.
    pub fn new(params: &Params) -> Result<Self, BusError> {
        let mut i2c = I2c::with_bus(params.i2c_bus_id)
            .map_err(|e| BusError::DeviceUnavailable(format!("cannot open I2C bus: {}", e)))?;

        i2c.set_slave_address(CONTROLLER_ADDR)
            .map_err(|e| BusError::DeviceUnavailable(format!("cannot address controller: {}", e)))?;

        info!(
            "Opened I2C bus {} to motor controller at 0x{:02X}",
            params.i2c_bus_id, CONTROLLER_ADDR
        );

        Ok(Self { i2c })
    }
}

impl RegisterBus for RaspiBus {
    fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        self.i2c
            .block_write(reg, data)
            .map_err(|e| BusError::TransactionFailed(e.to_string()))
    }

    fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.i2c
            .smbus_write_byte(reg, value)
            .map_err(|e| BusError::TransactionFailed(e.to_string()))
    }

    fn read_block(&mut self, reg: u8, len: usize) -> Result<Vec<u8>, BusError> {
        let mut buf = vec![0u8; len];

        self.i2c
            .block_read(reg, &mut buf)
            .map_err(|e| BusError::TransactionFailed(e.to_string()))?;

        Ok(buf)
    }
}
