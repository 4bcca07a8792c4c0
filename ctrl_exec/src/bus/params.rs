//! # Bus channel parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Minimum time between the end of one bus transaction and the start of
    /// the next. The motor controller drops transactions that arrive faster
    /// than this.
    ///
    /// Units: seconds
    pub min_txn_interval_s: f64,

    /// Number of attempts made for each transaction before it is declared
    /// failed.
    pub txn_attempts: u32,

    /// Wait between transaction attempts.
    ///
    /// Units: seconds
    pub txn_retry_backoff_s: f64,

    /// Index of the I2C bus the motor controller is attached to.
    pub i2c_bus_id: u8,

    /// If true use the simulated bus backend even when real hardware is
    /// available.
    pub use_sim: bool,
}

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("min_txn_interval_s must be non-negative, got {0}")]
    NegativeTxnInterval(f64),

    #[error("txn_attempts must be at least 1, got {0}")]
    NoAttempts(u32),

    #[error("txn_retry_backoff_s must be non-negative, got {0}")]
    NegativeRetryBackoff(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.min_txn_interval_s < 0.0 {
            return Err(ParamsError::NegativeTxnInterval(self.min_txn_interval_s));
        }

        if self.txn_attempts < 1 {
            return Err(ParamsError::NoAttempts(self.txn_attempts));
        }

        if self.txn_retry_backoff_s < 0.0 {
            return Err(ParamsError::NegativeRetryBackoff(self.txn_retry_backoff_s));
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            min_txn_interval_s: 0.02,
            txn_attempts: 2,
            txn_retry_backoff_s: 0.05,
            i2c_bus_id: 1,
            use_sim: false,
        }
    }
}
