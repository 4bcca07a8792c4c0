//! # Bus module
//!
//! All traffic to the motor controller goes through a single `BusChannel`:
//! one transaction at a time, a minimum interval between transactions, and a
//! bounded retry on failure. The controller shares its I2C bus with other
//! devices and drops transactions when hammered, so the pacing is load
//! bearing, not politeness.
//!
//! The channel is generic over the `RegisterBus` trait so the same control
//! code runs against real hardware (`raspi`), the simulation backend
//! (`sim`), or the scripted test device (`mock`). The backend is chosen once
//! at construction.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod mock;
pub mod params;
#[cfg(target_arch = "arm")]
pub mod raspi;
pub mod sim;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::Params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use std::thread;
use thiserror::Error;

// Internal
use util::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by concrete bus devices.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Read returned {found} bytes, expected {expected}")]
    ShortRead { expected: usize, found: usize },

    #[error("Bus device is not available: {0}")]
    DeviceUnavailable(String),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The register read/write contract of the motor controller device.
///
/// Implementations are single transactions with no pacing, locking or
/// retrying of their own, that is the channel's job.
pub trait RegisterBus: Send {
    /// Write a block of bytes to a device register.
    fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError>;

    /// Write a single byte to a device register.
    fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), BusError>;

    /// Read `len` bytes from a device register.
    fn read_block(&mut self, reg: u8, len: usize) -> Result<Vec<u8>, BusError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The serialised, paced, retrying channel to the motor controller.
///
/// Writes report success as a `bool` and reads return `None` on failure;
/// no error (and no panic) crosses this boundary. Failures have already
/// been retried and logged by the time the caller sees them.
pub struct BusChannel {
    inner: Mutex<Inner>,
    min_txn_interval: Duration,
    retry: RetryPolicy,
}

/// Device handle plus pacing state, guarded together so the interval is
/// measured between transactions system-wide, not per caller.
struct Inner {
    device: Box<dyn RegisterBus>,
    last_txn: Option<Instant>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BusChannel {
    /// Create a new channel over the given device.
    pub fn new(device: Box<dyn RegisterBus>, params: &Params) -> Self {
        Self {
            inner: Mutex::new(Inner {
                device,
                last_txn: None,
            }),
            min_txn_interval: Duration::from_secs_f64(params.min_txn_interval_s),
            retry: RetryPolicy::new(
                params.txn_attempts,
                Duration::from_secs_f64(params.txn_retry_backoff_s),
            ),
        }
    }

    /// Write a block of bytes to a device register.
    pub fn write_block(&self, reg: u8, data: &[u8]) -> bool {
        match self.transact(|dev| dev.write_block(reg, data)) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Write of {} bytes to register {:#04x} failed after {} attempts: {}",
                    data.len(),
                    reg,
                    self.retry.max_attempts,
                    e
                );
                false
            }
        }
    }

    /// Write a single byte to a device register.
    pub fn write_byte(&self, reg: u8, value: u8) -> bool {
        match self.transact(|dev| dev.write_byte(reg, value)) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Write of {:#04x} to register {:#04x} failed after {} attempts: {}",
                    value,
                    reg,
                    self.retry.max_attempts,
                    e
                );
                false
            }
        }
    }

    /// Read a block of bytes from a device register.
    ///
    /// Returns `None` when every attempt failed. Callers must treat `None`
    /// as "no data", never as zeros.
    pub fn read_block(&self, reg: u8, len: usize) -> Option<Vec<u8>> {
        match self.transact(|dev| {
            let data = dev.read_block(reg, len)?;
            if data.len() != len {
                return Err(BusError::ShortRead {
                    expected: len,
                    found: data.len(),
                });
            }
            Ok(data)
        }) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(
                    "Read of {} bytes from register {:#04x} failed after {} attempts: {}",
                    len, reg, self.retry.max_attempts, e
                );
                None
            }
        }
    }

    /// Run one logical transaction: take the channel lock, wait out the
    /// pacing interval, run the operation under the retry policy and stamp
    /// the transaction time.
    fn transact<T, F>(&self, mut op: F) -> Result<T, BusError>
    where
        F: FnMut(&mut dyn RegisterBus) -> Result<T, BusError>,
    {
        // A poisoned lock means a panic mid-transaction; the device state
        // is unknowable, so report the transaction as failed.
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => {
                return Err(BusError::DeviceUnavailable(String::from(
                    "bus lock poisoned",
                )))
            }
        };

        // Pacing: hold off until the minimum interval since the previous
        // transaction has passed. Holding the lock while sleeping is
        // intentional, the interval is global.
        if let Some(last) = inner.last_txn {
            let since = last.elapsed();
            if since < self.min_txn_interval {
                trace!("Pacing bus for {:?}", self.min_txn_interval - since);
                thread::sleep(self.min_txn_interval - since);
            }
        }

        let result = self.retry.run(|| op(inner.device.as_mut()));

        inner.last_txn = Some(Instant::now());

        result
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::mock::{MockDevice, Txn};
    use super::*;

    fn fast_params() -> Params {
        Params {
            min_txn_interval_s: 0.0,
            txn_attempts: 2,
            txn_retry_backoff_s: 0.0,
            ..Params::default()
        }
    }

    #[test]
    fn test_write_read_pass_through() {
        let (dev, mock) = MockDevice::new();
        let channel = BusChannel::new(Box::new(dev), &fast_params());

        assert!(channel.write_block(0x33, &[1, 2, 3, 4]));
        assert!(channel.write_byte(0x14, 3));
        assert!(channel.read_block(0x00, 2).is_some());

        let txns = mock.txns();
        assert_eq!(txns.len(), 3);
        assert_eq!(txns[0], Txn::WriteBlock(0x33, vec![1, 2, 3, 4]));
        assert_eq!(txns[1], Txn::WriteByte(0x14, 3));
        assert_eq!(txns[2], Txn::ReadBlock(0x00, 2));
    }

    #[test]
    fn test_pacing_enforced() {
        let (dev, _mock) = MockDevice::new();
        let params = Params {
            min_txn_interval_s: 0.05,
            txn_attempts: 1,
            ..Params::default()
        };
        let channel = BusChannel::new(Box::new(dev), &params);

        let start = Instant::now();
        assert!(channel.write_byte(0x14, 3));
        assert!(channel.write_byte(0x15, 0));
        assert!(channel.write_byte(0x15, 0));

        // Two enforced gaps between the three transactions
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_retry_then_success() {
        let (dev, mock) = MockDevice::new();
        mock.fail_next(1);
        let channel = BusChannel::new(Box::new(dev), &fast_params());

        assert!(channel.write_block(0x33, &[0, 0, 0, 0]));

        // Both attempts hit the device
        assert_eq!(mock.txn_count(), 2);
    }

    #[test]
    fn test_exhausted_write_reports_false() {
        let (dev, mock) = MockDevice::new();
        mock.fail_next(10);
        let channel = BusChannel::new(Box::new(dev), &fast_params());

        assert!(!channel.write_block(0x33, &[0, 0, 0, 0]));
        assert_eq!(mock.txn_count(), 2);
    }

    #[test]
    fn test_failed_read_is_none_not_zeros() {
        let (dev, mock) = MockDevice::new();
        mock.fail_next(10);
        let channel = BusChannel::new(Box::new(dev), &fast_params());

        assert_eq!(channel.read_block(0x3C, 16), None);
    }

    #[test]
    fn test_short_read_is_failure() {
        let (dev, mock) = MockDevice::new();
        mock.push_read(vec![0x12]);
        mock.push_read(vec![0x12]);
        let channel = BusChannel::new(Box::new(dev), &fast_params());

        // Device keeps answering with 1 byte where 2 were asked for
        assert_eq!(channel.read_block(0x00, 2), None);
    }
}
