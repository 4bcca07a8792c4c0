//! Scripted bus device for tests
//!
//! `MockDevice` records every transaction and answers reads from a scripted
//! queue (zeros when the queue is empty). A cloneable `MockHandle` stays
//! with the test after the device has been boxed into a `BusChannel`, for
//! scripting failures and inspecting the transaction log.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// Internal
use super::{BusError, RegisterBus};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One recorded transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Txn {
    WriteBlock(u8, Vec<u8>),
    WriteByte(u8, u8),
    ReadBlock(u8, usize),
}

/// The scripted device itself. Box this into a `BusChannel`.
pub struct MockDevice {
    shared: Arc<Mutex<MockState>>,
}

/// Test-side handle onto a `MockDevice` that has been moved into a channel.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    txns: Vec<Txn>,
    scripted_reads: VecDeque<Vec<u8>>,
    fail_budget: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MockDevice {
    /// Create a device and the handle used to script and inspect it.
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                shared: shared.clone(),
            },
            MockHandle { shared },
        )
    }
}

impl MockHandle {
    /// Make the next `n` transactions fail, whatever they are.
    pub fn fail_next(&self, n: u32) {
        self.shared.lock().unwrap().fail_budget = n;
    }

    /// Queue a response for a future read. Responses are consumed one per
    /// read attempt; with the queue empty reads answer zeros.
    pub fn push_read(&self, data: Vec<u8>) {
        self.shared.lock().unwrap().scripted_reads.push_back(data);
    }

    /// Snapshot of every transaction the device has seen.
    pub fn txns(&self) -> Vec<Txn> {
        self.shared.lock().unwrap().txns.clone()
    }

    /// Number of transactions the device has seen.
    pub fn txn_count(&self) -> usize {
        self.shared.lock().unwrap().txns.len()
    }

    /// Every block write made to the given register, in order.
    pub fn block_writes_to(&self, reg: u8) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .unwrap()
            .txns
            .iter()
            .filter_map(|t| match t {
                Txn::WriteBlock(r, data) if *r == reg => Some(data.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RegisterBus for MockDevice {
    fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.shared.lock().unwrap();
        state.txns.push(Txn::WriteBlock(reg, data.to_vec()));
        take_failure(&mut state)
    }

    fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        let mut state = self.shared.lock().unwrap();
        state.txns.push(Txn::WriteByte(reg, value));
        take_failure(&mut state)
    }

    fn read_block(&mut self, reg: u8, len: usize) -> Result<Vec<u8>, BusError> {
        let mut state = self.shared.lock().unwrap();
        state.txns.push(Txn::ReadBlock(reg, len));
        take_failure(&mut state)?;

        Ok(match state.scripted_reads.pop_front() {
            Some(data) => data,
            None => vec![0; len],
        })
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn take_failure(state: &mut MockState) -> Result<(), BusError> {
    if state.fail_budget > 0 {
        state.fail_budget -= 1;
        Err(BusError::TransactionFailed(String::from(
            "scripted failure",
        )))
    } else {
        Ok(())
    }
}
