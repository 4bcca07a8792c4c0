//! # Command processor
//!
//! A background worker drains a command queue one at a time, so the
//! transport delivering commands never blocks on motor I/O while a move or
//! homing run holds the system lock. Each submission carries a callback
//! which the worker invokes exactly once with the command's outcome.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use thiserror::Error;

// Standard
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

// Internal
use cmd_if::{cmd::Cmd, tm::CmdResponse};

use crate::robot_sys::{CmdExecError, RobotSys};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The outcome of one executed command.
pub type CmdResult = Result<CmdResponse, CmdExecError>;

/// Callback invoked exactly once with a command's outcome.
pub type CmdCallback = Box<dyn FnOnce(CmdResult) + Send>;

/// Handle to the command worker thread.
pub struct CmdProcessor {
    sender: Option<mpsc::Sender<(Cmd, CmdCallback)>>,
    handle: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while submitting a command.
#[derive(Debug, Error)]
pub enum CmdProcError {
    #[error("The command worker is no longer running")]
    WorkerGone,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CmdProcessor {
    /// Spawn the worker thread over the given system.
    pub fn new(robot: Arc<RobotSys>) -> Self {
        let (sender, receiver) = mpsc::channel::<(Cmd, CmdCallback)>();

        let handle = thread::spawn(move || worker(robot, receiver));

        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Queue a command, the callback fires once it has executed.
    pub fn submit(&self, cmd: Cmd, callback: CmdCallback) -> Result<(), CmdProcError> {
        match self.sender.as_ref() {
            Some(s) => s
                .send((cmd, callback))
                .map_err(|_| CmdProcError::WorkerGone),
            None => Err(CmdProcError::WorkerGone),
        }
    }

    /// Queue a command and block until its outcome comes back.
    pub fn submit_blocking(&self, cmd: Cmd) -> Result<CmdResult, CmdProcError> {
        let (tx, rx) = mpsc::channel();

        self.submit(
            cmd,
            Box::new(move |result| {
                // The submitter may have given up waiting, nothing to do
                // then
                let _ = tx.send(result);
            }),
        )?;

        rx.recv().map_err(|_| CmdProcError::WorkerGone)
    }

    /// Stop the worker once the queued commands have drained.
    pub fn stop(mut self) {
        self.sender = None;

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Command worker panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn worker(robot: Arc<RobotSys>, receiver: mpsc::Receiver<(Cmd, CmdCallback)>) {
    debug!("Command worker running");

    for (cmd, callback) in receiver.iter() {
        debug!("Worker picked up \"{}\"", cmd.action());

        let result = robot.execute(&cmd);

        if let Err(ref e) = result {
            warn!("Command \"{}\" failed: {}", cmd.action(), e);
        }

        callback(result);
    }

    debug!("Command queue closed, worker exiting");
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;
    use crate::bus::{self, mock::MockDevice, BusChannel};
    use crate::mot_driver::MotDriver;
    use crate::robot_sys::Params;
    use crate::vel_ctrl::VelCtrl;
    use cmd_if::cmd::HomeCmd;
    use std::sync::Mutex;

    fn processor() -> CmdProcessor {
        let (dev, _mock) = MockDevice::new();
        let channel = BusChannel::new(
            Box::new(dev),
            &bus::Params {
                min_txn_interval_s: 0.0,
                txn_attempts: 1,
                txn_retry_backoff_s: 0.0,
                i2c_bus_id: 1,
                use_sim: true,
            },
        );
        let ctrl = VelCtrl::initialised_for_test(MotDriver::new(channel));
        let robot = Arc::new(RobotSys::new(ctrl, Params::default(), None));

        CmdProcessor::new(robot)
    }

    #[test]
    fn test_submit_blocking_round_trip() {
        let proc = processor();

        let result = proc.submit_blocking(Cmd::Status).unwrap();
        assert!(matches!(result, Ok(CmdResponse::Status(_))));

        proc.stop();
    }

    #[test]
    fn test_callbacks_fire_in_order() {
        let proc = processor();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            proc.submit(
                Cmd::Status,
                Box::new(move |result| {
                    assert!(result.is_ok());
                    order.lock().unwrap().push(i);
                }),
            )
            .unwrap();
        }

        // Stop drains the queue before joining, so all three callbacks have
        // fired by the time it returns
        proc.stop();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_error_outcome_delivered() {
        let proc = processor();

        // Homing without odometry fails inside the worker, the failure must
        // come back through the callback rather than vanishing
        let result = proc
            .submit_blocking(Cmd::Home(HomeCmd {
                tolerance_m: 0.1,
                timeout_s: 1.0,
            }))
            .unwrap();

        assert!(matches!(result, Err(CmdExecError::OdometryRequired)));

        proc.stop();
    }
}
