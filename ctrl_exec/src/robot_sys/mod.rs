//! # Robot system facade
//!
//! The single entry point commands go through. The facade owns the velocity
//! controller and executes one command at a time under a system-wide lock,
//! so a status request never observes the controller mid way through a move
//! cycle and two moves can never interleave their bus traffic.
//!
//! Timed commands (`move`, `home`) run their control loop inline on the
//! calling thread. The command processor puts that thread out of the way of
//! whatever transport delivers the commands.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

// Standard
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use cmd_if::{
    cmd::{Cmd, HomeCmd, MoveCmd, ResetPoseCmd, SetSpeedCmd, UpdatePidCmd},
    tm::{CmdResponse, CycleSampleTm, PidGainsTm, PoseTm, StatusTm},
};
use util::{archive::Archiver, maths::clamp, module::State, session};

use crate::kinematics::BodyVel;
use crate::vel_ctrl::{InputData, ProcError, VelCtrl};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The top level robot control system.
pub struct RobotSys {
    /// Everything a command touches, under one lock so that commands
    /// serialise.
    inner: Mutex<Inner>,

    params: Params,
}

struct Inner {
    ctrl: VelCtrl,

    /// Current teleoperation speed profile.
    ///
    /// Units: meters/second
    speed_profile_ms: f64,

    /// Per-cycle telemetry archive, `None` when archiving is off.
    archiver: Option<Archiver>,
}

/// One control cycle as written to the session's cycle archive.
#[derive(Serialize)]
struct CycleRecord {
    /// Units: seconds since session epoch
    time_s: f64,
    demand_vx_ms: f64,
    demand_vy_ms: f64,
    demand_omega_rads: f64,
    pwm_0: i8,
    pwm_1: i8,
    pwm_2: i8,
    pwm_3: i8,
    demand_rads_0: f64,
    demand_rads_1: f64,
    demand_rads_2: f64,
    demand_rads_3: f64,
    measured_rads_0: f64,
    measured_rads_1: f64,
    measured_rads_2: f64,
    measured_rads_3: f64,
    pose_x_m: Option<f64>,
    pose_y_m: Option<f64>,
    pose_theta_deg: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while executing a command.
#[derive(Debug, Error)]
pub enum CmdExecError {
    #[error("Odometry must be enabled first")]
    OdometryRequired,

    #[error("Velocity controller is inactive after a fault, reset required")]
    ControllerInactive,

    #[error("Velocity controller is not initialised")]
    ControllerUnavailable,

    #[error("PWM write failed, motion aborted")]
    PwmSendFailed,

    #[error("At least one of kp, ki, kd must be given")]
    NoGainsGiven,

    #[error("Robot system lock poisoned")]
    LockPoisoned,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotSys {
    /// Build the system around an initialised velocity controller.
    pub fn new(ctrl: VelCtrl, params: Params, archiver: Option<Archiver>) -> Self {
        let speed_profile_ms = clamp(
            params.default_speed_ms,
            params.speed_profile_min_ms,
            params.speed_profile_max_ms,
        );

        Self {
            inner: Mutex::new(Inner {
                ctrl,
                speed_profile_ms,
                archiver,
            }),
            params,
        }
    }

    /// Execute one command to completion.
    ///
    /// Timed commands block for their whole duration, callers who cannot
    /// afford that submit through the command processor instead.
    pub fn execute(&self, cmd: &Cmd) -> Result<CmdResponse, CmdExecError> {
        let mut inner = match self.inner.lock() {
            Ok(i) => i,
            Err(_) => return Err(CmdExecError::LockPoisoned),
        };

        debug!("Executing \"{}\" command", cmd.action());

        match cmd {
            Cmd::Move(c) => self.cmd_move(&mut inner, c),
            Cmd::Stop => self.cmd_stop(&mut inner),
            Cmd::EnableOdometry => self.cmd_enable_odometry(&mut inner),
            Cmd::DisableOdometry => self.cmd_disable_odometry(&mut inner),
            Cmd::ResetPose(c) => self.cmd_reset_pose(&mut inner, c),
            Cmd::Status => self.cmd_status(&mut inner),
            Cmd::Home(c) => self.cmd_home(&mut inner, c),
            Cmd::UpdatePid(c) => self.cmd_update_pid(&mut inner, c),
            Cmd::SetSpeed(c) => self.cmd_set_speed(&mut inner, c),
        }
    }

    // -----------------------------------------------------------------------
    // PRIVATE FUNCTIONS
    // -----------------------------------------------------------------------

    /// Drive at a fixed body velocity for the command's duration.
    fn cmd_move(&self, inner: &mut Inner, cmd: &MoveCmd) -> Result<CmdResponse, CmdExecError> {
        let duration_s = if cmd.duration_s <= 0.0 {
            self.params.cycle_period_s
        } else {
            cmd.duration_s
        };

        let num_cycles = ((duration_s / self.params.cycle_period_s).round() as u64).max(1);
        let demand = BodyVel::new(cmd.vx_ms, cmd.vy_ms, cmd.omega_rads);

        info!(
            "Moving at ({:.2}, {:.2}) m/s, {:.2} rad/s for {} cycles",
            cmd.vx_ms, cmd.vy_ms, cmd.omega_rads, num_cycles
        );

        let mut sample = None;

        for _ in 0..num_cycles {
            sample = Some(self.run_cycle(inner, &demand)?);
            thread::sleep(Duration::from_secs_f64(self.params.cycle_period_s));
        }

        if cmd.stop_after && !inner.ctrl.stop() {
            warn!("Stop at the end of the move was not confirmed");
        }

        Ok(CmdResponse::MoveCompleted { duration_s, sample })
    }

    /// Bring all wheels to a stop.
    fn cmd_stop(&self, inner: &mut Inner) -> Result<CmdResponse, CmdExecError> {
        let ok = inner.ctrl.stop();

        if !ok {
            warn!("Stop was not confirmed on the bus");
        }

        Ok(CmdResponse::Stopped { ok })
    }

    fn cmd_enable_odometry(&self, inner: &mut Inner) -> Result<CmdResponse, CmdExecError> {
        match inner.ctrl.odometry_mut() {
            Some(odo) => {
                odo.enable();
                Ok(CmdResponse::OdometryEnabled)
            }
            None => Err(CmdExecError::ControllerUnavailable),
        }
    }

    fn cmd_disable_odometry(&self, inner: &mut Inner) -> Result<CmdResponse, CmdExecError> {
        match inner.ctrl.odometry_mut() {
            Some(odo) => {
                odo.disable();
                Ok(CmdResponse::OdometryDisabled)
            }
            None => Err(CmdExecError::ControllerUnavailable),
        }
    }

    /// Overwrite the pose estimate. The front end speaks degrees.
    fn cmd_reset_pose(
        &self,
        inner: &mut Inner,
        cmd: &ResetPoseCmd,
    ) -> Result<CmdResponse, CmdExecError> {
        match inner.ctrl.odometry_mut() {
            Some(odo) => odo.reset(cmd.x_m, cmd.y_m, cmd.theta_deg.to_radians()),
            None => return Err(CmdExecError::ControllerUnavailable),
        }

        Ok(CmdResponse::PoseReset {
            pose: pose_tm(&inner.ctrl),
        })
    }

    /// Snapshot of the system, including a live battery reading.
    fn cmd_status(&self, inner: &mut Inner) -> Result<CmdResponse, CmdExecError> {
        let (kp, ki, kd) = inner.ctrl.gains();

        let odometry_enabled = inner
            .ctrl
            .odometry()
            .map(|o| o.is_enabled())
            .unwrap_or(false);

        Ok(CmdResponse::Status(StatusTm {
            odometry_enabled,
            pose: pose_tm(&inner.ctrl),
            pid: PidGainsTm { kp, ki, kd },
            battery_v: inner.ctrl.battery_voltage(),
            reading_count: inner.ctrl.reading_count(),
            speed_profile_ms: inner.speed_profile_ms,
        }))
    }

    /// Drive back to the odometry origin with a proportional approach.
    fn cmd_home(&self, inner: &mut Inner, cmd: &HomeCmd) -> Result<CmdResponse, CmdExecError> {
        let odometry_enabled = inner
            .ctrl
            .odometry()
            .map(|o| o.is_enabled())
            .unwrap_or(false);

        if !odometry_enabled {
            return Err(CmdExecError::OdometryRequired);
        }

        info!(
            "Homing with tolerance {:.3} m, timeout {:.1} s",
            cmd.tolerance_m, cmd.timeout_s
        );

        let start = Instant::now();

        while start.elapsed().as_secs_f64() < cmd.timeout_s {
            let pose = match inner.ctrl.odometry() {
                Some(o) => o.pose(),
                None => return Err(CmdExecError::ControllerUnavailable),
            };

            let distance_m = pose.x_m.hypot(pose.y_m);

            if distance_m < cmd.tolerance_m {
                info!("Home reached, {:.3} m from the origin", distance_m);

                if !inner.ctrl.stop() {
                    warn!("Stop at home was not confirmed");
                }

                return Ok(CmdResponse::Home {
                    pose: pose_tm(&inner.ctrl),
                });
            }

            // Proportional approach directed along the heading-relative
            // bearing to the origin, capped per body axis
            let speed_ms = self
                .params
                .home_speed_max_ms
                .min(distance_m * self.params.home_gain);
            let bearing_rad = (-pose.y_m).atan2(-pose.x_m);
            let cap = self.params.home_speed_max_ms;

            let demand = BodyVel::new(
                clamp(speed_ms * (bearing_rad - pose.theta_rad).cos(), -cap, cap),
                clamp(speed_ms * (bearing_rad - pose.theta_rad).sin(), -cap, cap),
                0.0,
            );

            self.run_cycle(inner, &demand)?;
            thread::sleep(Duration::from_secs_f64(self.params.cycle_period_s));
        }

        info!("Homing timed out, stopping");

        if !inner.ctrl.stop() {
            warn!("Stop after homing timeout was not confirmed");
        }

        Ok(CmdResponse::Timeout {
            pose: pose_tm(&inner.ctrl),
        })
    }

    /// Retune the wheel PID loops and reset the controller.
    fn cmd_update_pid(
        &self,
        inner: &mut Inner,
        cmd: &UpdatePidCmd,
    ) -> Result<CmdResponse, CmdExecError> {
        if cmd.kp.is_none() && cmd.ki.is_none() && cmd.kd.is_none() {
            return Err(CmdExecError::NoGainsGiven);
        }

        inner.ctrl.update_gains(cmd.kp, cmd.ki, cmd.kd);

        // Stale integrator and derivative history makes no sense under new
        // gains
        if !inner.ctrl.reset() {
            warn!("Controller reset after the gain update left it inactive");
        }

        let (kp, ki, kd) = inner.ctrl.gains();
        info!("PID gains now kp={}, ki={}, kd={}", kp, ki, kd);

        Ok(CmdResponse::PidUpdated {
            pid: PidGainsTm { kp, ki, kd },
        })
    }

    /// Change (or just report) the teleoperation speed profile.
    fn cmd_set_speed(
        &self,
        inner: &mut Inner,
        cmd: &SetSpeedCmd,
    ) -> Result<CmdResponse, CmdExecError> {
        let requested = cmd.speed_ms.unwrap_or(inner.speed_profile_ms);
        let speed_ms = clamp(
            requested,
            self.params.speed_profile_min_ms,
            self.params.speed_profile_max_ms,
        );

        if (speed_ms - requested).abs() > f64::EPSILON {
            debug!(
                "Speed profile request {:.2} clamped to {:.2} m/s",
                requested, speed_ms
            );
        }

        inner.speed_profile_ms = speed_ms;

        Ok(CmdResponse::SpeedProfileUpdated { speed_ms })
    }

    /// One control cycle: process the demand, send the PWM, archive the
    /// result.
    fn run_cycle(
        &self,
        inner: &mut Inner,
        demand: &BodyVel,
    ) -> Result<CycleSampleTm, CmdExecError> {
        let input = InputData { demand: *demand };

        let (output, _report) = inner.ctrl.proc(&input).map_err(map_proc_err)?;

        if !inner.ctrl.send_pwm(&output.pwm) {
            warn!("PWM write failed, aborting motion");
            return Err(CmdExecError::PwmSendFailed);
        }

        let sample = CycleSampleTm {
            pwm: output.pwm,
            wheel_demand_rads: output.wheel_demand_rads,
            wheel_measured_rads: output.wheel_measured_rads,
            pose: pose_tm(&inner.ctrl),
        };

        archive_cycle(inner, &sample, demand);

        Ok(sample)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn map_proc_err(e: ProcError) -> CmdExecError {
    match e {
        ProcError::Inactive => CmdExecError::ControllerInactive,
        ProcError::NotInitialised => CmdExecError::ControllerUnavailable,
    }
}

/// The pose in telemetry form, `None` while odometry is disabled.
fn pose_tm(ctrl: &VelCtrl) -> Option<PoseTm> {
    match ctrl.odometry() {
        Some(odo) if odo.is_enabled() => {
            let pose = odo.pose();
            Some(PoseTm::new(pose.x_m, pose.y_m, pose.theta_rad))
        }
        _ => None,
    }
}

/// Archive one cycle, a failed write is logged and swallowed.
fn archive_cycle(inner: &mut Inner, sample: &CycleSampleTm, demand: &BodyVel) {
    let archiver = match inner.archiver.as_mut() {
        Some(a) => a,
        None => return,
    };

    let record = CycleRecord {
        time_s: session::get_elapsed_seconds(),
        demand_vx_ms: demand.vx_ms,
        demand_vy_ms: demand.vy_ms,
        demand_omega_rads: demand.omega_rads,
        pwm_0: sample.pwm[0],
        pwm_1: sample.pwm[1],
        pwm_2: sample.pwm[2],
        pwm_3: sample.pwm[3],
        demand_rads_0: sample.wheel_demand_rads[0],
        demand_rads_1: sample.wheel_demand_rads[1],
        demand_rads_2: sample.wheel_demand_rads[2],
        demand_rads_3: sample.wheel_demand_rads[3],
        measured_rads_0: sample.wheel_measured_rads[0],
        measured_rads_1: sample.wheel_measured_rads[1],
        measured_rads_2: sample.wheel_measured_rads[2],
        measured_rads_3: sample.wheel_measured_rads[3],
        pose_x_m: sample.pose.map(|p| p.x_m),
        pose_y_m: sample.pose.map(|p| p.y_m),
        pose_theta_deg: sample.pose.map(|p| p.theta_deg),
    };

    if let Err(e) = archiver.serialise(&record) {
        warn!("Could not archive control cycle: {}", e);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;
    use crate::bus::{
        self,
        mock::{MockDevice, MockHandle},
        BusChannel,
    };
    use crate::mot_driver::{registers, MotDriver};
    use cmd_if::cmd::{HomeCmd, MoveCmd, SetSpeedCmd, UpdatePidCmd};

    fn fast_bus_params() -> bus::Params {
        bus::Params {
            min_txn_interval_s: 0.0,
            txn_attempts: 1,
            txn_retry_backoff_s: 0.0,
            i2c_bus_id: 1,
            use_sim: true,
        }
    }

    fn fast_params() -> Params {
        Params {
            cycle_period_s: 0.01,
            ..Params::default()
        }
    }

    fn sys_on_mock() -> (RobotSys, MockHandle) {
        let (dev, mock) = MockDevice::new();
        let channel = BusChannel::new(Box::new(dev), &fast_bus_params());
        let ctrl = VelCtrl::initialised_for_test(MotDriver::new(channel));
        (RobotSys::new(ctrl, fast_params(), None), mock)
    }

    #[test]
    fn test_move_runs_cycles_then_stops() {
        let (sys, mock) = sys_on_mock();

        let resp = sys
            .execute(&Cmd::Move(MoveCmd {
                vx_ms: 0.0,
                vy_ms: 0.0,
                omega_rads: 0.0,
                duration_s: 0.1,
                stop_after: true,
            }))
            .unwrap();

        match resp {
            CmdResponse::MoveCompleted { duration_s, sample } => {
                assert!((duration_s - 0.1).abs() < 1e-9);
                assert!(sample.is_some());
            }
            other => panic!("expected MoveCompleted, got {:?}", other),
        }

        // Ten cycles plus the final stop, each one PWM write, and the stop
        // must command all zeros
        let writes = mock.block_writes_to(registers::REG_FIXED_PWM);
        assert_eq!(writes.len(), 11);
        assert_eq!(writes.last().unwrap(), &vec![0u8, 0, 0, 0]);
    }

    #[test]
    fn test_move_fault_surfaces_next_cycle() {
        let (sys, mock) = sys_on_mock();

        // First encoder read fails, latching the controller. That cycle
        // still completes, the second one propagates the fault.
        mock.fail_next(1);

        let result = sys.execute(&Cmd::Move(MoveCmd {
            vx_ms: 0.1,
            vy_ms: 0.0,
            omega_rads: 0.0,
            duration_s: 0.05,
            stop_after: true,
        }));

        assert!(matches!(result, Err(CmdExecError::ControllerInactive)));
    }

    #[test]
    fn test_move_aborts_when_pwm_write_fails() {
        let (sys, mock) = sys_on_mock();

        // Encoder read then PWM write both fail on the first cycle
        mock.fail_next(2);

        let result = sys.execute(&Cmd::Move(MoveCmd {
            vx_ms: 0.1,
            vy_ms: 0.0,
            omega_rads: 0.0,
            duration_s: 0.05,
            stop_after: false,
        }));

        assert!(matches!(result, Err(CmdExecError::PwmSendFailed)));
    }

    #[test]
    fn test_home_requires_odometry() {
        let (sys, mock) = sys_on_mock();

        let result = sys.execute(&Cmd::Home(HomeCmd {
            tolerance_m: 0.1,
            timeout_s: 1.0,
        }));

        assert!(matches!(result, Err(CmdExecError::OdometryRequired)));

        // Refusal must happen before any bus traffic
        assert_eq!(mock.txn_count(), 0);
    }

    #[test]
    fn test_home_from_origin_is_immediate() {
        let (sys, mock) = sys_on_mock();

        sys.execute(&Cmd::EnableOdometry).unwrap();

        let resp = sys
            .execute(&Cmd::Home(HomeCmd {
                tolerance_m: 0.1,
                timeout_s: 1.0,
            }))
            .unwrap();

        match resp {
            CmdResponse::Home { pose } => {
                let pose = pose.expect("homing with odometry enabled must report a pose");
                assert!(pose.x_m.abs() < 1e-9);
                assert!(pose.y_m.abs() < 1e-9);
            }
            other => panic!("expected Home, got {:?}", other),
        }

        // Already inside tolerance, so the only bus traffic is the stop
        let writes = mock.block_writes_to(registers::REG_FIXED_PWM);
        assert_eq!(writes, vec![vec![0u8, 0, 0, 0]]);
    }

    #[test]
    fn test_set_speed_clamps_and_keeps() {
        let (sys, _mock) = sys_on_mock();

        let resp = sys
            .execute(&Cmd::SetSpeed(SetSpeedCmd { speed_ms: Some(2.0) }))
            .unwrap();
        assert!(matches!(
            resp,
            CmdResponse::SpeedProfileUpdated { speed_ms } if (speed_ms - 0.9).abs() < 1e-9
        ));

        // No speed given keeps the stored profile
        let resp = sys
            .execute(&Cmd::SetSpeed(SetSpeedCmd { speed_ms: None }))
            .unwrap();
        assert!(matches!(
            resp,
            CmdResponse::SpeedProfileUpdated { speed_ms } if (speed_ms - 0.9).abs() < 1e-9
        ));
    }

    #[test]
    fn test_update_pid_needs_a_gain() {
        let (sys, _mock) = sys_on_mock();

        let result = sys.execute(&Cmd::UpdatePid(UpdatePidCmd {
            kp: None,
            ki: None,
            kd: None,
        }));
        assert!(matches!(result, Err(CmdExecError::NoGainsGiven)));

        let resp = sys
            .execute(&Cmd::UpdatePid(UpdatePidCmd {
                kp: None,
                ki: Some(0.7),
                kd: None,
            }))
            .unwrap();

        match resp {
            CmdResponse::PidUpdated { pid } => {
                assert!((pid.kp - crate::pid::DEFAULT_KP).abs() < 1e-9);
                assert!((pid.ki - 0.7).abs() < 1e-9);
                assert!((pid.kd - crate::pid::DEFAULT_KD).abs() < 1e-9);
            }
            other => panic!("expected PidUpdated, got {:?}", other),
        }
    }

    #[test]
    fn test_status_snapshot() {
        let (sys, _mock) = sys_on_mock();

        let resp = sys.execute(&Cmd::Status).unwrap();

        match resp {
            CmdResponse::Status(tm) => {
                assert!(!tm.odometry_enabled);
                assert!(tm.pose.is_none());
                assert!((tm.pid.kp - crate::pid::DEFAULT_KP).abs() < 1e-9);
                // The mock answers zero millivolts, outside the plausible
                // battery range
                assert!(tm.battery_v.abs() < 1e-9);
                assert_eq!(tm.reading_count, 0);
                assert!((tm.speed_profile_ms - 0.5).abs() < 1e-9);
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }
}
