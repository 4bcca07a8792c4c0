//! # Velocity control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use thiserror::Error;

// Standard
use std::f64::consts::PI;
use std::time::Instant;

// Internal
use util::{maths::clamp, module::State, params, session::Session};

use crate::kinematics::{self, BodyVel, MecanumModel};
use crate::mot_driver::{MotDriver, PWM_LIMIT};
use crate::odometry::Odometry;
use crate::pid::PidController;

use super::{Params, ParamsError, NUM_WHEELS};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Encoder deltas spanning more than this have no believable rate and are
/// treated as cold starts.
///
/// Units: seconds
const MAX_ENC_DT_S: f64 = 1.0;

/// Floor applied to non-positive encoder timesteps.
///
/// Units: seconds
const MIN_ENC_DT_S: f64 = 0.01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Velocity control module state
#[derive(Default)]
pub struct VelCtrl {
    /// Module parameters.
    params: Params,

    /// Motor driver, `None` until initialisation.
    driver: Option<MotDriver>,

    /// Chassis kinematic model, `None` until initialisation.
    model: Option<MecanumModel>,

    /// Dead-reckoning pose estimator, `None` until initialisation.
    odometry: Option<Odometry>,

    /// One PID loop per wheel.
    pids: [PidController; NUM_WHEELS],

    /// False before initialisation and after a terminal encoder fault.
    active: bool,

    /// Encoder totals at the previous read.
    last_counts: [i32; NUM_WHEELS],

    /// Time of the previous encoder read.
    last_enc_time: Option<Instant>,

    /// Successful wheel rate computations since init or reset.
    reading_count: u64,
}

/// Initialisation data for the velocity control module.
pub struct InitData {
    /// Name of the chassis geometry parameter file.
    pub chassis_params_path: &'static str,

    /// Name of the controller parameter file.
    pub params_path: &'static str,

    /// The motor driver the controller takes ownership of.
    pub driver: MotDriver,
}

/// Input data for one control cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputData {
    /// Body velocity demand to track this cycle.
    pub demand: BodyVel,
}

/// Output of one control cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputData {
    /// PWM duty for each wheel, ready to send to the motor driver.
    pub pwm: [i8; NUM_WHEELS],

    /// Wheel rate targets in the kinematic model's sign convention.
    ///
    /// Units: radians/second
    pub wheel_demand_rads: [f64; NUM_WHEELS],

    /// Measured wheel rates in the encoder's sign convention.
    ///
    /// Units: radians/second
    pub wheel_measured_rads: [f64; NUM_WHEELS],
}

/// Report on the outcome of one control cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusReport {
    /// True when the cycle measured a fresh wheel rate delta rather than
    /// starting cold or running through an encoder fault.
    pub velocity_fresh: bool,

    /// True when odometry folded this cycle's measurement into the pose.
    pub odometry_updated: bool,

    /// True when the encoder read failed and latched the controller
    /// inactive.
    pub encoder_fault: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur during initialisation.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Failed to load parameters: {0}")]
    ParamLoadError(params::LoadError),

    #[error("Loaded parameters are invalid: {0}")]
    ParamsInvalid(ParamsError),

    #[error("Loaded chassis parameters are invalid: {0}")]
    ChassisParamsInvalid(kinematics::ParamsError),

    #[error("Cannot build the kinematic model: {0}")]
    BadChassis(kinematics::ModelError),
}

/// Errors which can occur during cyclic processing.
#[derive(Debug, Error)]
pub enum ProcError {
    #[error("Controller is inactive after an encoder fault, reset required")]
    Inactive,

    #[error("Module has not been initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for VelCtrl {
    type InitData = InitData;
    type InitError = InitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = ProcError;

    /// Initialise the velocity control module.
    ///
    /// Loads and validates the controller and chassis parameters, builds
    /// the kinematic model, configures the motor controller board and takes
    /// the first encoder baseline.
    fn init(
        &mut self,
        init_data: Self::InitData,
        _session: &Session,
    ) -> Result<(), Self::InitError> {
        // Load parameters, falling back on compiled defaults if the files
        // are absent
        self.params = match params::load_or(init_data.params_path, Params::default()) {
            Ok(p) => p,
            Err(e) => return Err(InitError::ParamLoadError(e)),
        };

        if let Err(e) = self.params.are_valid() {
            return Err(InitError::ParamsInvalid(e));
        }

        let chassis_params = match params::load_or(
            init_data.chassis_params_path,
            kinematics::Params::default(),
        ) {
            Ok(p) => p,
            Err(e) => return Err(InitError::ParamLoadError(e)),
        };

        if let Err(e) = chassis_params.are_valid() {
            return Err(InitError::ChassisParamsInvalid(e));
        }

        let model = match MecanumModel::new(&chassis_params) {
            Ok(m) => m,
            Err(e) => return Err(InitError::BadChassis(e)),
        };

        for pid in self.pids.iter_mut() {
            *pid = PidController::new(self.params.kp, self.params.ki, self.params.kd);
        }

        // Bring up the motor controller and take the encoder baseline. A
        // failed baseline read is not fatal, the first cycle just measures
        // against zero counts.
        init_data.driver.configure();

        self.last_counts = match init_data.driver.encoder_counts() {
            Some(c) => c,
            None => {
                warn!("Initial encoder read failed, wheel rate baseline starts at zero");
                [0; NUM_WHEELS]
            }
        };
        self.last_enc_time = Some(Instant::now());

        self.driver = Some(init_data.driver);
        self.model = Some(model);
        self.odometry = Some(Odometry::new(model));
        self.reading_count = 0;
        self.active = true;

        info!("Velocity control module initialised");

        Ok(())
    }

    /// Run one control cycle.
    ///
    /// Turns the body velocity demand into wheel rate targets, measures
    /// actual wheel rates from the encoder delta, updates odometry with the
    /// same measurement, then combines feed-forward duty with a per-wheel
    /// PID correction.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let model = match self.model {
            Some(m) => m,
            None => return Err(ProcError::NotInitialised),
        };

        if !self.active {
            return Err(ProcError::Inactive);
        }

        let mut report = StatusReport::default();

        let wheel_demand_rads = model.wheel_speeds(&input_data.demand);

        // A failed encoder read latches the controller inactive and yields
        // zero rates. This cycle still completes, the fault surfaces as an
        // error on the next one.
        let wheel_measured_rads = self.read_wheel_rates(&mut report)?;

        // Pose integration consumes the same measurement the PID loops act
        // on
        if let Some(ref mut odometry) = self.odometry {
            report.odometry_updated = odometry.update(&wheel_measured_rads);
        }

        // Feed-forward from the demand plus per-wheel PID correction, both
        // in the wiring polarity's sign convention
        let pwm_max = PWM_LIMIT as f64;
        let mut pwm = [0i8; NUM_WHEELS];

        for i in 0..NUM_WHEELS {
            let setpoint = wheel_demand_rads[i] * self.params.wheel_polarity[i];

            let base = clamp(
                setpoint / model.wheel_speed_max_rads() * pwm_max,
                -pwm_max,
                pwm_max,
            );
            let correction = self.pids[i].update(setpoint, wheel_measured_rads[i]);

            pwm[i] = clamp(base + correction, -pwm_max, pwm_max) as i8;
        }

        Ok((
            OutputData {
                pwm,
                wheel_demand_rads,
                wheel_measured_rads,
            },
            report,
        ))
    }
}

impl VelCtrl {
    /// Send a PWM set to the motors, true on success.
    pub fn send_pwm(&self, pwm: &[i8; NUM_WHEELS]) -> bool {
        match self.driver.as_ref() {
            Some(d) => d.set_pwm(pwm),
            None => false,
        }
    }

    /// Bring all motors to a stop, true if the hardware acknowledged it.
    pub fn stop(&self) -> bool {
        match self.driver.as_ref() {
            Some(d) => d.stop(),
            None => false,
        }
    }

    /// Battery voltage in volts, 0.0 when unavailable.
    pub fn battery_voltage(&self) -> f64 {
        match self.driver.as_ref() {
            Some(d) => d.battery_voltage(),
            None => 0.0,
        }
    }

    /// Clear PID history and restart wheel rate measurement from a fresh
    /// encoder baseline.
    ///
    /// Re-arms a controller latched inactive by an encoder fault, but only
    /// when the baseline read succeeds. Returns whether the controller is
    /// active afterwards.
    pub fn reset(&mut self) -> bool {
        for pid in self.pids.iter_mut() {
            pid.reset();
        }
        self.reading_count = 0;

        match self.driver.as_ref().and_then(|d| d.encoder_counts()) {
            Some(counts) => {
                if !self.active {
                    info!("Controller re-armed after fault");
                }
                self.last_counts = counts;
                self.last_enc_time = Some(Instant::now());
                self.active = true;
            }
            None => {
                warn!("Encoder baseline read failed, controller stays inactive");
                self.active = false;
            }
        }

        self.active
    }

    /// Apply new gains to all four wheel loops, `None` keeps a gain as is.
    pub fn update_gains(&mut self, kp: Option<f64>, ki: Option<f64>, kd: Option<f64>) {
        for pid in self.pids.iter_mut() {
            pid.set_gains(kp, ki, kd);
        }
    }

    /// The gains shared by the wheel loops as `(kp, ki, kd)`.
    pub fn gains(&self) -> (f64, f64, f64) {
        self.pids[0].gains()
    }

    /// The odometry estimator, `None` until initialisation.
    pub fn odometry(&self) -> Option<&Odometry> {
        self.odometry.as_ref()
    }

    /// Mutable access to the odometry estimator.
    pub fn odometry_mut(&mut self) -> Option<&mut Odometry> {
        self.odometry.as_mut()
    }

    /// Whether the controller accepts cycles.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of successful wheel rate computations since init or reset.
    pub fn reading_count(&self) -> u64 {
        self.reading_count
    }

    // -----------------------------------------------------------------------
    // PRIVATE FUNCTIONS
    // -----------------------------------------------------------------------

    /// Wheel rates from the change in encoder counts since the last read.
    fn read_wheel_rates(
        &mut self,
        report: &mut StatusReport,
    ) -> Result<[f64; NUM_WHEELS], ProcError> {
        let driver = match self.driver.as_ref() {
            Some(d) => d,
            None => return Err(ProcError::NotInitialised),
        };

        let counts = match driver.encoder_counts() {
            Some(c) => c,
            None => {
                warn!("Encoder read failed, latching controller inactive");
                self.active = false;
                report.encoder_fault = true;
                return Ok([0.0; NUM_WHEELS]);
            }
        };

        let now = Instant::now();
        let last_time = match self.last_enc_time.replace(now) {
            Some(t) => t,
            None => {
                self.last_counts = counts;
                return Ok([0.0; NUM_WHEELS]);
            }
        };

        let mut dt_s = now.duration_since(last_time).as_secs_f64();

        if dt_s > MAX_ENC_DT_S {
            // Too long since the last read for a believable delta, restart
            // from the fresh counts
            debug!("Encoder delta spans {:.2} s, treating as cold start", dt_s);
            self.last_counts = counts;
            return Ok([0.0; NUM_WHEELS]);
        }

        if dt_s <= 0.0 {
            dt_s = MIN_ENC_DT_S;
        }

        let rads_per_count = 2.0 * PI / self.params.counts_per_rev;
        let mut rates = [0.0; NUM_WHEELS];

        for i in 0..NUM_WHEELS {
            let delta = counts[i].wrapping_sub(self.last_counts[i]) as f64;
            let mut rate = delta * rads_per_count / dt_s;

            if rate.abs() > self.params.wheel_speed_glitch_rads {
                debug!(
                    "Implausible rate {:.1} rad/s on wheel {}, reading zeroed",
                    rate, i
                );
                rate = 0.0;
            }

            rates[i] = rate;
        }

        self.last_counts = counts;
        self.reading_count += 1;
        report.velocity_fresh = true;

        Ok(rates)
    }
}

#[cfg(test)]
impl VelCtrl {
    /// An initialised controller over the given driver with default
    /// parameters, skipping the parameter files and hardware bring-up.
    pub(crate) fn initialised_for_test(driver: MotDriver) -> Self {
        let model = MecanumModel::new(&kinematics::Params::default()).unwrap();

        let mut ctrl = Self::default();
        ctrl.driver = Some(driver);
        ctrl.model = Some(model);
        ctrl.odometry = Some(Odometry::new(model));
        ctrl.last_enc_time = Some(Instant::now());
        ctrl.active = true;
        ctrl
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
