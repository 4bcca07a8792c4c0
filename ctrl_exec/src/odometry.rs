//! # Dead-reckoning odometry
//!
//! Integrates measured wheel rates into a 2D pose estimate. The estimator
//! runs open loop off the encoders only, so it guards hard against the two
//! things that poison dead-reckoning: stale timesteps and implausible rate
//! spikes. Rejected updates re-stamp the clock but leave the pose alone,
//! which keeps one bad reading from blowing up the next timestep.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use std::time::Instant;

// Internal
use crate::kinematics::MecanumModel;
use util::maths::norm_angle;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Updates further apart than this integrate nothing, the reading is stale.
///
/// Units: seconds
const MAX_DT_S: f64 = 1.0;

/// Largest believable body translation rate.
///
/// Units: meters/second
const MAX_LINEAR_MS: f64 = 2.0;

/// Largest believable body rotation rate.
///
/// Units: radians/second
const MAX_ANGULAR_RADS: f64 = 10.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A 2D pose estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    /// Units: meters
    pub x_m: f64,

    /// Units: meters
    pub y_m: f64,

    /// Heading, always in `(-pi, pi]`.
    ///
    /// Units: radians
    pub theta_rad: f64,
}

/// The dead-reckoning estimator.
pub struct Odometry {
    model: MecanumModel,
    enabled: bool,
    pose: Pose,
    last_update: Instant,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Odometry {
    /// Create a new estimator, disabled and at the origin.
    pub fn new(model: MecanumModel) -> Self {
        Self {
            model,
            enabled: false,
            pose: Pose::default(),
            last_update: Instant::now(),
        }
    }

    /// Start estimating from a fresh origin.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.reset(0.0, 0.0, 0.0);
        debug!("Odometry enabled");
    }

    /// Stop estimating. The pose freezes but is not cleared.
    pub fn disable(&mut self) {
        self.enabled = false;
        debug!("Odometry disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Overwrite the pose estimate and re-stamp time.
    pub fn reset(&mut self, x_m: f64, y_m: f64, theta_rad: f64) {
        self.pose = Pose {
            x_m,
            y_m,
            theta_rad: norm_angle(theta_rad),
        };
        self.last_update = Instant::now();
    }

    /// Fold one set of measured wheel rates into the pose.
    ///
    /// Returns whether the pose actually moved. `false` covers the
    /// estimator being disabled, a stale or empty timestep, and rates no
    /// real chassis could produce.
    pub fn update(&mut self, wheel_rads: &[f64; 4]) -> bool {
        if !self.enabled {
            return false;
        }

        let now = Instant::now();
        let dt_s = now.duration_since(self.last_update).as_secs_f64();

        if dt_s <= 0.0 || dt_s > MAX_DT_S {
            self.last_update = now;
            return false;
        }

        let body = self.model.body_velocity(wheel_rads);

        if body.vx_ms.abs() > MAX_LINEAR_MS
            || body.vy_ms.abs() > MAX_LINEAR_MS
            || body.omega_rads.abs() > MAX_ANGULAR_RADS
        {
            debug!(
                "Rejecting implausible body velocity ({:.2}, {:.2}, {:.2})",
                body.vx_ms, body.vy_ms, body.omega_rads
            );
            self.last_update = now;
            return false;
        }

        let (sin_th, cos_th) = self.pose.theta_rad.sin_cos();
        self.pose.x_m += (body.vx_ms * cos_th - body.vy_ms * sin_th) * dt_s;
        self.pose.y_m += (body.vx_ms * sin_th + body.vy_ms * cos_th) * dt_s;
        self.pose.theta_rad = norm_angle(self.pose.theta_rad + body.omega_rads * dt_s);

        self.last_update = now;
        true
    }

    /// A consistent snapshot of the pose.
    pub fn pose(&self) -> Pose {
        self.pose
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;
    use crate::kinematics::Params;
    use std::f64::consts::PI;
    use std::time::Duration;

    fn odometry() -> Odometry {
        Odometry::new(MecanumModel::new(&Params::default()).unwrap())
    }

    /// Pretend the last update happened `millis` ago.
    fn age(odo: &mut Odometry, millis: u64) {
        odo.last_update = Instant::now()
            .checked_sub(Duration::from_millis(millis))
            .unwrap();
    }

    #[test]
    fn test_disabled_is_frozen() {
        let mut odo = odometry();

        age(&mut odo, 100);
        assert!(!odo.update(&[5.0, 5.0, 5.0, 5.0]));
        assert_eq!(odo.pose(), Pose::default());
    }

    #[test]
    fn test_stale_reading_rejected_but_restamped() {
        let mut odo = odometry();
        odo.enable();

        age(&mut odo, 2_000);
        assert!(!odo.update(&[5.0, 5.0, 5.0, 5.0]));
        assert_eq!(odo.pose(), Pose::default());

        // The rejection re-stamped the clock, so a normal timestep now works
        age(&mut odo, 100);
        assert!(odo.update(&[5.0, 5.0, 5.0, 5.0]));
        assert!(odo.pose().y_m < 0.0);
    }

    #[test]
    fn test_implausible_rates_rejected() {
        let mut odo = odometry();
        odo.enable();

        // 190 rad/s on all wheels is over 9 m/s of body velocity
        age(&mut odo, 100);
        assert!(!odo.update(&[190.0, 190.0, 190.0, 190.0]));
        assert_eq!(odo.pose(), Pose::default());

        // A pure-spin pattern over the angular bound is rejected too
        age(&mut odo, 100);
        assert!(!odo.update(&[150.0, 150.0, -150.0, -150.0]));
        assert_eq!(odo.pose(), Pose::default());
    }

    #[test]
    fn test_integration_respects_heading() {
        let mut odo = odometry();
        odo.enable();
        odo.reset(0.0, 0.0, PI / 2.0);

        // Equal wheel rates are -y in the body frame; with the robot facing
        // +y in the world that comes out as +x world motion
        age(&mut odo, 100);
        assert!(odo.update(&[5.0, 5.0, 5.0, 5.0]));

        let pose = odo.pose();
        assert!((pose.x_m - 0.024).abs() < 5e-4, "x {}", pose.x_m);
        assert!(pose.y_m.abs() < 1e-9, "y {}", pose.y_m);
        assert!((pose.theta_rad - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_theta_wraps_into_range() {
        let mut odo = odometry();
        odo.enable();
        odo.reset(0.0, 0.0, 3.0);

        // This spin pattern is 3 rad/s of body rotation
        age(&mut odo, 100);
        assert!(odo.update(&[12.875, 12.875, -12.875, -12.875]));

        let theta = odo.pose().theta_rad;
        assert!(theta > -PI && theta <= PI);
        assert!((theta + 2.983).abs() < 0.02, "theta {}", theta);
    }

    #[test]
    fn test_enable_resets_to_origin() {
        let mut odo = odometry();
        odo.reset(1.0, -2.0, 0.5);

        odo.enable();
        assert_eq!(odo.pose(), Pose::default());

        // Disabling freezes the pose rather than clearing it
        age(&mut odo, 100);
        odo.update(&[5.0, 5.0, 5.0, 5.0]);
        let frozen = odo.pose();
        odo.disable();
        assert!(!odo.update(&[5.0, 5.0, 5.0, 5.0]));
        assert_eq!(odo.pose(), frozen);
    }
}
