//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    let mut ret = value;

    if ret > max {
        ret = max
    }
    if ret < min {
        ret = min
    }

    ret
}

/// Normalise an angle in radians into the range `(-pi, pi]`.
///
/// Uses the atan2 identity so the result is exact for any input, including
/// angles many turns away from the principal range.
pub fn norm_angle<T>(angle: T) -> T
where
    T: Float,
{
    angle.sin().atan2(angle.cos())
}

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {

    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(0.5, 0.0, 1.0), 0.5);
        assert_eq!(clamp(-0.5, 0.0, 1.0), 0.0);
        assert_eq!(clamp(1.5, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-120.0, -100.0, 100.0), -100.0);
    }

    #[test]
    fn test_norm_angle() {
        // Already in range, should be untouched (to within float error)
        assert!((norm_angle(1.0f64) - 1.0).abs() < 1e-12);
        assert!((norm_angle(-3.0f64) + 3.0).abs() < 1e-12);

        // One full turn away
        assert!((norm_angle(1.0 + 2.0 * PI) - 1.0).abs() < 1e-9);
        assert!((norm_angle(1.0 - 2.0 * PI) - 1.0).abs() < 1e-9);

        // Just over the wrap, should come back negative
        assert!(norm_angle(PI + 0.1) < 0.0);
        assert!((norm_angle(PI + 0.1) + PI - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 1.0), (0.0, 100.0), 0.5), 50.0);
        assert_eq!(lin_map((-1.0, 1.0), (0.0, 10.0), 0.0), 5.0);
    }
}
