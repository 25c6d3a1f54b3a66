//! Per-segment kinematics
//!
//! Velocity is displacement over elapsed time. Acceleration divides each velocity
//! component by the same elapsed time again, using the segment's own duration as
//! the Δt proxy rather than the gap between consecutive segments.

use crate::capture_core::types::Displacement;
use serde::{Deserialize, Serialize};

/// Default floor for elapsed time (seconds)
pub const DEFAULT_MIN_DT: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionalRates {
    pub right: f64,
    pub left: f64,
    pub up: f64,
    pub down: f64,
    pub euclidean: f64,
}

impl DirectionalRates {
    fn divided_by(&self, t: f64) -> Self {
        Self {
            right: self.right / t,
            left: self.left / t,
            up: self.up / t,
            down: self.down / t,
            euclidean: self.euclidean / t,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.right == 0.0
            && self.left == 0.0
            && self.up == 0.0
            && self.down == 0.0
            && self.euclidean == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    /// Elapsed time actually used, after the floor
    pub elapsed_secs: f64,
    pub velocity: DirectionalRates,
    pub acceleration: DirectionalRates,
}

/// `max(delta, floor)`; non-finite deltas collapse to the floor
pub fn effective_dt(delta_secs: f64, min_dt: f64) -> f64 {
    if delta_secs.is_finite() && delta_secs > min_dt {
        delta_secs
    } else {
        min_dt
    }
}

impl Kinematics {
    pub fn compute(displacement: &Displacement, delta_secs: f64, min_dt: f64) -> Self {
        let t = effective_dt(delta_secs, min_dt);

        // Euclidean speed uses net displacement, not the sum of all four directions
        let velocity = DirectionalRates {
            right: displacement.right,
            left: displacement.left,
            up: displacement.up,
            down: displacement.down,
            euclidean: displacement.net_dx().hypot(displacement.net_dy()),
        }
        .divided_by(t);

        Self {
            elapsed_secs: t,
            velocity,
            acceleration: velocity.divided_by(t),
        }
    }

    /// No motion in any direction; nothing worth persisting
    pub fn is_stationary(&self) -> bool {
        self.velocity.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_reference_values() {
        let d = Displacement {
            right: 10.0,
            left: 4.0,
            up: 0.0,
            down: 6.0,
        };
        let k = Kinematics::compute(&d, 2.0, DEFAULT_MIN_DT);

        assert_eq!(k.elapsed_secs, 2.0);
        assert_eq!(k.velocity.right, 5.0);
        assert_eq!(k.velocity.left, 2.0);
        assert_eq!(k.velocity.up, 0.0);
        assert_eq!(k.velocity.down, 3.0);
        assert!(approx(k.velocity.euclidean, 4.2426));
        assert_eq!(k.acceleration.right, 2.5);
        assert!(approx(k.acceleration.euclidean, 2.1213));
    }

    #[test]
    fn test_floor_replaces_tiny_delta() {
        let d = Displacement {
            right: 1.0,
            ..Displacement::default()
        };
        let k = Kinematics::compute(&d, 0.0001, 0.01);

        assert_eq!(k.elapsed_secs, 0.01);
        assert!(approx(k.velocity.right, 100.0));
        assert!(approx(k.acceleration.right, 10_000.0));
    }

    #[test]
    fn test_zero_and_invalid_deltas_use_floor() {
        assert_eq!(effective_dt(0.0, 0.01), 0.01);
        assert_eq!(effective_dt(-3.0, 0.01), 0.01);
        assert_eq!(effective_dt(f64::NAN, 0.001), 0.001);
        assert_eq!(effective_dt(0.5, 0.01), 0.5);
    }

    #[test]
    fn test_opposing_motion_cancels_in_euclidean_only() {
        let d = Displacement {
            right: 5.0,
            left: 5.0,
            up: 0.0,
            down: 0.0,
        };
        let k = Kinematics::compute(&d, 1.0, DEFAULT_MIN_DT);

        assert_eq!(k.velocity.euclidean, 0.0);
        assert_eq!(k.velocity.right, 5.0);
        assert!(!k.is_stationary());
    }

    #[test]
    fn test_zero_displacement_is_stationary() {
        let k = Kinematics::compute(&Displacement::default(), 1.0, DEFAULT_MIN_DT);
        assert!(k.is_stationary());
    }
}
