//! Gyro-only 3DoF orientation integrator.
//!
//! Body-frame integration of angular velocity into a unit quaternion, with a
//! per-sample rotation clamp and renormalization after every step. There is no
//! drift correction: the recenter anchor is the user's way to redefine forward.

use crate::config::OrientationConfig;
use crate::types::ImuSample;
use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Norms below this are treated as degenerate.
const MIN_NORM: f32 = 1e-6;

/// Orientation integrator state. Mutated only through [`Orientation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationState {
    pub current: UnitQuaternion<f32>,
    pub recenter_anchor: UnitQuaternion<f32>,
    /// Tick of the previous sample. 0 = no delta-time reference yet.
    pub last_tick: u32,
    pub gyro_scale: f32,
    pub max_step_rad: f32,
}

impl OrientationState {
    pub fn new(config: &OrientationConfig) -> Self {
        Self {
            current: UnitQuaternion::identity(),
            recenter_anchor: UnitQuaternion::identity(),
            last_tick: 0,
            gyro_scale: config.gyro_scale,
            max_step_rad: config.max_step_rad,
        }
    }

    /// Integrate one sample. Returns true if `current` changed.
    ///
    /// Never fails: invalid, zero, non-finite or out-of-order samples are
    /// absorbed by leaving `current` untouched.
    pub fn integrate(&mut self, sample: &ImuSample) -> bool {
        if !sample.valid {
            return false;
        }

        let prev_tick = self.last_tick;
        self.last_tick = sample.tick;
        if prev_tick == 0 || sample.tick <= prev_tick {
            return false;
        }
        let dt = (sample.tick - prev_tick) as f32 * 0.001;

        let [wx, wy, wz] = sample.angular_velocity();
        let omega = Vector3::new(wx, wy, wz) * self.gyro_scale;
        if !omega.iter().all(|c| c.is_finite()) {
            log::trace!("Dropping non-finite gyro sample at tick {}", sample.tick);
            return false;
        }

        let angle = (omega.norm() * dt).min(self.max_step_rad);
        if angle <= 0.0 {
            return false;
        }
        let axis = match Unit::try_new(omega, MIN_NORM) {
            Some(axis) => axis,
            None => return false,
        };

        let delta = UnitQuaternion::from_axis_angle(&axis, angle);
        match normalized(self.current.into_inner() * delta.into_inner()) {
            Some(q) => {
                self.current = q;
                true
            }
            None => false,
        }
    }

    /// `inverse(recenter_anchor) * current`, unnormalized.
    pub fn relative(&self) -> Quaternion<f32> {
        self.recenter_anchor.conjugate().into_inner() * self.current.into_inner()
    }

    pub fn recenter(&mut self) {
        self.recenter_anchor = self.current;
    }
}

/// Normalize `q`, or `None` if its norm is ~0 or not finite.
fn normalized(q: Quaternion<f32>) -> Option<UnitQuaternion<f32>> {
    let n = q.norm();
    if !n.is_finite() || n <= MIN_NORM {
        return None;
    }
    Unit::try_new(q, MIN_NORM)
}

/// Validate a quaternion for reporting: unit-normalized, or identity if degenerate.
pub fn sanitize(q: Quaternion<f32>) -> UnitQuaternion<f32> {
    normalized(q).unwrap_or_else(UnitQuaternion::identity)
}

/// Shared handle to the orientation state.
///
/// Every read and write goes through the same scoped lock, so a recenter or a
/// pose read can never observe a half-applied integration step.
#[derive(Debug)]
pub struct Orientation {
    state: Mutex<OrientationState>,
}

impl Orientation {
    pub fn new(config: &OrientationConfig) -> Self {
        Self {
            state: Mutex::new(OrientationState::new(config)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OrientationState> {
        // The state is Copy and always left consistent, so a panic elsewhere
        // while holding the lock cannot leave it half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn integrate(&self, sample: &ImuSample) -> bool {
        self.lock().integrate(sample)
    }

    /// Anchor-relative orientation, identity if the result is degenerate.
    pub fn relative_orientation(&self) -> UnitQuaternion<f32> {
        let rel = self.lock().relative();
        sanitize(rel)
    }

    /// Snapshot `current` into the recenter anchor.
    pub fn recenter(&self) {
        self.lock().recenter();
        log::info!("Recenter: orientation anchor reset");
    }

    pub fn snapshot(&self) -> OrientationState {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-4;

    fn unscaled() -> OrientationState {
        OrientationState::new(&OrientationConfig {
            gyro_scale: 1.0,
            max_step_rad: 0.35,
        })
    }

    fn assert_unit(q: &UnitQuaternion<f32>) {
        let n = q.into_inner().norm();
        assert!((n - 1.0).abs() < EPS, "norm drifted to {}", n);
    }

    /// xorshift32, enough to drive a pseudo-random sample sequence.
    fn next(seed: &mut u32) -> f32 {
        *seed ^= *seed << 13;
        *seed ^= *seed >> 17;
        *seed ^= *seed << 5;
        (*seed as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    #[test]
    fn test_norm_stays_unit_over_random_sequence() {
        let mut state = unscaled();
        let mut seed = 0x1234_5678u32;
        let mut tick = 1u32;
        for _ in 0..5000 {
            tick += 1 + (next(&mut seed).abs() * 20.0) as u32;
            let w = [next(&mut seed) * 40.0, next(&mut seed) * 40.0, next(&mut seed) * 40.0];
            state.integrate(&ImuSample::from_rad(w, tick));
            assert_unit(&state.current);
        }
    }

    #[test]
    fn test_first_sample_only_stores_tick() {
        let mut state = unscaled();
        assert!(!state.integrate(&ImuSample::from_rad([1.0, 0.0, 0.0], 100)));
        assert_eq!(state.current, UnitQuaternion::identity());
        assert_eq!(state.last_tick, 100);
    }

    #[test]
    fn test_zero_dt_does_not_change_orientation() {
        let mut state = unscaled();
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 100));
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 110));
        let before = state.current;
        assert!(!state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 110)));
        assert_eq!(state.current, before);
    }

    #[test]
    fn test_out_of_order_tick_is_skipped_but_stored() {
        let mut state = unscaled();
        state.integrate(&ImuSample::from_rad([0.0, 0.0, 1.0], 1000));
        let before = state.current;
        assert!(!state.integrate(&ImuSample::from_rad([0.0, 0.0, 1.0], 10)));
        assert_eq!(state.current, before);
        assert_eq!(state.last_tick, 10);
        assert!(state.integrate(&ImuSample::from_rad([0.0, 0.0, 1.0], 20)));
    }

    #[test]
    fn test_integrates_quarter_turn() {
        let mut state = unscaled();
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 1));
        // 0.1 rad per 100 ms step, well under the clamp
        let mut tick = 1;
        for _ in 0..157 {
            tick += 100;
            state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], tick));
        }
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 15.7);
        assert!(state.current.angle_to(&expected) < 1e-2);

        let mut state = unscaled();
        state.integrate(&ImuSample::from_rad([0.0, 0.0, FRAC_PI_2], 1));
        state.integrate(&ImuSample::from_rad([0.0, 0.0, FRAC_PI_2], 201));
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2 * 0.2);
        assert!(state.current.angle_to(&expected) < 1e-5);
    }

    #[test]
    fn test_gyro_scale_applies() {
        let mut state = OrientationState::new(&OrientationConfig {
            gyro_scale: 0.5,
            max_step_rad: 0.35,
        });
        state.integrate(&ImuSample::from_rad([0.4, 0.0, 0.0], 1));
        state.integrate(&ImuSample::from_rad([0.4, 0.0, 0.0], 501));
        let expected = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.1);
        assert!(state.current.angle_to(&expected) < 1e-5);
    }

    #[test]
    fn test_oversized_step_equals_clamped_step() {
        let axis = Vector3::new(1.0f32, 2.0, -0.5).normalize();

        let mut big = unscaled();
        let w = axis * 100.0; // 100 rad/s * 0.02 s = 2 rad, clamped to 0.35
        big.integrate(&ImuSample::from_rad([w.x, w.y, w.z], 1));
        big.integrate(&ImuSample::from_rad([w.x, w.y, w.z], 21));

        let mut exact = unscaled();
        let w = axis * 17.5; // 17.5 rad/s * 0.02 s = exactly 0.35
        exact.integrate(&ImuSample::from_rad([w.x, w.y, w.z], 1));
        exact.integrate(&ImuSample::from_rad([w.x, w.y, w.z], 21));

        assert!(big.current.angle_to(&exact.current) < 1e-5);
        assert!((big.current.angle() - 0.35).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_samples_are_absorbed() {
        let mut state = unscaled();
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 1));
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 101));
        let before = state.current;

        assert!(!state.integrate(&ImuSample::from_rad([0.0, 0.0, 0.0], 201)));
        assert!(!state.integrate(&ImuSample::from_rad([f32::NAN, 1.0, 0.0], 301)));
        assert!(!state.integrate(&ImuSample::from_rad([f32::INFINITY, 0.0, 0.0], 401)));
        assert!(!state.integrate(&ImuSample {
            gyro_rad: [5.0, 0.0, 0.0],
            tick: 501,
            valid: false,
            ..Default::default()
        }));
        assert_eq!(state.current, before);
        assert_unit(&state.current);
    }

    #[test]
    fn test_recenter_yields_identity() {
        let mut state = unscaled();
        state.integrate(&ImuSample::from_rad([0.3, -1.0, 0.2], 1));
        for t in 1..40 {
            state.integrate(&ImuSample::from_rad([0.3, -1.0, 0.2], 1 + t * 50));
        }
        assert!(state.current.angle() > 0.1);

        state.recenter();
        let rel = sanitize(state.relative());
        assert!(rel.angle_to(&UnitQuaternion::identity()) < 1e-3);
    }

    #[test]
    fn test_relative_is_rotation_since_recenter() {
        let mut state = unscaled();
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 1));
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 201));
        state.recenter();
        state.integrate(&ImuSample::from_rad([0.0, 1.0, 0.0], 301));
        let rel = sanitize(state.relative());
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.1);
        assert!(rel.angle_to(&expected) < 1e-5);
    }

    #[test]
    fn test_sanitize_substitutes_identity() {
        assert_eq!(sanitize(Quaternion::new(0.0, 0.0, 0.0, 0.0)), UnitQuaternion::identity());
        assert_eq!(
            sanitize(Quaternion::new(f32::NAN, 0.0, 0.0, 0.0)),
            UnitQuaternion::identity()
        );
        let q = sanitize(Quaternion::new(2.0, 0.0, 0.0, 0.0));
        assert_unit(&q);
    }

    #[test]
    fn test_concurrent_integrate_recenter_and_read() {
        use std::sync::Arc;

        let shared = Arc::new(Orientation::new(&OrientationConfig {
            gyro_scale: 1.0,
            max_step_rad: 0.35,
        }));

        let writer = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                for t in 1..=20_000u32 {
                    shared.integrate(&ImuSample::from_rad([1.0, 2.0, 3.0], t));
                }
            })
        };
        let recenterer = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    shared.recenter();
                }
            })
        };

        for _ in 0..5000 {
            assert_unit(&shared.relative_orientation());
        }
        writer.join().unwrap();
        recenterer.join().unwrap();

        shared.recenter();
        assert!(shared.relative_orientation().angle() < 1e-3);
        assert_unit(&shared.snapshot().current);
    }
}
