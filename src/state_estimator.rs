// state_estimator.rs — Body-frame motion estimate from a gravity-biased IMU
//
// Pipeline per tick:
//   raw accel → gravity compensation → axis correction → per-axis moving average
//             → stillness classification (debounced) → acceleration or velocity output
//
// Pure computation: no clocks, no I/O. The caller supplies dt for every sample,
// so recorded sessions replay bit-for-bit.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::physics::{self, GRAVITY};
use crate::smoothing::MovingAverage;
use crate::types::{ImuSample, Vec3};

/// Consecutive still classifications required before motion counts as settled
pub const ZERO_MOTION_STREAK_THRESHOLD: u32 = 5;

/// Per-tick velocity decay while settled (velocity mode)
pub const VELOCITY_DECAY: f64 = 0.95;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorMode {
    /// Filtered compensated acceleration, hard-zeroed while settled
    Acceleration,
    /// Integrated velocity and displacement, geometrically decayed while settled
    Velocity,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub mode: EstimatorMode,
    pub window_size: usize,
    pub zero_motion_threshold: f64,
    pub gravity: f64,
    pub enable_gravity_compensation: bool,
    pub enable_axis_correction: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            mode: EstimatorMode::Acceleration,
            window_size: 10,
            zero_motion_threshold: 0.1,
            gravity: GRAVITY,
            enable_gravity_compensation: true,
            enable_axis_correction: false,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> ControlResult<()> {
        validate_window_size(self.window_size)?;
        validate_positive("zero_motion_threshold", self.zero_motion_threshold)?;
        validate_positive("gravity", self.gravity)?;
        Ok(())
    }
}

fn validate_window_size(window_size: usize) -> ControlResult<()> {
    if window_size == 0 {
        return Err(ControlError::InvalidConfig(
            "window_size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_positive(name: &str, value: f64) -> ControlResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ControlError::InvalidConfig(format!(
            "{} must be finite and positive, got {}",
            name, value
        )));
    }
    Ok(())
}

// ─── Output snapshot ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateOutput {
    pub mode: EstimatorMode,
    /// Output acceleration [m/s²]; zero while settled in acceleration mode
    pub acceleration: Vec3,
    /// Integrated velocity [m/s]; always zero in acceleration mode
    pub velocity: Vec3,
    /// Integrated displacement [m]; always zero in acceleration mode
    pub displacement: Vec3,
    pub is_zero_motion: bool,
}

impl EstimateOutput {
    fn zero(mode: EstimatorMode) -> Self {
        Self {
            mode,
            acceleration: Vector3::zeros(),
            velocity: Vector3::zeros(),
            displacement: Vector3::zeros(),
            is_zero_motion: false,
        }
    }

    /// The three linear fields handed to the policy: acceleration or velocity
    /// depending on the mode.
    pub fn linear(&self) -> Vec3 {
        match self.mode {
            EstimatorMode::Acceleration => self.acceleration,
            EstimatorMode::Velocity => self.velocity,
        }
    }
}

// ─── Internal state ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
struct MotionState {
    zero_motion_streak: u32,
    is_zero_motion: bool,
    velocity: Vec3,
    displacement: Vec3,
}

/// Three moving averages, one per body axis
#[derive(Clone, Debug)]
struct AxisFilters {
    x: MovingAverage,
    y: MovingAverage,
    z: MovingAverage,
}

impl AxisFilters {
    fn new(window_size: usize) -> Self {
        Self {
            x: MovingAverage::new(window_size),
            y: MovingAverage::new(window_size),
            z: MovingAverage::new(window_size),
        }
    }

    fn update(&mut self, acc: Vec3) -> Vec3 {
        Vec3::new(self.x.update(acc.x), self.y.update(acc.y), self.z.update(acc.z))
    }

    fn set_window_size(&mut self, window_size: usize) {
        self.x.set_window_size(window_size);
        self.y.set_window_size(window_size);
        self.z.set_window_size(window_size);
    }

    fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
    }

    fn len(&self) -> usize {
        self.x.len().max(self.y.len()).max(self.z.len())
    }
}

// ─── The estimator ───────────────────────────────────────────────────────────

pub struct StateEstimator {
    config: EstimatorConfig,
    filters: AxisFilters,
    motion: MotionState,
    last_raw_acc: Vec3,
    last_output: EstimateOutput,
}

impl StateEstimator {
    pub fn new(config: EstimatorConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            filters: AxisFilters::new(config.window_size),
            motion: MotionState::default(),
            last_raw_acc: Vector3::zeros(),
            last_output: EstimateOutput::zero(config.mode),
            config,
        })
    }

    /// Feed one IMU sample taken `dt_seconds` after the previous one.
    ///
    /// A non-positive (or non-finite) `dt`, or a non-finite acceleration, is
    /// rejected: nothing is integrated and the previous output is returned.
    pub fn estimate(&mut self, sample: &ImuSample, dt_seconds: f64) -> EstimateOutput {
        if !(dt_seconds.is_finite() && dt_seconds > 0.0) {
            log::debug!("tick {}: rejected dt {}", sample.tick, dt_seconds);
            return self.last_output;
        }
        let raw = sample.acceleration();
        if !raw.iter().all(|v| v.is_finite()) {
            log::debug!("tick {}: rejected non-finite acceleration", sample.tick);
            return self.last_output;
        }
        self.last_raw_acc = raw;

        let compensated = if self.config.enable_gravity_compensation {
            physics::compensate(
                raw.x,
                raw.y,
                raw.z,
                sample.roll.to_radians(),
                sample.pitch.to_radians(),
                self.config.gravity,
            )
        } else {
            raw
        };
        let corrected = if self.config.enable_axis_correction {
            physics::correct_axes(compensated)
        } else {
            compensated
        };

        let filtered = self.filters.update(corrected);

        let still = physics::classify(filtered.x, filtered.y, filtered.z, self.config.zero_motion_threshold);
        let settled = self.update_streak(still, sample.tick);

        let output = match self.config.mode {
            EstimatorMode::Acceleration => self.step_acceleration(still, settled, filtered),
            EstimatorMode::Velocity => self.step_velocity(still, settled, filtered, dt_seconds),
        };
        self.last_output = output;
        output
    }

    /// Debounce: `still` must repeat for the streak threshold before settling;
    /// a single moving sample releases immediately.
    fn update_streak(&mut self, still: bool, tick: u64) -> bool {
        if still {
            self.motion.zero_motion_streak = self.motion.zero_motion_streak.saturating_add(1);
            if self.motion.zero_motion_streak >= ZERO_MOTION_STREAK_THRESHOLD && !self.motion.is_zero_motion {
                self.motion.is_zero_motion = true;
                log::debug!("tick {}: zero motion settled", tick);
            }
        } else {
            if self.motion.is_zero_motion {
                log::debug!("tick {}: motion resumed", tick);
            }
            self.motion.zero_motion_streak = 0;
            self.motion.is_zero_motion = false;
        }
        self.motion.is_zero_motion
    }

    fn step_acceleration(&self, still: bool, settled: bool, filtered: Vec3) -> EstimateOutput {
        let acceleration = if settled {
            Vector3::zeros()
        } else if still {
            // Debouncing: hold the last output until the streak resolves
            self.last_output.acceleration
        } else {
            filtered
        };
        EstimateOutput {
            mode: EstimatorMode::Acceleration,
            acceleration,
            velocity: Vector3::zeros(),
            displacement: Vector3::zeros(),
            is_zero_motion: settled,
        }
    }

    fn step_velocity(&mut self, still: bool, settled: bool, filtered: Vec3, dt: f64) -> EstimateOutput {
        if settled {
            self.motion.velocity *= VELOCITY_DECAY;
        } else if !still {
            self.motion.velocity += filtered * dt;
        }
        self.motion.displacement += self.motion.velocity * dt;

        EstimateOutput {
            mode: EstimatorMode::Velocity,
            acceleration: filtered,
            velocity: self.motion.velocity,
            displacement: self.motion.displacement,
            is_zero_motion: settled,
        }
    }

    /// Zero all derived state. Configuration is kept.
    pub fn reset(&mut self) {
        self.filters.clear();
        self.motion = MotionState::default();
        self.last_raw_acc = Vector3::zeros();
        self.last_output = EstimateOutput::zero(self.config.mode);
    }

    // ── Runtime configuration ────────────────────────────────────────────

    pub fn set_window_size(&mut self, window_size: usize) -> ControlResult<()> {
        validate_window_size(window_size)?;
        self.config.window_size = window_size;
        self.filters.set_window_size(window_size);
        Ok(())
    }

    pub fn set_zero_motion_threshold(&mut self, threshold: f64) -> ControlResult<()> {
        validate_positive("zero_motion_threshold", threshold)?;
        self.config.zero_motion_threshold = threshold;
        Ok(())
    }

    pub fn set_gravity(&mut self, gravity: f64) -> ControlResult<()> {
        validate_positive("gravity", gravity)?;
        self.config.gravity = gravity;
        Ok(())
    }

    pub fn set_gravity_compensation(&mut self, enable: bool) {
        self.config.enable_gravity_compensation = enable;
    }

    pub fn set_axis_correction(&mut self, enable: bool) {
        self.config.enable_axis_correction = enable;
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn mode(&self) -> EstimatorMode {
        self.config.mode
    }

    pub fn last_output(&self) -> EstimateOutput {
        self.last_output
    }

    pub fn raw_acceleration(&self) -> Vec3 {
        self.last_raw_acc
    }

    pub fn velocity(&self) -> Vec3 {
        self.motion.velocity
    }

    pub fn displacement(&self) -> Vec3 {
        self.motion.displacement
    }

    pub fn is_zero_motion(&self) -> bool {
        self.motion.is_zero_motion
    }

    pub fn zero_motion_streak(&self) -> u32 {
        self.motion.zero_motion_streak
    }

    /// Samples currently held by the axis filters
    pub fn filter_len(&self) -> usize {
        self.filters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn estimator(mode: EstimatorMode, window_size: usize) -> StateEstimator {
        StateEstimator::new(EstimatorConfig {
            mode,
            window_size,
            ..EstimatorConfig::default()
        })
        .unwrap()
    }

    fn sample_with_accel(ax: f64, ay: f64, az: f64) -> ImuSample {
        ImuSample {
            acc_x: ax,
            acc_y: ay,
            acc_z: az,
            ..ImuSample::default()
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let cfg = EstimatorConfig { window_size: 0, ..EstimatorConfig::default() };
        assert!(matches!(StateEstimator::new(cfg), Err(ControlError::InvalidConfig(_))));

        let cfg = EstimatorConfig { zero_motion_threshold: -0.1, ..EstimatorConfig::default() };
        assert!(StateEstimator::new(cfg).is_err());

        let mut est = estimator(EstimatorMode::Acceleration, 10);
        assert!(est.set_window_size(0).is_err());
        assert!(est.set_gravity(f64::NAN).is_err());
        assert_eq!(est.config().window_size, 10);
    }

    #[test]
    fn test_moving_output_is_filtered_compensated_accel() {
        let mut est = estimator(EstimatorMode::Acceleration, 2);
        let out = est.estimate(&sample_with_accel(1.0, 0.0, GRAVITY), 0.005);
        assert_abs_diff_eq!(out.acceleration.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.acceleration.z, 0.0, epsilon = 1e-9);

        let out = est.estimate(&sample_with_accel(3.0, 0.0, GRAVITY), 0.005);
        assert_abs_diff_eq!(out.acceleration.x, 2.0, epsilon = 1e-9);
        assert!(!out.is_zero_motion);
    }

    #[test]
    fn test_four_still_then_moving_does_not_settle() {
        let mut est = estimator(EstimatorMode::Acceleration, 1);
        let still = ImuSample::level(GRAVITY);
        for _ in 0..4 {
            let out = est.estimate(&still, 0.005);
            assert!(!out.is_zero_motion);
        }
        assert_eq!(est.zero_motion_streak(), 4);

        let out = est.estimate(&sample_with_accel(0.5, 0.0, GRAVITY), 0.005);
        assert!(!out.is_zero_motion);
        assert_eq!(est.zero_motion_streak(), 0);
    }

    #[test]
    fn test_five_still_settles_and_zeroes_output() {
        let mut est = estimator(EstimatorMode::Acceleration, 1);
        est.estimate(&sample_with_accel(0.5, 0.0, GRAVITY), 0.005);

        // Slightly noisy but below threshold
        let still = sample_with_accel(0.05, 0.0, GRAVITY);
        for i in 0..5 {
            let out = est.estimate(&still, 0.005);
            if i < 4 {
                assert!(!out.is_zero_motion);
                // Held while debouncing
                assert_abs_diff_eq!(out.acceleration.x, 0.5, epsilon = 1e-9);
            } else {
                assert!(out.is_zero_motion);
                assert_eq!(out.acceleration, Vector3::zeros());
            }
        }
    }

    #[test]
    fn test_single_moving_sample_releases_settled_state() {
        let mut est = estimator(EstimatorMode::Acceleration, 1);
        for _ in 0..10 {
            est.estimate(&ImuSample::level(GRAVITY), 0.005);
        }
        assert!(est.is_zero_motion());

        let out = est.estimate(&sample_with_accel(0.0, 0.8, GRAVITY), 0.005);
        assert!(!out.is_zero_motion);
        assert_abs_diff_eq!(out.acceleration.y, 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_velocity_integration_constant_accel() {
        let mut est = estimator(EstimatorMode::Velocity, 5);
        let a = 1.0;
        let dt: f64 = 0.001;
        let t: f64 = 0.1;
        let steps = (t / dt).round() as usize;
        let sample = sample_with_accel(a, 0.0, GRAVITY);
        for _ in 0..steps {
            est.estimate(&sample, dt);
        }

        let v = est.velocity().x;
        let x = est.displacement().x;
        assert!((v - a * t).abs() < 0.1 * a * t, "velocity {}", v);
        assert!((x - 0.5 * a * t * t).abs() < 0.1 * 0.5 * a * t * t, "displacement {}", x);
        assert_abs_diff_eq!(est.velocity().y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_velocity_decays_geometrically_when_settled() {
        let mut est = estimator(EstimatorMode::Velocity, 1);
        for _ in 0..10 {
            est.estimate(&sample_with_accel(2.0, 0.0, GRAVITY), 0.01);
        }
        let v0 = est.velocity().x;
        assert_relative_eq!(v0, 0.2, epsilon = 1e-9);

        let still = ImuSample::level(GRAVITY);
        // Four debouncing ticks hold velocity
        for _ in 0..4 {
            est.estimate(&still, 0.01);
        }
        assert_relative_eq!(est.velocity().x, v0, epsilon = 1e-12);

        let out = est.estimate(&still, 0.01);
        assert!(out.is_zero_motion);
        assert_relative_eq!(out.velocity.x, v0 * VELOCITY_DECAY, epsilon = 1e-12);

        let out = est.estimate(&still, 0.01);
        assert_relative_eq!(out.velocity.x, v0 * VELOCITY_DECAY * VELOCITY_DECAY, epsilon = 1e-12);
        // Displacement keeps integrating the decaying velocity
        assert!(out.displacement.x > 0.0);
    }

    #[test]
    fn test_non_positive_dt_returns_previous_output() {
        let mut est = estimator(EstimatorMode::Velocity, 3);
        let first = est.estimate(&sample_with_accel(1.0, 0.0, GRAVITY), 0.01);

        let rejected = est.estimate(&sample_with_accel(50.0, 0.0, GRAVITY), 0.0);
        assert_eq!(rejected, first);
        let rejected = est.estimate(&sample_with_accel(50.0, 0.0, GRAVITY), -0.01);
        assert_eq!(rejected, first);
        assert_eq!(est.filter_len(), 1);
    }

    #[test]
    fn test_non_finite_accel_is_ignored() {
        let mut est = estimator(EstimatorMode::Acceleration, 3);
        let first = est.estimate(&sample_with_accel(1.0, 0.0, GRAVITY), 0.005);
        let out = est.estimate(&sample_with_accel(f64::NAN, 0.0, GRAVITY), 0.005);
        assert_eq!(out, first);
        // Rejected samples do not overwrite the last raw reading
        assert_eq!(est.raw_acceleration(), Vector3::new(1.0, 0.0, GRAVITY));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut est = estimator(EstimatorMode::Velocity, 4);
        for i in 0..20 {
            est.estimate(&sample_with_accel(0.5 + i as f64 * 0.1, -0.3, GRAVITY + 0.2), 0.005);
        }
        assert!(est.filter_len() > 0);
        let raw = est.raw_acceleration();
        assert_abs_diff_eq!(raw.x, 2.4, epsilon = 1e-12);
        assert_eq!(raw.y, -0.3);
        assert_eq!(raw.z, GRAVITY + 0.2);

        est.reset();
        assert_eq!(est.raw_acceleration(), Vector3::zeros());
        assert_eq!(est.velocity(), Vector3::zeros());
        assert_eq!(est.displacement(), Vector3::zeros());
        assert_eq!(est.filter_len(), 0);
        assert_eq!(est.zero_motion_streak(), 0);
        assert!(!est.is_zero_motion());

        // Idempotent
        est.reset();
        assert_eq!(est.last_output(), EstimateOutput::zero(EstimatorMode::Velocity));
    }

    #[test]
    fn test_gravity_compensation_toggle() {
        let mut est = estimator(EstimatorMode::Acceleration, 1);
        est.set_gravity_compensation(false);
        let out = est.estimate(&ImuSample::level(GRAVITY), 0.005);
        assert_abs_diff_eq!(out.acceleration.z, GRAVITY, epsilon = 1e-9);
    }

    #[test]
    fn test_axis_correction_flips_output() {
        let mut est = estimator(EstimatorMode::Acceleration, 1);
        est.set_axis_correction(true);
        let out = est.estimate(&sample_with_accel(1.0, -2.0, GRAVITY), 0.005);
        assert_abs_diff_eq!(out.acceleration.x, -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.acceleration.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tilted_still_body_settles() {
        let mut est = estimator(EstimatorMode::Acceleration, 10);
        let roll: f64 = 5.0;
        let pitch: f64 = -8.0;
        let g = physics::gravity_components(roll.to_radians(), pitch.to_radians(), GRAVITY);
        let sample = ImuSample {
            roll,
            pitch,
            acc_x: g.x,
            acc_y: g.y,
            acc_z: g.z,
            ..ImuSample::default()
        };
        for _ in 0..ZERO_MOTION_STREAK_THRESHOLD {
            est.estimate(&sample, 0.005);
        }
        assert!(est.is_zero_motion());
    }
}
