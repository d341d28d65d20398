//! Attitude-relative gravity removal and stillness classification
//! Pure functions over a single IMU reading; all state lives in the estimator

use crate::types::Vec3;

pub const GRAVITY: f64 = 9.81; // m/s²

/// Sign applied to each body axis of the mounted IMU
pub const AXIS_CORRECTION: [f64; 3] = [-1.0, -1.0, -1.0];

/// Gravity as seen on the body axes for a given attitude
///
/// Physics:
///   gx =  g·sin(pitch)
///   gy = -g·sin(roll)·cos(pitch)
///   gz =  g·cos(roll)·cos(pitch)
pub fn gravity_components(roll_rad: f64, pitch_rad: f64, gravity_magnitude: f64) -> Vec3 {
    let (sin_roll, cos_roll) = roll_rad.sin_cos();
    let (sin_pitch, cos_pitch) = pitch_rad.sin_cos();
    Vec3::new(
        gravity_magnitude * sin_pitch,
        -gravity_magnitude * sin_roll * cos_pitch,
        gravity_magnitude * cos_roll * cos_pitch,
    )
}

/// Remove gravity's projection from a raw accelerometer reading
///
/// Usage: attitude in radians, acceleration in m/s². Output is the
/// kinematic acceleration on body axes.
pub fn compensate(
    acc_x: f64,
    acc_y: f64,
    acc_z: f64,
    roll_rad: f64,
    pitch_rad: f64,
    gravity_magnitude: f64,
) -> Vec3 {
    Vec3::new(acc_x, acc_y, acc_z) - gravity_components(roll_rad, pitch_rad, gravity_magnitude)
}

/// Flip body axes to the robot frame
pub fn correct_axes(acc: Vec3) -> Vec3 {
    Vec3::new(
        acc.x * AXIS_CORRECTION[0],
        acc.y * AXIS_CORRECTION[1],
        acc.z * AXIS_CORRECTION[2],
    )
}

/// Single-sample stillness test: |a| below threshold
///
/// Stateless. Debouncing is done by the caller.
pub fn classify(ax: f64, ay: f64, az: f64, magnitude_threshold: f64) -> bool {
    (ax * ax + ay * ay + az * az).sqrt() < magnitude_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_level_body_cancels_gravity() {
        let out = compensate(0.0, 0.0, GRAVITY, 0.0, 0.0, GRAVITY);
        assert_abs_diff_eq!(out.x, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(out.y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(out.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_pitched_body_cancels_gravity() {
        let pitch = 30f64.to_radians();
        let out = compensate(
            GRAVITY * pitch.sin(),
            0.0,
            GRAVITY * pitch.cos(),
            0.0,
            pitch,
            GRAVITY,
        );
        assert_abs_diff_eq!(GRAVITY * pitch.sin(), 4.905, epsilon = 1e-9);
        assert_abs_diff_eq!(out.norm(), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_rolled_body_cancels_gravity() {
        let roll = 20f64.to_radians();
        let g = gravity_components(roll, 0.0, GRAVITY);
        assert!(g.y < 0.0);
        let out = compensate(g.x, g.y, g.z, roll, 0.0, GRAVITY);
        assert_abs_diff_eq!(out.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_kinematic_acceleration_survives() {
        let out = compensate(1.5, -0.5, GRAVITY + 0.25, 0.0, 0.0, GRAVITY);
        assert_abs_diff_eq!(out.x, 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(out.y, -0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(out.z, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_axis_correction_preserves_magnitude() {
        let acc = Vec3::new(1.0, -2.0, 3.0);
        let corrected = correct_axes(acc);
        assert_eq!(corrected, Vec3::new(-1.0, 2.0, -3.0));
        assert_abs_diff_eq!(corrected.norm(), acc.norm(), epsilon = 1e-12);
    }

    #[test]
    fn test_classify_threshold() {
        assert!(classify(0.05, 0.0, 0.05, 0.1));
        assert!(!classify(0.1, 0.0, 0.0, 0.1));
        // 3-4-5 triangle: magnitude 0.5
        assert!(!classify(0.3, 0.4, 0.0, 0.5));
        assert!(classify(0.3, 0.4, 0.0, 0.51));
    }
}
