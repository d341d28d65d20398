//! Observation codec for the locomotion policy
//!
//! Builds the fixed 66-element feature vector the remote policy consumes.
//! Field order is a wire contract:
//!
//! | offset | len | field                                  |
//! |--------|-----|----------------------------------------|
//! | 0      | 3   | body linear acceleration or velocity   |
//! | 3      | 3   | body angular velocity [rad/s]          |
//! | 6      | 3   | roll, pitch [rad], yaw placeholder (0) |
//! | 9      | 4   | command vx, vy, vz (0), yaw rate       |
//! | 13     | 1   | gait phase signal                      |
//! | 14     | 12  | joint position minus neutral stance    |
//! | 26     | 12  | joint velocity                         |
//! | 38     | 12  | previous raw action                    |
//! | 50     | 16  | terrain height placeholders (0)        |

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::state_estimator::EstimateOutput;
use crate::types::*;

/// Stance the policy's joint-position inputs are measured against
pub const OBS_NEUTRAL_STANCE: [f64; NUM_JOINTS] = [
    0.0, -1.0, 1.8, // FL: hip, thigh, calf
    0.0, -1.0, 1.8, // FR
    0.0, -1.0, 1.8, // HL
    0.0, -1.0, 1.8, // HR
];

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationScales {
    pub lin_vel: f64,
    pub ang_vel: f64,
    pub qpos: f64,
    pub qvel: f64,
    pub height: f64,
}

impl Default for ObservationScales {
    fn default() -> Self {
        Self {
            lin_vel: 2.0,
            ang_vel: 0.25,
            qpos: 1.0,
            qvel: 0.05,
            height: 5.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationNoise {
    /// Global multiplier; 0 disables noise injection entirely
    pub noise_level: f64,
    pub lin_vel: f64,
    pub ang_vel: f64,
    pub orientation: f64,
    pub qpos: f64,
    pub qvel: f64,
    pub height: f64,
}

impl Default for ObservationNoise {
    fn default() -> Self {
        Self {
            noise_level: 1.0,
            lin_vel: 0.1,
            ang_vel: 0.2,
            orientation: 0.05,
            qpos: 0.01,
            qvel: 1.5,
            height: 0.1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    pub scales: ObservationScales,
    pub noise: ObservationNoise,
    /// Joint positions are reported relative to this pose
    pub neutral_stance: [f64; NUM_JOINTS],
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            scales: ObservationScales::default(),
            noise: ObservationNoise::default(),
            neutral_stance: OBS_NEUTRAL_STANCE,
        }
    }
}

impl ObservationConfig {
    pub fn validate(&self) -> ControlResult<()> {
        let s = &self.scales;
        let n = &self.noise;
        let values = [
            s.lin_vel, s.ang_vel, s.qpos, s.qvel, s.height, n.noise_level, n.lin_vel, n.ang_vel,
            n.orientation, n.qpos, n.qvel, n.height,
        ];
        if values.iter().chain(self.neutral_stance.iter()).any(|v| !v.is_finite()) {
            return Err(ControlError::InvalidConfig(
                "observation scales, noise and neutral stance must be finite".to_string(),
            ));
        }
        if [n.noise_level, n.lin_vel, n.ang_vel, n.orientation, n.qpos, n.qvel, n.height]
            .iter()
            .any(|v| *v < 0.0)
        {
            return Err(ControlError::InvalidConfig(
                "observation noise amplitudes must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Observation ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation(ObservationVec);

impl Observation {
    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.as_slice().to_vec()
    }

    pub fn len(&self) -> usize {
        OBS_DIM
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Validate an untyped buffer against the contract length
    pub fn from_slice(values: &[f64]) -> ControlResult<Self> {
        if values.len() != OBS_DIM {
            return Err(ControlError::ObservationLength {
                expected: OBS_DIM,
                actual: values.len(),
            });
        }
        Ok(Self(ObservationVec::from_column_slice(values)))
    }
}

// ─── Codec ───────────────────────────────────────────────────────────────────

pub struct ObservationCodec {
    config: ObservationConfig,
    scale_vec: ObservationVec,
    noise_vec: ObservationVec,
}

impl ObservationCodec {
    pub fn new(config: ObservationConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            scale_vec: Self::build_scale_vec(&config.scales),
            noise_vec: Self::build_noise_vec(&config),
            config,
        })
    }

    pub fn config(&self) -> &ObservationConfig {
        &self.config
    }

    /// Assemble the raw (unscaled) observation for one inference tick
    pub fn encode(
        &self,
        estimate: &EstimateOutput,
        imu: &ImuSample,
        joints: &JointTelemetry,
        previous_action: &[f64; NUM_JOINTS],
        command: &MotionCommand,
        gait_signal: f64,
    ) -> Observation {
        let mut obs = ObservationVec::zeros();

        let linear = estimate.linear();
        obs.fixed_rows_mut::<OBS_LIN>(OBS_LIN_OFFSET).copy_from(&linear);

        obs[OBS_ANG_VEL_OFFSET] = imu.angular_velocity_roll.to_radians();
        obs[OBS_ANG_VEL_OFFSET + 1] = imu.angular_velocity_pitch.to_radians();
        obs[OBS_ANG_VEL_OFFSET + 2] = imu.angular_velocity_yaw.to_radians();

        // Global yaw is not observable to the policy; trained at 0
        obs[OBS_ORIENTATION_OFFSET] = imu.roll.to_radians();
        obs[OBS_ORIENTATION_OFFSET + 1] = imu.pitch.to_radians();
        obs[OBS_ORIENTATION_OFFSET + 2] = 0.0;

        obs[OBS_COMMAND_OFFSET] = command.forward_speed;
        obs[OBS_COMMAND_OFFSET + 1] = command.lateral_speed;
        obs[OBS_COMMAND_OFFSET + 2] = 0.0;
        obs[OBS_COMMAND_OFFSET + 3] = command.turn_rate;

        obs[OBS_GAIT_OFFSET] = gait_signal;

        for (i, joint) in joints.iter().enumerate() {
            obs[OBS_QPOS_OFFSET + i] = joint.position - self.config.neutral_stance[i];
            obs[OBS_QVEL_OFFSET + i] = joint.velocity;
        }
        for (i, a) in previous_action.iter().enumerate() {
            obs[OBS_ACTION_OFFSET + i] = *a;
        }
        // Height map stays zero until terrain sensing exists

        Observation(obs)
    }

    /// Scale each field and inject uniform noise, reproducing the training
    /// distribution: `out[i] = obs[i] * scale[i] + noise[i] * U(-1, 1)`.
    ///
    /// Rejects buffers whose length differs from the contract length.
    pub fn apply_scaling_and_noise<R: Rng + ?Sized>(
        &self,
        obs: &[f64],
        rng: &mut R,
    ) -> ControlResult<Observation> {
        let raw = Observation::from_slice(obs)?;
        let mut out = raw.0.component_mul(&self.scale_vec);
        for (value, amplitude) in out.iter_mut().zip(self.noise_vec.iter()) {
            if *amplitude != 0.0 {
                *value += amplitude * rng.gen_range(-1.0_f64..=1.0);
            }
        }
        Ok(Observation(out))
    }

    pub fn scale_vec(&self) -> &ObservationVec {
        &self.scale_vec
    }

    pub fn noise_vec(&self) -> &ObservationVec {
        &self.noise_vec
    }

    fn build_scale_vec(s: &ObservationScales) -> ObservationVec {
        let mut v = ObservationVec::from_element(1.0);
        fill(&mut v, OBS_LIN_OFFSET, OBS_LIN, s.lin_vel);
        fill(&mut v, OBS_ANG_VEL_OFFSET, OBS_ANG_VEL, s.ang_vel);
        // Orientation, gait and previous action are passed unscaled
        v[OBS_COMMAND_OFFSET] = s.lin_vel;
        v[OBS_COMMAND_OFFSET + 1] = s.lin_vel;
        v[OBS_COMMAND_OFFSET + 2] = s.lin_vel;
        v[OBS_COMMAND_OFFSET + 3] = s.ang_vel;
        fill(&mut v, OBS_QPOS_OFFSET, OBS_QPOS, s.qpos);
        fill(&mut v, OBS_QVEL_OFFSET, OBS_QVEL, s.qvel);
        fill(&mut v, OBS_HEIGHT_OFFSET, OBS_HEIGHT, s.height);
        v
    }

    fn build_noise_vec(config: &ObservationConfig) -> ObservationVec {
        let s = &config.scales;
        let n = &config.noise;
        let level = n.noise_level;
        let mut v = ObservationVec::zeros();
        fill(&mut v, OBS_LIN_OFFSET, OBS_LIN, level * n.lin_vel * s.lin_vel);
        fill(&mut v, OBS_ANG_VEL_OFFSET, OBS_ANG_VEL, level * n.ang_vel * s.ang_vel);
        fill(&mut v, OBS_ORIENTATION_OFFSET, OBS_ORIENTATION, level * n.orientation);
        fill(&mut v, OBS_QPOS_OFFSET, OBS_QPOS, level * n.qpos * s.qpos);
        fill(&mut v, OBS_QVEL_OFFSET, OBS_QVEL, level * n.qvel * s.qvel);
        fill(&mut v, OBS_HEIGHT_OFFSET, OBS_HEIGHT, level * n.height * s.height);
        v
    }
}

fn fill(v: &mut ObservationVec, offset: usize, len: usize, value: f64) {
    v.rows_mut(offset, len).fill(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::GRAVITY;
    use crate::state_estimator::{EstimatorConfig, StateEstimator};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn neutral_joints() -> JointTelemetry {
        let mut joints = [JointState::default(); NUM_JOINTS];
        for (joint, neutral) in joints.iter_mut().zip(OBS_NEUTRAL_STANCE.iter()) {
            joint.position = *neutral;
        }
        joints
    }

    fn level_estimate() -> EstimateOutput {
        let mut est = StateEstimator::new(EstimatorConfig::default()).unwrap();
        est.estimate(&ImuSample::level(GRAVITY), 0.005)
    }

    #[test]
    fn test_level_stance_encodes_zero_body_fields() {
        let codec = ObservationCodec::new(ObservationConfig::default()).unwrap();
        let obs = codec.encode(
            &level_estimate(),
            &ImuSample::level(GRAVITY),
            &neutral_joints(),
            &[0.0; NUM_JOINTS],
            &MotionCommand::default(),
            0.5,
        );

        assert_eq!(obs.len(), 66);
        assert_eq!(obs.as_slice().len(), 66);
        for value in &obs.as_slice()[..9] {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-6);
        }
        assert_eq!(obs.as_slice()[OBS_GAIT_OFFSET], 0.5);
        for value in &obs.as_slice()[OBS_QPOS_OFFSET..] {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_field_by_field_layout() {
        let codec = ObservationCodec::new(ObservationConfig::default()).unwrap();
        let imu = ImuSample {
            roll: 90.0,
            pitch: -45.0,
            yaw: 123.0,
            angular_velocity_roll: 180.0,
            angular_velocity_pitch: 0.0,
            angular_velocity_yaw: -90.0,
            acc_z: GRAVITY,
            ..ImuSample::default()
        };
        let mut joints = neutral_joints();
        joints[4].position = -0.5; // FR thigh
        joints[11].velocity = 2.5; // HR knee
        let mut previous_action = [0.0; NUM_JOINTS];
        previous_action[0] = 0.3;
        previous_action[11] = -0.7;
        let command = MotionCommand {
            forward_speed: 1.0,
            lateral_speed: -0.2,
            turn_rate: 0.785,
        };

        let obs = codec.encode(&level_estimate(), &imu, &joints, &previous_action, &command, 0.9);
        let o = obs.as_slice();

        assert_abs_diff_eq!(o[3], std::f64::consts::PI, epsilon = 1e-12);
        assert_abs_diff_eq!(o[5], -std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(o[6], std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(o[7], -std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
        assert_eq!(o[8], 0.0);
        assert_eq!(&o[9..13], &[1.0, -0.2, 0.0, 0.785]);
        assert_eq!(o[13], 0.9);
        assert_abs_diff_eq!(o[14 + 4], 0.5, epsilon = 1e-12);
        assert_eq!(o[26 + 11], 2.5);
        assert_eq!(o[38], 0.3);
        assert_eq!(o[49], -0.7);
        assert!(o[50..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_scaling_without_noise() {
        let config = ObservationConfig {
            noise: ObservationNoise { noise_level: 0.0, ..ObservationNoise::default() },
            ..ObservationConfig::default()
        };
        let codec = ObservationCodec::new(config).unwrap();
        let input = vec![1.0; OBS_DIM];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let out = codec.apply_scaling_and_noise(&input, &mut rng).unwrap();
        let o = out.as_slice();

        assert_eq!(o[0], 2.0); // lin
        assert_eq!(o[3], 0.25); // ang
        assert_eq!(o[6], 1.0); // orientation
        assert_eq!(&o[9..13], &[2.0, 2.0, 2.0, 0.25]);
        assert_eq!(o[13], 1.0); // gait
        assert_eq!(o[14], 1.0); // qpos
        assert_abs_diff_eq!(o[26], 0.05, epsilon = 1e-12); // qvel
        assert_eq!(o[38], 1.0); // action
        assert_eq!(o[50], 5.0); // height
    }

    #[test]
    fn test_noise_bounded_and_deterministic() {
        let codec = ObservationCodec::new(ObservationConfig::default()).unwrap();
        let input = vec![0.0; OBS_DIM];

        let mut rng_a = ChaCha8Rng::seed_from_u64(42);
        let mut rng_b = ChaCha8Rng::seed_from_u64(42);
        let a = codec.apply_scaling_and_noise(&input, &mut rng_a).unwrap();
        let b = codec.apply_scaling_and_noise(&input, &mut rng_b).unwrap();
        assert_eq!(a, b);

        let noise = codec.noise_vec();
        for (value, amplitude) in a.as_slice().iter().zip(noise.iter()) {
            assert!(value.abs() <= *amplitude + 1e-12);
        }
        // Command, gait and action fields are never perturbed
        assert!(a.as_slice()[9..14].iter().all(|v| *v == 0.0));
        assert!(a.as_slice()[38..50].iter().all(|v| *v == 0.0));
        // lin: 1.0 * 0.1 * 2.0, qvel: 1.0 * 1.5 * 0.05, height: 0.1 * 5.0
        assert_abs_diff_eq!(noise[0], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(noise[26], 0.075, epsilon = 1e-12);
        assert_abs_diff_eq!(noise[50], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let codec = ObservationCodec::new(ObservationConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for len in [0, 65, 67] {
            let input = vec![0.0; len];
            match codec.apply_scaling_and_noise(&input, &mut rng) {
                Err(ControlError::ObservationLength { expected, actual }) => {
                    assert_eq!(expected, 66);
                    assert_eq!(actual, len);
                }
                other => panic!("expected length error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_rejects_negative_noise() {
        let config = ObservationConfig {
            noise: ObservationNoise { qvel: -1.0, ..ObservationNoise::default() },
            ..ObservationConfig::default()
        };
        assert!(ObservationCodec::new(config).is_err());
    }
}
