//! Robot I/O seams
//!
//! The vendor UDP protocol lives outside this crate. The control loop reads
//! telemetry from a [`TelemetrySource`] and writes commands to a
//! [`CommandSink`]; the simulated implementations here let the full loop run
//! without hardware.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::physics::GRAVITY;
use crate::types::{ImuSample, JointState, JointTelemetry, RobotCommand, RobotTelemetry, NUM_JOINTS};

pub trait TelemetrySource: Send {
    /// Latest telemetry for `tick`
    fn read(&mut self, tick: u64) -> RobotTelemetry;
}

pub trait CommandSink: Send {
    fn send(&mut self, command: &RobotCommand);
}

/// Rigid body standing still on level ground.
///
/// Joints follow the last command with a first-order lag; the IMU reports
/// gravity plus uniform noise from a seeded generator.
pub struct SimulatedStance {
    joints: JointTelemetry,
    targets: [f64; NUM_JOINTS],
    /// Fraction of the remaining error closed per tick
    tracking_gain: f64,
    dt: f64,
    accel_noise: f64,
    gyro_noise_deg: f64,
    rng: ChaCha8Rng,
}

impl SimulatedStance {
    pub fn new(initial_positions: [f64; NUM_JOINTS], dt: f64, seed: u64) -> Self {
        let mut joints = [JointState::default(); NUM_JOINTS];
        for (joint, position) in joints.iter_mut().zip(initial_positions.iter()) {
            joint.position = *position;
        }
        Self {
            joints,
            targets: initial_positions,
            tracking_gain: 0.1,
            dt,
            accel_noise: 0.02,
            gyro_noise_deg: 0.1,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Noise-free IMU
    pub fn ideal(initial_positions: [f64; NUM_JOINTS], dt: f64) -> Self {
        Self {
            accel_noise: 0.0,
            gyro_noise_deg: 0.0,
            ..Self::new(initial_positions, dt, 0)
        }
    }

    pub fn with_tracking_gain(mut self, gain: f64) -> Self {
        self.tracking_gain = gain.clamp(0.0, 1.0);
        self
    }

    /// Set new joint targets from a command
    pub fn apply(&mut self, command: &RobotCommand) {
        self.targets = command.positions();
    }

    pub fn joints(&self) -> &JointTelemetry {
        &self.joints
    }

    fn noise(&mut self, amplitude: f64) -> f64 {
        if amplitude == 0.0 {
            0.0
        } else {
            amplitude * self.rng.gen_range(-1.0_f64..=1.0)
        }
    }

    fn advance_joints(&mut self) {
        for (joint, target) in self.joints.iter_mut().zip(self.targets.iter()) {
            let step = (target - joint.position) * self.tracking_gain;
            joint.position += step;
            joint.velocity = if self.dt > 0.0 { step / self.dt } else { 0.0 };
        }
    }
}

impl TelemetrySource for SimulatedStance {
    fn read(&mut self, tick: u64) -> RobotTelemetry {
        self.advance_joints();

        let (an, gn) = (self.accel_noise, self.gyro_noise_deg);
        let imu = ImuSample {
            angular_velocity_roll: self.noise(gn),
            angular_velocity_pitch: self.noise(gn),
            angular_velocity_yaw: self.noise(gn),
            acc_x: self.noise(an),
            acc_y: self.noise(an),
            acc_z: GRAVITY + self.noise(an),
            tick,
            ..ImuSample::default()
        };

        RobotTelemetry {
            tick,
            imu,
            joints: self.joints,
        }
    }
}

/// Keeps the most recent command and a count of what was sent
#[derive(Debug, Default)]
pub struct RecordingSink {
    last: Option<RobotCommand>,
    sent: u64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&RobotCommand> {
        self.last.as_ref()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, command: &RobotCommand) {
        self.last = Some(*command);
        self.sent += 1;
    }
}

impl CommandSink for SimulatedStance {
    fn send(&mut self, command: &RobotCommand) {
        self.apply(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_joints_track_command() {
        let mut sim = SimulatedStance::ideal([0.0; NUM_JOINTS], 0.005).with_tracking_gain(0.5);
        sim.apply(&RobotCommand::from_positions(&[1.0; NUM_JOINTS], 45.0, 0.7));

        let first = sim.read(0);
        assert_abs_diff_eq!(first.joints[0].position, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(first.joints[0].velocity, 100.0, epsilon = 1e-9);
        for t in 1..40 {
            sim.read(t);
        }
        assert_abs_diff_eq!(sim.joints()[11].position, 1.0, epsilon = 1e-6);

        // Sending through the sink seam retargets the joints
        sim.send(&RobotCommand::from_positions(&[0.0; NUM_JOINTS], 45.0, 0.7));
        assert_abs_diff_eq!(sim.read(40).joints[3].position, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_ideal_imu_is_level() {
        let mut sim = SimulatedStance::ideal([0.0; NUM_JOINTS], 0.005);
        let t = sim.read(7);
        assert_eq!(t.tick, 7);
        assert_eq!(t.imu, ImuSample { tick: 7, ..ImuSample::level(GRAVITY) });
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let mut a = SimulatedStance::new([0.0; NUM_JOINTS], 0.005, 42);
        let mut b = SimulatedStance::new([0.0; NUM_JOINTS], 0.005, 42);
        for t in 0..10 {
            let (ta, tb) = (a.read(t), b.read(t));
            assert_eq!(ta.imu, tb.imu);
            assert!((ta.imu.acc_z - GRAVITY).abs() <= 0.02);
        }
    }

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::new();
        assert!(sink.last().is_none());
        let cmd = RobotCommand::from_leg_pose([0.0, -1.0, 1.5], 25.0, 1.0);
        sink.send(&cmd);
        sink.send(&cmd);
        assert_eq!(sink.sent(), 2);
        assert_eq!(sink.last(), Some(&cmd));
    }
}
