pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One IMU reading delivered per control tick.
///
/// Angles are in degrees, angular rates in deg/s, accelerations in m/s².
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub angular_velocity_roll: f64,
    pub angular_velocity_pitch: f64,
    pub angular_velocity_yaw: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub tick: u64,
}

impl ImuSample {
    /// Level, motionless body sensing only gravity.
    pub fn level(gravity: f64) -> Self {
        Self {
            acc_z: gravity,
            ..Self::default()
        }
    }

    pub fn acceleration(&self) -> Vec3 {
        Vec3::new(self.acc_x, self.acc_y, self.acc_z)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    /// Radians
    pub position: f64,
    /// rad/s
    pub velocity: f64,
}

/// Joint telemetry in the fixed leg/joint order (see [`Leg`]).
pub type JointTelemetry = [JointState; NUM_JOINTS];

/// Legs in wire order. Each leg carries hip abduction, hip flexion, knee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    FrontLeft,
    FrontRight,
    HindLeft,
    HindRight,
}

impl Leg {
    pub const ALL: [Leg; NUM_LEGS] = [Leg::FrontLeft, Leg::FrontRight, Leg::HindLeft, Leg::HindRight];

    /// Index of this leg's first joint in a flat 12-joint array.
    pub fn joint_offset(self) -> usize {
        self as usize * JOINTS_PER_LEG
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointCommand {
    /// Radians
    pub position: f64,
    /// rad/s
    pub velocity: f64,
    /// N·m
    pub torque: f64,
    pub kp: f64,
    pub kd: f64,
}

/// Twelve joint commands grouped by leg in wire order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotCommand {
    pub legs: [[JointCommand; JOINTS_PER_LEG]; NUM_LEGS],
}

impl RobotCommand {
    /// Position-only command: zero feed-forward velocity and torque.
    pub fn from_positions(positions: &[f64; NUM_JOINTS], kp: f64, kd: f64) -> Self {
        let mut cmd = Self::default();
        for leg in Leg::ALL {
            for joint in 0..JOINTS_PER_LEG {
                cmd.legs[leg as usize][joint] = JointCommand {
                    position: positions[leg.joint_offset() + joint],
                    velocity: 0.0,
                    torque: 0.0,
                    kp,
                    kd,
                };
            }
        }
        cmd
    }

    /// Same pose on every leg.
    pub fn from_leg_pose(pose: [f64; JOINTS_PER_LEG], kp: f64, kd: f64) -> Self {
        let mut positions = [0.0; NUM_JOINTS];
        for chunk in positions.chunks_exact_mut(JOINTS_PER_LEG) {
            chunk.copy_from_slice(&pose);
        }
        Self::from_positions(&positions, kp, kd)
    }

    pub fn joint(&self, index: usize) -> &JointCommand {
        &self.legs[index / JOINTS_PER_LEG][index % JOINTS_PER_LEG]
    }

    pub fn positions(&self) -> [f64; NUM_JOINTS] {
        let mut out = [0.0; NUM_JOINTS];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.joint(i).position;
        }
        out
    }
}

/// Operator motion request. Read-only to the control core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub forward_speed: f64,
    pub lateral_speed: f64,
    pub turn_rate: f64,
}

/// Everything the robot reports on one tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotTelemetry {
    pub tick: u64,
    pub imu: ImuSample,
    pub joints: JointTelemetry,
}
