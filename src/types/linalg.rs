//! Linear algebra type system for the locomotion stack
//!
//! Fixed-size vectors for every wire contract.

use nalgebra::{SVector, Vector3};

// ===== Robot Dimensions =====
pub const NUM_LEGS: usize = 4;
pub const JOINTS_PER_LEG: usize = 3;
pub const NUM_JOINTS: usize = NUM_LEGS * JOINTS_PER_LEG; // 12

// ===== Observation Layout =====
pub const OBS_LIN: usize = 3; // linear accel / velocity
pub const OBS_ANG_VEL: usize = 3;
pub const OBS_ORIENTATION: usize = 3;
pub const OBS_COMMAND: usize = 4;
pub const OBS_GAIT: usize = 1;
pub const OBS_QPOS: usize = NUM_JOINTS;
pub const OBS_QVEL: usize = NUM_JOINTS;
pub const OBS_ACTION: usize = NUM_JOINTS;
pub const OBS_HEIGHT: usize = 16; // terrain height placeholders

pub const OBS_DIM: usize = OBS_LIN
    + OBS_ANG_VEL
    + OBS_ORIENTATION
    + OBS_COMMAND
    + OBS_GAIT
    + OBS_QPOS
    + OBS_QVEL
    + OBS_ACTION
    + OBS_HEIGHT; // 66

// Offsets of each group inside the observation vector
pub const OBS_LIN_OFFSET: usize = 0;
pub const OBS_ANG_VEL_OFFSET: usize = OBS_LIN_OFFSET + OBS_LIN;
pub const OBS_ORIENTATION_OFFSET: usize = OBS_ANG_VEL_OFFSET + OBS_ANG_VEL;
pub const OBS_COMMAND_OFFSET: usize = OBS_ORIENTATION_OFFSET + OBS_ORIENTATION;
pub const OBS_GAIT_OFFSET: usize = OBS_COMMAND_OFFSET + OBS_COMMAND;
pub const OBS_QPOS_OFFSET: usize = OBS_GAIT_OFFSET + OBS_GAIT;
pub const OBS_QVEL_OFFSET: usize = OBS_QPOS_OFFSET + OBS_QPOS;
pub const OBS_ACTION_OFFSET: usize = OBS_QVEL_OFFSET + OBS_QVEL;
pub const OBS_HEIGHT_OFFSET: usize = OBS_ACTION_OFFSET + OBS_ACTION;

// ===== Vector Types =====
pub type Vec3 = Vector3<f64>;
pub type ObservationVec = SVector<f64, OBS_DIM>;
