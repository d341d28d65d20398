//! Quadruped locomotion control core.
//!
//! IMU state estimation, observation/action codecs for an external
//! locomotion policy, and the tick-driven stand-up/policy sequencer.

pub mod action;
pub mod config;
pub mod control_loop;
pub mod error;
pub mod gait;
pub mod observation;
pub mod physics;
pub mod policy;
pub mod recorder;
pub mod sequencer;
pub mod smoothing;
pub mod state_estimator;
pub mod telemetry;
pub mod types;

pub use config::ControlConfig;
pub use error::{ControlError, ControlResult, PolicyError};
pub use sequencer::{MotionSequencer, Phase};
pub use state_estimator::{EstimateOutput, EstimatorMode, StateEstimator};
