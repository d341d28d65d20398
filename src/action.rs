use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult, PolicyError};
use crate::policy::PolicyResponse;
use crate::types::{RobotCommand, NUM_JOINTS};

/// Per-joint action scale. Joints with a narrow range (hip abduction) get
/// the smallest scale.
/// Order: FL_HipX, FL_HipY, FL_Knee, FR_..., HL_..., HR_...
pub const ACTION_SCALE: [f64; NUM_JOINTS] = [
    0.2, 1.0, 0.8, // FL: range ±0.523, [-2.67, 0.314], [0.524, 2.792]
    0.2, 1.0, 0.8, // FR
    0.2, 1.0, 0.8, // HL
    0.2, 1.0, 0.8, // HR
];

/// Joint positions commanded for a zero action
pub const ACTION_NEUTRAL: [f64; NUM_JOINTS] = [
    0.0, -0.8, 1.5, // FL
    0.0, -0.8, 1.5, // FR
    0.0, -1.0, 1.5, // HL
    0.0, -1.0, 1.5, // HR
];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub scales: [f64; NUM_JOINTS],
    pub neutral_offsets: [f64; NUM_JOINTS],
    /// Position gain while the policy is in control
    pub kp: f64,
    /// Velocity gain while the policy is in control
    pub kd: f64,
    /// Force every decoded action to the neutral pose (data still flows)
    pub debug_zero_actions: bool,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            scales: ACTION_SCALE,
            neutral_offsets: ACTION_NEUTRAL,
            kp: 25.0,
            kd: 1.0,
            debug_zero_actions: false,
        }
    }
}

impl ActionConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if self.scales.iter().chain(self.neutral_offsets.iter()).any(|v| !v.is_finite()) {
            return Err(ControlError::InvalidConfig(
                "action scales and neutral offsets must be finite".to_string(),
            ));
        }
        if !(self.kp >= 0.0 && self.kd >= 0.0) {
            return Err(ControlError::InvalidConfig(format!(
                "action gains must be non-negative, got kp={} kd={}",
                self.kp, self.kd
            )));
        }
        Ok(())
    }
}

/// Scaled per-joint deviations from the neutral pose.
///
/// Empty means the inference failed; callers hold the previous command.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    deviations: Vec<f64>,
}

impl Action {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Zero deviation on every joint: the neutral pose
    pub fn zeroed() -> Self {
        Self {
            deviations: vec![0.0; NUM_JOINTS],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deviations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deviations.len()
    }

    pub fn deviations(&self) -> &[f64] {
        &self.deviations
    }
}

pub struct ActionCodec {
    config: ActionConfig,
}

impl ActionCodec {
    pub fn new(config: ActionConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    pub fn debug_zero_actions(&self) -> bool {
        self.config.debug_zero_actions
    }

    pub fn set_debug_zero_actions(&mut self, enable: bool) {
        if enable != self.config.debug_zero_actions {
            log::info!(
                "Zero actions debug mode: {}",
                if enable { "ENABLED" } else { "DISABLED" }
            );
        }
        self.config.debug_zero_actions = enable;
    }

    /// Decode a policy response. Never fails: anything unusable becomes an
    /// empty action and is logged.
    pub fn decode(&self, response: &PolicyResponse) -> Action {
        match self.try_decode(response) {
            Ok(action) => action,
            Err(e) => {
                log::warn!("Inference failed: {}", e);
                Action::empty()
            }
        }
    }

    /// Strict decode: a failed response, a wrong joint count or a
    /// non-finite value is an error.
    pub fn try_decode(&self, response: &PolicyResponse) -> ControlResult<Action> {
        if !response.success {
            return Err(PolicyError::Rejected(response.error_message.clone()).into());
        }
        if response.action.len() != NUM_JOINTS {
            return Err(ControlError::ActionLength {
                expected: NUM_JOINTS,
                actual: response.action.len(),
            });
        }
        if response.action.iter().any(|v| !v.is_finite()) {
            return Err(PolicyError::Malformed("non-finite action value".to_string()).into());
        }

        let deviations = response
            .action
            .iter()
            .zip(self.config.scales.iter())
            .map(|(a, scale)| a * scale)
            .collect();
        Ok(Action { deviations })
    }

    /// Absolute joint targets: neutral offset plus scaled deviation.
    /// `None` for an empty action.
    pub fn targets(&self, action: &Action) -> Option<[f64; NUM_JOINTS]> {
        if action.len() != NUM_JOINTS {
            return None;
        }
        let mut targets = self.config.neutral_offsets;
        for (target, deviation) in targets.iter_mut().zip(action.deviations.iter()) {
            *target += deviation;
        }
        Some(targets)
    }

    pub fn to_command(&self, action: &Action) -> Option<RobotCommand> {
        self.targets(action)
            .map(|targets| RobotCommand::from_positions(&targets, self.config.kp, self.config.kd))
    }

    pub fn neutral_command(&self) -> RobotCommand {
        RobotCommand::from_positions(&self.config.neutral_offsets, self.config.kp, self.config.kd)
    }
}
