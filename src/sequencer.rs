use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionCodec};
use crate::error::{ControlError, ControlResult, PolicyError};
use crate::gait::GaitClock;
use crate::observation::ObservationCodec;
use crate::policy::{PolicyClient, PolicyRequest, PolicyResponse, DEFAULT_MODEL_TYPE};
use crate::state_estimator::{EstimateOutput, StateEstimator};
use crate::types::{JointTelemetry, MotionCommand, RobotCommand, RobotTelemetry, JOINTS_PER_LEG, NUM_JOINTS};

/// Control phases in the order a run passes through them
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Wide stance while the motors come up
    PreStand,
    /// Standing pose; the joint baseline is captured on entry
    Stand,
    /// Policy drives the joints at a fixed cadence
    PolicyControl,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::PreStand => "pre_stand",
            Phase::Stand => "stand",
            Phase::PolicyControl => "policy_control",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub tick_period_ms: u64,
    /// First tick of the Stand phase (T1)
    pub stand_tick: u64,
    /// First tick of policy control (T2)
    pub policy_tick: u64,
    /// Ticks between inferences (K)
    pub inference_interval: u64,
    /// Per-leg pose in degrees: hip abduction, hip flexion, knee
    pub prestand_pose_deg: [f64; JOINTS_PER_LEG],
    pub stand_pose_deg: [f64; JOINTS_PER_LEG],
    pub standup_kp: f64,
    pub standup_kd: f64,
    pub model_type: String,
    pub deterministic: bool,
    /// Answers slower than this are discarded as failed inferences
    pub policy_deadline_ms: u64,
    /// Seed for observation noise
    pub noise_seed: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 5,
            stand_tick: 1000,
            policy_tick: 2000,
            inference_interval: 4,
            prestand_pose_deg: [0.0, -70.0, 150.0],
            stand_pose_deg: [0.0, -57.0, 103.0],
            standup_kp: 45.0,
            standup_kd: 0.7,
            model_type: DEFAULT_MODEL_TYPE.to_string(),
            deterministic: true,
            policy_deadline_ms: 15,
            noise_seed: 0,
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if self.tick_period_ms == 0 {
            return Err(ControlError::InvalidConfig("tick period must be positive".to_string()));
        }
        if self.policy_tick < self.stand_tick {
            return Err(ControlError::InvalidConfig(format!(
                "policy tick ({}) precedes stand tick ({})",
                self.policy_tick, self.stand_tick
            )));
        }
        if self.inference_interval == 0 {
            return Err(ControlError::InvalidConfig("inference interval must be at least 1 tick".to_string()));
        }
        if self.policy_deadline_ms == 0 {
            return Err(ControlError::InvalidConfig("policy deadline must be positive".to_string()));
        }
        let period_ms = self.inference_interval.saturating_mul(self.tick_period_ms);
        if self.policy_deadline_ms > period_ms {
            return Err(ControlError::InvalidConfig(format!(
                "policy deadline ({} ms) exceeds inference period ({} ms)",
                self.policy_deadline_ms, period_ms
            )));
        }
        if self
            .prestand_pose_deg
            .iter()
            .chain(self.stand_pose_deg.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ControlError::InvalidConfig("stand-up poses must be finite".to_string()));
        }
        if !(self.standup_kp >= 0.0 && self.standup_kd >= 0.0) {
            return Err(ControlError::InvalidConfig("stand-up gains must be non-negative".to_string()));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Wall-clock time between two inferences
    pub fn inference_period(&self) -> Duration {
        Duration::from_millis(self.inference_interval.saturating_mul(self.tick_period_ms))
    }

    pub fn policy_deadline(&self) -> Duration {
        Duration::from_millis(self.policy_deadline_ms)
    }

    pub fn phase_for_tick(&self, tick: u64) -> Phase {
        if tick < self.stand_tick {
            Phase::PreStand
        } else if tick < self.policy_tick {
            Phase::Stand
        } else {
            Phase::PolicyControl
        }
    }

    pub fn is_inference_tick(&self, tick: u64) -> bool {
        tick >= self.policy_tick && (tick - self.policy_tick) % self.inference_interval == 0
    }

    fn pose_command(&self, pose_deg: [f64; JOINTS_PER_LEG]) -> RobotCommand {
        RobotCommand::from_leg_pose(pose_deg.map(f64::to_radians), self.standup_kp, self.standup_kd)
    }
}

/// Everything one inference produced, for logging and recording
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceRecord {
    pub tick: u64,
    pub phase: Phase,
    /// Unscaled observation as assembled from telemetry
    pub observation: Vec<f64>,
    /// Policy output before scaling; empty on failure
    pub raw_action: Vec<f64>,
    /// Scaled deviations actually commanded; empty on failure
    pub action: Vec<f64>,
    pub success: bool,
}

#[derive(Clone, Debug)]
pub struct TickOutput {
    pub tick: u64,
    pub phase: Phase,
    pub command: RobotCommand,
    pub estimate: EstimateOutput,
    pub inference: Option<InferenceRecord>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SequencerStats {
    pub inferences: u64,
    pub failures: u64,
}

/// Tick-driven stand-up and policy-control state machine.
///
/// Owns one estimator, both codecs, the gait clock and the policy client.
/// Phases only move forward; build a new sequencer to start another run.
pub struct MotionSequencer {
    config: SequencerConfig,
    estimator: StateEstimator,
    observation_codec: ObservationCodec,
    action_codec: ActionCodec,
    gait: GaitClock,
    policy: Box<dyn PolicyClient>,
    rng: ChaCha8Rng,

    tick: u64,
    phase: Phase,
    held_command: RobotCommand,
    last_raw_action: [f64; NUM_JOINTS],
    baseline: Option<JointTelemetry>,
    stats: SequencerStats,
}

impl MotionSequencer {
    pub fn new(
        config: SequencerConfig,
        estimator: StateEstimator,
        observation_codec: ObservationCodec,
        action_codec: ActionCodec,
        gait: GaitClock,
        policy: Box<dyn PolicyClient>,
    ) -> ControlResult<Self> {
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.noise_seed);
        let held_command = config.pose_command(config.prestand_pose_deg);
        Ok(Self {
            config,
            estimator,
            observation_codec,
            action_codec,
            gait,
            policy,
            rng,
            tick: 0,
            phase: Phase::PreStand,
            held_command,
            last_raw_action: [0.0; NUM_JOINTS],
            baseline: None,
            stats: SequencerStats::default(),
        })
    }

    /// Advance one tick: update the estimate, move the phase forward and
    /// produce the joint command for this tick.
    pub fn step(&mut self, telemetry: &RobotTelemetry, command: &MotionCommand, dt_seconds: f64) -> TickOutput {
        let tick = self.tick;
        self.tick += 1;

        let estimate = self.estimator.estimate(&telemetry.imu, dt_seconds);

        let phase = self.config.phase_for_tick(tick).max(self.phase);
        if phase != self.phase {
            log::info!("Phase {} -> {} at tick {}", self.phase.name(), phase.name(), tick);
            self.phase = phase;
        }
        if phase >= Phase::Stand && self.baseline.is_none() {
            self.baseline = Some(telemetry.joints);
            log::debug!("Captured stand baseline at tick {}", tick);
        }

        let mut inference = None;
        match phase {
            Phase::PreStand => {
                self.held_command = self.config.pose_command(self.config.prestand_pose_deg);
            }
            Phase::Stand => {
                self.held_command = self.config.pose_command(self.config.stand_pose_deg);
            }
            Phase::PolicyControl => {
                if self.config.is_inference_tick(tick) {
                    inference = Some(self.infer(tick, telemetry, &estimate, command));
                }
                // Between cadence points the last decoded targets are held
            }
        }

        TickOutput {
            tick,
            phase,
            command: self.held_command,
            estimate,
            inference,
        }
    }

    fn infer(
        &mut self,
        tick: u64,
        telemetry: &RobotTelemetry,
        estimate: &EstimateOutput,
        command: &MotionCommand,
    ) -> InferenceRecord {
        self.stats.inferences += 1;

        let gait_signal = self.gait.next_signal(command.forward_speed);
        let observation = self.observation_codec.encode(
            estimate,
            &telemetry.imu,
            &telemetry.joints,
            &self.last_raw_action,
            command,
            gait_signal,
        );

        let response = match self
            .observation_codec
            .apply_scaling_and_noise(observation.as_slice(), &mut self.rng)
        {
            Ok(processed) => self.call_policy(processed.to_vec()),
            Err(e) => {
                log::warn!("Observation rejected at tick {}: {}", tick, e);
                PolicyResponse::failed(&PolicyError::Malformed(e.to_string()))
            }
        };

        let mut action = self.action_codec.decode(&response);
        let success = !action.is_empty();
        if success {
            for (slot, value) in self.last_raw_action.iter_mut().zip(response.action.iter()) {
                *slot = *value;
            }
        } else {
            self.stats.failures += 1;
        }

        if self.action_codec.debug_zero_actions() {
            action = Action::zeroed();
            log::debug!("Applied zero actions (debug mode active)");
        }

        match self.action_codec.to_command(&action) {
            Some(cmd) => self.held_command = cmd,
            None => log::warn!("Holding previous joint targets at tick {}", tick),
        }

        InferenceRecord {
            tick,
            phase: self.phase,
            observation: observation.to_vec(),
            raw_action: if success { response.action } else { Vec::new() },
            action: action.deviations().to_vec(),
            success,
        }
    }

    fn call_policy(&mut self, observation: Vec<f64>) -> PolicyResponse {
        let request = PolicyRequest {
            observation,
            model_type: self.config.model_type.clone(),
            deterministic: self.config.deterministic,
        };
        let deadline = self.config.policy_deadline();
        let started = Instant::now();
        match self.policy.predict(&request) {
            Ok(_) if started.elapsed() > deadline => PolicyResponse::failed(&PolicyError::DeadlineExceeded(deadline)),
            Ok(response) => response,
            Err(e) => PolicyResponse::failed(&e),
        }
    }

    pub fn set_debug_zero_actions(&mut self, enable: bool) {
        self.action_codec.set_debug_zero_actions(enable);
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Next tick to be processed
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn held_command(&self) -> &RobotCommand {
        &self.held_command
    }

    pub fn last_raw_action(&self) -> &[f64; NUM_JOINTS] {
        &self.last_raw_action
    }

    /// Joint snapshot taken when the Stand phase began
    pub fn baseline(&self) -> Option<&JointTelemetry> {
        self.baseline.as_ref()
    }

    pub fn estimator(&self) -> &StateEstimator {
        &self.estimator
    }

    pub fn stats(&self) -> SequencerStats {
        self.stats
    }
}
