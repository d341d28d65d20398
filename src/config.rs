use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::{ActionCodec, ActionConfig};
use crate::error::ControlResult;
use crate::gait::{GaitClock, GaitConfig};
use crate::observation::{ObservationCodec, ObservationConfig};
use crate::policy::PolicyClient;
use crate::sequencer::{MotionSequencer, SequencerConfig};
use crate::state_estimator::{EstimatorConfig, StateEstimator};

/// Full controller configuration, one JSON document.
///
/// Missing sections and fields fall back to the deployed defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub estimator: EstimatorConfig,
    pub observation: ObservationConfig,
    pub action: ActionConfig,
    pub sequencer: SequencerConfig,
    pub gait: GaitConfig,
}

impl ControlConfig {
    pub fn load(path: &Path) -> ControlResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> ControlResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ControlResult<()> {
        self.estimator.validate()?;
        self.observation.validate()?;
        self.action.validate()?;
        self.sequencer.validate()?;
        Ok(())
    }

    /// Construct every component and wire them into a sequencer
    pub fn build_sequencer(&self, policy: Box<dyn PolicyClient>) -> ControlResult<MotionSequencer> {
        MotionSequencer::new(
            self.sequencer.clone(),
            StateEstimator::new(self.estimator.clone())?,
            ObservationCodec::new(self.observation.clone())?,
            ActionCodec::new(self.action.clone())?,
            GaitClock::new(self.gait.clone()),
            policy,
        )
    }
}
