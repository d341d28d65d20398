use serde::{Deserialize, Serialize};

/// Gait phase clock feeding the observation's foot-contact signal.
///
/// The signal is a smoothed square wave over a phase in [0, 1). While the
/// forward command is exactly zero the clock still advances but reports the
/// fixed still value, matching how the policy was trained to stand.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GaitConfig {
    /// Phase increment per evaluation
    pub phase_step: f64,
    /// Signal reported while the forward command is zero
    pub still_value: f64,
    pub phase_freq: f64,
    /// Edge softness; smaller is closer to a hard square wave
    pub eps: f64,
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            phase_step: 0.005,
            still_value: 0.5,
            phase_freq: 0.8,
            eps: 0.2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GaitClock {
    config: GaitConfig,
    phase: f64,
}

impl GaitClock {
    pub fn new(config: GaitConfig) -> Self {
        Self { config, phase: 0.0 }
    }

    /// Smooth square wave in (0, 1): sin(p) / (2·sqrt(sin²p + eps²)) + 0.5
    pub fn smooth_square_wave(phase: f64, phase_freq: f64, eps: f64) -> f64 {
        let p = 2.0 * std::f64::consts::PI * phase * phase_freq;
        let s = p.sin();
        s / (2.0 * (s * s + eps * eps).sqrt()) + 0.5
    }

    /// Advance the phase and return the gait signal for this evaluation
    pub fn next_signal(&mut self, forward_speed: f64) -> f64 {
        self.phase = (self.phase + self.config.phase_step).rem_euclid(1.0);

        if forward_speed == 0.0 {
            self.config.still_value
        } else {
            Self::smooth_square_wave(self.phase, self.config.phase_freq, self.config.eps)
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

impl Default for GaitClock {
    fn default() -> Self {
        Self::new(GaitConfig::default())
    }
}
