use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc::Receiver;

use crate::recorder::SessionRecorder;
use crate::sequencer::{MotionSequencer, Phase, TickOutput};
use crate::telemetry::{CommandSink, TelemetrySource};
use crate::types::MotionCommand;

#[derive(Clone, Debug, Serialize)]
pub struct LoopSummary {
    pub ticks: u64,
    pub phase: Phase,
    pub inferences: u64,
    pub failures: u64,
    pub velocity: [f64; 3],
    pub displacement: [f64; 3],
    pub recorded: u64,
}

/// Synchronous tick loop: telemetry in, sequencer step, command out.
///
/// Runs on a blocking thread; ticks arrive from an async timer over a
/// channel, so a slow policy call delays this thread only. Phase boundaries
/// count processed ticks; the estimator integrates over measured time when
/// driven by the channel, nominal tick period otherwise.
pub struct ControlLoop {
    sequencer: MotionSequencer,
    recorder: Option<SessionRecorder>,
    command: MotionCommand,
    dt_seconds: f64,
}

impl ControlLoop {
    pub fn new(sequencer: MotionSequencer, recorder: Option<SessionRecorder>) -> Self {
        let dt_seconds = sequencer.config().tick_period().as_secs_f64();
        Self {
            sequencer,
            recorder,
            command: MotionCommand::default(),
            dt_seconds,
        }
    }

    pub fn set_command(&mut self, command: MotionCommand) {
        self.command = command;
    }

    pub fn sequencer(&self) -> &MotionSequencer {
        &self.sequencer
    }

    /// One control tick at the nominal tick period
    pub fn tick<R: TelemetrySource + CommandSink>(&mut self, robot: &mut R) -> TickOutput {
        let dt = self.dt_seconds;
        self.tick_with_dt(robot, dt)
    }

    pub fn tick_with_dt<R: TelemetrySource + CommandSink>(&mut self, robot: &mut R, dt_seconds: f64) -> TickOutput {
        let telemetry = robot.read(self.sequencer.tick());
        let out = self.sequencer.step(&telemetry, &self.command, dt_seconds);
        robot.send(&out.command);

        if let (Some(recorder), Some(record)) = (self.recorder.as_mut(), out.inference.as_ref()) {
            recorder.record(record);
        }
        if out.tick % 1000 == 0 {
            log::debug!(
                "tick {} phase {} v=({:.3}, {:.3}, {:.3})",
                out.tick,
                out.phase.name(),
                out.estimate.velocity.x,
                out.estimate.velocity.y,
                out.estimate.velocity.z
            );
        }
        out
    }

    /// Run a fixed number of ticks back to back
    pub fn run_ticks<R: TelemetrySource + CommandSink>(&mut self, robot: &mut R, ticks: u64) {
        for _ in 0..ticks {
            self.tick(robot);
        }
    }

    /// Tick once per message until the sender closes or `max_ticks` is reached
    pub fn run_until_closed<R: TelemetrySource + CommandSink>(
        &mut self,
        robot: &mut R,
        mut tick_rx: Receiver<()>,
        max_ticks: Option<u64>,
    ) {
        let mut last_tick: Option<Instant> = None;
        while tick_rx.blocking_recv().is_some() {
            // Time since the previous processed tick, so dropped timer ticks
            // are still integrated
            let now = Instant::now();
            let dt = last_tick.map_or(self.dt_seconds, |prev| now.duration_since(prev).as_secs_f64());
            last_tick = Some(now);
            self.tick_with_dt(robot, dt);
            if max_ticks.map_or(false, |max| self.sequencer.tick() >= max) {
                log::info!("Tick limit reached, stopping control loop");
                break;
            }
        }
    }

    /// Close the recording and summarize the run
    pub fn finish(self) -> LoopSummary {
        let recorded = match self.recorder {
            Some(recorder) => {
                let records = recorder.records();
                if let Err(e) = recorder.finish() {
                    log::warn!("Failed to close session recording: {}", e);
                }
                records
            }
            None => 0,
        };
        let stats = self.sequencer.stats();
        let estimator = self.sequencer.estimator();
        let (v, d) = (estimator.velocity(), estimator.displacement());
        LoopSummary {
            ticks: self.sequencer.tick(),
            phase: self.sequencer.phase(),
            inferences: stats.inferences,
            failures: stats.failures,
            velocity: [v.x, v.y, v.z],
            displacement: [d.x, d.y, d.z],
            recorded,
        }
    }
}
