use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;

use locomotion_rs::control_loop::{ControlLoop, LoopSummary};
use locomotion_rs::policy::{HoldStillPolicy, HttpPolicyClient, PolicyClient};
use locomotion_rs::recorder::SessionRecorder;
use locomotion_rs::telemetry::SimulatedStance;
use locomotion_rs::types::{MotionCommand, RobotCommand};
use locomotion_rs::{ControlConfig, EstimatorMode};

#[derive(Parser, Debug)]
#[command(name = "locomotion")]
#[command(about = "Quadruped stand-up and policy control loop", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file; defaults are used for anything missing
    #[arg(long)]
    config: Option<PathBuf>,

    /// Policy server base URL (e.g. http://127.0.0.1:8000). Without it the
    /// robot holds the neutral stance.
    #[arg(long)]
    policy_endpoint: Option<String>,

    /// Estimator output mode (acceleration, velocity)
    #[arg(long)]
    mode: Option<String>,

    /// Force every policy action to the neutral pose
    #[arg(long)]
    zero_actions: bool,

    /// Seed for observation and simulated sensor noise
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Forward speed command (m/s)
    #[arg(long, default_value = "0.0")]
    forward_speed: f64,

    /// Lateral speed command (m/s)
    #[arg(long, default_value = "0.0")]
    lateral_speed: f64,

    /// Turn rate command (rad/s)
    #[arg(long, default_value = "0.0")]
    turn_rate: f64,

    /// Output directory for session recordings
    #[arg(long, default_value = "locomotion_sessions")]
    output_dir: PathBuf,

    /// Do not record inferences
    #[arg(long)]
    no_record: bool,

    /// Gzip the session recording
    #[arg(long)]
    compress: bool,
}

fn parse_mode(mode: &str) -> Result<EstimatorMode> {
    match mode {
        "acceleration" | "accel" => Ok(EstimatorMode::Acceleration),
        "velocity" | "vel" => Ok(EstimatorMode::Velocity),
        other => anyhow::bail!("Unknown estimator mode '{}' (expected acceleration or velocity)", other),
    }
}

fn build_policy(endpoint: Option<String>, config: &ControlConfig) -> Result<Box<dyn PolicyClient>> {
    match endpoint {
        Some(url) => {
            let mut client = HttpPolicyClient::new(&url, config.sequencer.policy_deadline())
                .context("building policy client")?;
            // An unreachable server is not fatal: every inference fails and
            // the stand pose is held
            if client.connect().is_err() {
                log::warn!("Policy server unreachable; joint targets will be held");
            }
            Ok(Box::new(client))
        }
        None => {
            log::info!("No policy endpoint given, using hold-still policy");
            Ok(Box::new(HoldStillPolicy))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => ControlConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => ControlConfig::default(),
    };
    if let Some(mode) = args.mode.as_deref() {
        config.estimator.mode = parse_mode(mode)?;
    }
    if args.zero_actions {
        config.action.debug_zero_actions = true;
    }
    config.sequencer.noise_seed = args.seed;
    config.validate()?;

    let tick_period = config.sequencer.tick_period();
    let max_ticks = (args.duration > 0).then(|| args.duration * 1000 / config.sequencer.tick_period_ms);

    log::info!("Locomotion controller starting");
    log::info!("  Duration: {} seconds (0=continuous)", args.duration);
    log::info!("  Tick period: {:?}", tick_period);
    log::info!("  Estimator mode: {:?}", config.estimator.mode);
    log::info!(
        "  Phases: stand at tick {}, policy at tick {}, inference every {} ticks",
        config.sequencer.stand_tick,
        config.sequencer.policy_tick,
        config.sequencer.inference_interval
    );
    log::info!("  Zero actions: {}", config.action.debug_zero_actions);

    let recorder = if args.no_record {
        None
    } else {
        Some(SessionRecorder::create(&args.output_dir, args.compress).context("creating session recording")?)
    };

    let command = MotionCommand {
        forward_speed: args.forward_speed,
        lateral_speed: args.lateral_speed,
        turn_rate: args.turn_rate,
    };

    // Single-slot channel: if the control thread is still busy when the
    // timer fires, that tick is dropped
    let (tick_tx, tick_rx) = mpsc::channel::<()>(1);
    let endpoint = args.policy_endpoint.clone();
    let seed = args.seed;

    let control = tokio::task::spawn_blocking(move || -> Result<LoopSummary> {
        // The blocking HTTP client must be built off the async runtime
        let policy = build_policy(endpoint, &config)?;
        let dt = config.sequencer.tick_period().as_secs_f64();
        let start_pose = RobotCommand::from_leg_pose(
            config.sequencer.prestand_pose_deg.map(f64::to_radians),
            config.sequencer.standup_kp,
            config.sequencer.standup_kd,
        );
        let mut robot = SimulatedStance::new(start_pose.positions(), dt, seed);

        let mut control = ControlLoop::new(config.build_sequencer(policy)?, recorder);
        control.set_command(command);
        control.run_until_closed(&mut robot, tick_rx, max_ticks);
        Ok(control.finish())
    });

    let mut interval = tokio::time::interval(tick_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut dropped_ticks = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match tick_tx.try_send(()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped_ticks += 1,
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            _ = &mut ctrl_c => {
                log::info!("Ctrl-C received, stopping");
                break;
            }
        }
    }
    drop(tick_tx);

    let summary = control.await.context("control loop task panicked")??;
    if dropped_ticks > 0 {
        log::warn!("{} ticks dropped while the control loop was busy", dropped_ticks);
    }

    println!("\n=== Final Stats ===");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
