use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use locomotion_rs::state_estimator::{EstimatorConfig, EstimatorMode, StateEstimator};
use locomotion_rs::types::{ImuSample, JointTelemetry};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a telemetry session (.json or .json.gz)
    #[arg(long, conflicts_with = "session_dir")]
    log: Option<PathBuf>,

    /// Directory of sessions to batch replay (processes *.json[.gz])
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Control tick period in seconds
    #[arg(long, default_value = "0.005")]
    dt: f64,

    /// Filter window size
    #[arg(long, default_value = "10")]
    window_size: usize,

    /// Zero-motion magnitude threshold (m/s²)
    #[arg(long, default_value = "0.1")]
    threshold: f64,

    /// Flip accelerometer axes after gravity compensation
    #[arg(long, default_value_t = false)]
    axis_correction: bool,
}

#[derive(Deserialize)]
struct TelemetryRecord {
    tick: u64,
    imu: ImuSample,
    #[serde(default)]
    joints: Option<JointTelemetry>,
}

fn load_session(path: &Path) -> Result<Vec<TelemetryRecord>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn estimator_config(args: &Args, mode: EstimatorMode) -> EstimatorConfig {
    EstimatorConfig {
        mode,
        window_size: args.window_size,
        zero_motion_threshold: args.threshold,
        enable_axis_correction: args.axis_correction,
        ..EstimatorConfig::default()
    }
}

fn replay_mode(records: &[TelemetryRecord], args: &Args, mode: EstimatorMode) -> Result<serde_json::Value> {
    let mut estimator = StateEstimator::new(estimator_config(args, mode))?;
    let mut settled = 0usize;
    let mut peak_accel = 0.0f64;

    for record in records {
        let out = estimator.estimate(&record.imu, args.dt);
        if out.is_zero_motion {
            settled += 1;
        }
        peak_accel = peak_accel.max(out.acceleration.norm());
    }

    let v = estimator.velocity();
    let d = estimator.displacement();
    let a = estimator.last_output().acceleration;
    Ok(json!({
        "mode": mode,
        "final_acceleration": [a.x, a.y, a.z],
        "final_velocity": [v.x, v.y, v.z],
        "final_displacement": [d.x, d.y, d.z],
        "peak_acceleration": peak_accel,
        "settled_fraction": if records.is_empty() { 0.0 } else { settled as f64 / records.len() as f64 },
    }))
}

/// Peak absolute joint speed (rad/s) over the records that carry joints
fn peak_joint_speed(records: &[TelemetryRecord]) -> Option<f64> {
    records
        .iter()
        .filter_map(|r| r.joints.as_ref())
        .flat_map(|joints| joints.iter().map(|j| j.velocity.abs()))
        .fold(None, |peak: Option<f64>, speed| Some(peak.map_or(speed, |p| p.max(speed))))
}

fn run_once(path: &Path, args: &Args) -> Result<serde_json::Value> {
    let records = load_session(path).with_context(|| format!("reading {}", path.display()))?;
    log::info!("Replaying {} ({} ticks)", path.display(), records.len());

    let first_tick = records.first().map(|r| r.tick).unwrap_or(0);
    let last_tick = records.last().map(|r| r.tick).unwrap_or(0);

    Ok(json!({
        "log": path.display().to_string(),
        "ticks": records.len(),
        "tick_range": [first_tick, last_tick],
        "peak_joint_speed": peak_joint_speed(&records),
        "acceleration": replay_mode(&records, args, EstimatorMode::Acceleration)?,
        "velocity": replay_mode(&records, args, EstimatorMode::Velocity)?,
    }))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.session_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.ends_with(".json") || name.ends_with(".json.gz")) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => log::error!("Failed {}: {:#}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --session-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
