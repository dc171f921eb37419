//! gripper-train: on-hardware training loop entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  TtyTransport      LogEventSink   FileStore     MonotonicClock │
//! │  (servo bus, MCU)  (EventSink)    (StoragePort) (Clock)        │
//! │  JsonConfigFile    RandomAgent    DiscardMemory StdDelay       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            TrainingOrchestrator (pure logic)           │    │
//! │  │  Schedule · LoopPacer · RecoveryCascade · FaultLog     │    │
//! │  └───────────────────────────┬────────────────────────────┘    │
//! │                              ▼                                 │
//! │        Environment ── GripperController + PoseSource           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The binary ships bring-up collaborators only: a uniform-random agent and
//! a discarding memory.  Real agents plug in through the library API.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use tracing_subscriber::EnvFilter;

use gripper_rl::adapters::bringup::{DiscardMemory, RandomAgent};
use gripper_rl::adapters::config_file::JsonConfigFile;
use gripper_rl::adapters::log_sink::LogEventSink;
use gripper_rl::adapters::serial::TtyTransport;
use gripper_rl::adapters::storage::FileStore;
use gripper_rl::adapters::time::{MonotonicClock, StdDelay};
use gripper_rl::app::ports::{ConfigPort, Transport};
use gripper_rl::app::trainer::{Collaborators, TrainingOrchestrator};
use gripper_rl::config::{ObjectConfig, SystemConfig};
use gripper_rl::drivers::gripper::GripperController;
use gripper_rl::drivers::servo::bus::PacketBus;
use gripper_rl::drivers::servo::registers::RegisterTable;
use gripper_rl::drivers::servo::unit::ServoUnit;
use gripper_rl::env::Environment;
use gripper_rl::pacing::LoopPacer;
use gripper_rl::sensors::encoder::ServoEncoderPose;
use gripper_rl::sensors::magnetic::MagneticSensorPose;
use gripper_rl::sensors::{PoseSource, PoseSourceKind};

#[derive(Parser, Debug)]
#[command(name = "gripper-train")]
#[command(about = "Train a gripper control policy on real hardware", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file.  Missing file means defaults.
    #[arg(short, long, env = "GRIPPER_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Seed for goals, exploration and resets.  Overrides the config.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Parent directory for run artefacts (fault log, models, config).
    #[arg(short, long, default_value = "runs")]
    output_dir: PathBuf,

    /// Validate the configuration, print it as JSON, and exit.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = JsonConfigFile::new(&cli.config)
        .load()
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate().context("invalid configuration")?;

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let seed = cli
        .seed
        .or(config.training.seed)
        .unwrap_or_else(rand::random);
    let run_dir = cli.output_dir.join(format!("seed-{seed}"));
    fs::create_dir_all(&run_dir).with_context(|| format!("creating {}", run_dir.display()))?;
    JsonConfigFile::new(run_dir.join("config.json"))
        .save(&config)
        .context("saving effective config")?;
    info!("Run directory {} (seed {seed})", run_dir.display());

    let gripper_line = open_line(
        &config.gripper.device_name,
        config.gripper.baudrate,
        config.gripper.read_timeout_ms,
    )?;
    let gripper = GripperController::new(PacketBus::new(gripper_line), &config.gripper)
        .context("gripper configuration has no usable joints")?;
    let pose = build_pose_source(&config, seed)?;

    let mut env = Environment::new(gripper, pose, &config, seed);
    env.setup().context("gripper setup")?;

    let pacer = LoopPacer::new(
        Box::new(MonotonicClock::new()),
        Box::new(StdDelay),
        Duration::from_millis(config.environment.step_time_period_ms),
    );
    let mut agent = RandomAgent::new(env.num_motors(), seed);
    let mut memory = DiscardMemory::new();
    let mut sink = LogEventSink::new();
    let mut storage = FileStore::new(&run_dir);

    TrainingOrchestrator::new(
        env,
        Collaborators {
            agent: &mut agent,
            memory: &mut memory,
            sink: &mut sink,
            storage: &mut storage,
        },
        pacer,
        &config,
        &run_dir,
        seed,
    )
    .train()
    .context("training aborted")?;
    info!("Training finished; {} transitions offered to memory", memory.seen());
    Ok(())
}

fn build_pose_source(config: &SystemConfig, seed: u64) -> Result<PoseSource> {
    let object: &ObjectConfig = &config.object;
    match object.source {
        PoseSourceKind::Encoder => {
            let table = RegisterTable::for_model(&object.model)
                .with_context(|| format!("no register table for {}", object.model))?;
            let line = open_line(&object.device_name, object.baudrate, object.read_timeout_ms)?;
            let servo = ServoUnit::new(object.servo_id, object.min_step, object.max_step, table);
            Ok(PoseSource::Encoder(ServoEncoderPose::new(
                Box::new(PacketBus::new(line)),
                servo,
                seed,
                config.gripper.motion_poll_budget,
            )))
        }
        PoseSourceKind::Magnetic => {
            let line = open_line(&object.device_name, object.baudrate, object.read_timeout_ms)?;
            let sensor =
                MagneticSensorPose::open(Box::new(line), object.calibration_yaw, object.detection_attempts)
                    .context("magnetic sensor calibration")?;
            Ok(PoseSource::Magnetic(sensor))
        }
        PoseSourceKind::Fiducial => {
            bail!("the fiducial pose source needs a camera provider; construct it through the library")
        }
    }
}

fn open_line(device: &str, baudrate: u32, timeout_ms: u64) -> Result<impl Transport + 'static> {
    TtyTransport::open(device, baudrate, Duration::from_millis(timeout_ms))
        .with_context(|| format!("opening {device}"))
}
