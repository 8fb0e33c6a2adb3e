use anyhow::{Context, Result};
use clap::Parser;
use pendulum_config::{AppConfig, MeasurementConfig};
use pendulum_control::SystemClock;
use pendulum_imu::synthetic::PendulumModel;
use pendulum_imu::{recording, synthetic, SensorHub};
use pendulum_link::{ActuatorLink, LogLink, SerialLink};
use pendulum_session::{MemoryStore, SessionController, SessionPhase};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Rate of the synthetic pendulum when no recording is given.
const SYNTHETIC_RATE_HZ: u32 = 100;

#[derive(Parser, Debug)]
#[command(name = "pendulum-rig")]
#[command(about = "Run one pendulum measurement session")]
struct Args {
    /// Sensor recording to replay instead of the synthetic pendulum
    #[arg(short, long)]
    recording: Option<PathBuf>,

    /// Pace the recording by its timestamps
    #[arg(long)]
    realtime: bool,

    /// Experiment the session belongs to
    #[arg(short, long, default_value = "1")]
    experiment: i64,

    /// Angle subtracted from every sample (degrees)
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    offset: f32,

    /// Stop after this many milliseconds of measuring (default: run until Ctrl-C)
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Serial device of the motor controller (overrides the config file)
    #[arg(long)]
    serial: Option<String>,

    /// Write the saved measurement columns to this TOML file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Config file (default: user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pendulum_rig=info,pendulum_session=info,pendulum_imu=info,pendulum_link=info"
                    .into()
            }),
        )
        .init();

    let args = Args::parse();
    info!("Pendulum rig starting");

    let loaded = match &args.config {
        Some(path) => pendulum_config::load_config_from(path),
        None => pendulum_config::load_config(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(port) = &args.serial {
        config.link.serial_port = Some(port.clone());
    }
    info!(
        source = ?config.control.source,
        send_period_ms = config.control.send_period_ms,
        serial_port = ?config.link.serial_port,
        "Config loaded"
    );

    let hub = Arc::new(SensorHub::spawn(config.filter.clone()));
    let sink = hub.sink();
    match args.recording.clone() {
        Some(path) => {
            let realtime = args.realtime;
            tokio::spawn(async move {
                if let Err(e) = recording::replay(&path, sink, realtime).await {
                    error!(?e, "Recording replay failed");
                }
            });
        }
        None => {
            info!("No recording given, using synthetic pendulum");
            tokio::spawn(synthetic::run(PendulumModel::default(), sink, SYNTHETIC_RATE_HZ));
        }
    }

    let link = open_link(&config);
    let store = Arc::new(MemoryStore::new());
    let mut controller = SessionController::new(
        hub.clone(),
        store.clone(),
        link,
        Arc::new(SystemClock),
        &config,
    );

    let measurement = match args.duration_ms {
        Some(ms) => MeasurementConfig::defined(args.offset, Duration::from_millis(ms)),
        None => MeasurementConfig::undefined(args.offset),
    };
    let session_id = controller.start(measurement, args.experiment).await?;

    let mut status = controller.subscribe_status();
    tokio::select! {
        _ = status.wait_for(|s| s.phase == SessionPhase::Stopped) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(?e, "Failed to listen for Ctrl-C");
            }
            info!("Ctrl-C received, stopping session");
        }
    }

    let stopped = controller.stop().await;

    let status = controller.status();
    let measurements = store.measurements_for_session(session_id);
    let samples: usize = measurements.iter().map(|m| m.columns.len()).sum();
    info!(
        session_id,
        zero_offset = ?status.zero_offset,
        samples,
        "Session finished"
    );

    if let Some(path) = &args.export {
        match measurements.first() {
            Some(measurement) => {
                let text = toml::to_string_pretty(&measurement.columns)?;
                std::fs::write(path, text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(?path, samples, "Measurement exported");
            }
            None => warn!(?path, "Nothing was saved, export skipped"),
        }
    }

    stopped
}

/// Serial link when a port is configured, logging link otherwise or when the port fails to open.
fn open_link(config: &AppConfig) -> Arc<dyn ActuatorLink> {
    let Some(port) = &config.link.serial_port else {
        return Arc::new(LogLink);
    };

    match SerialLink::open(port, config.link.baud_rate) {
        Ok(link) => Arc::new(link),
        Err(e) => {
            warn!(?e, port = %port, "Serial port not available, logging commands instead");
            Arc::new(LogLink)
        }
    }
}
