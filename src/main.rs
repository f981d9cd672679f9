//! Frame Sampler - Main Entry Point
//!
//! Replays a directory of images through one or more throttled
//! classification samplers and records throughput / device CSV logs
//! until Ctrl-C.

mod logic;
pub mod constants;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use logic::control::{self, ControlCommand};
use logic::error::SamplerResult;
use logic::events::{ChannelSink, ResultSink, SamplerEvent};
use logic::frames::{spawn_pump, DirectorySource};
use logic::model::OnnxClassifierFactory;
use logic::pool::SamplerPool;
use logic::telemetry::{self, DeviceMonitor};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    log::info!("Starting {} v{}...", constants::APP_NAME, constants::APP_VERSION);

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> SamplerResult<()> {
    let config = constants::session_config_from_env();
    let model_dir = constants::get_model_dir();
    let frame_dir = constants::get_frame_dir();
    let output_dir = constants::get_output_dir();
    let instances = constants::get_instances();

    match serde_json::to_string(&config) {
        Ok(json) => log::info!("Session config: {}", json),
        Err(e) => log::warn!("Session config not serializable: {}", e),
    }
    log::info!("   Models: {:?}", model_dir);
    log::info!("   Frames: {:?}", frame_dir);
    log::info!("   Measurements: {:?}", output_dir);

    // Samplers
    let factory = Arc::new(OnnxClassifierFactory::new(&model_dir));
    let (tx, mut rx) = mpsc::unbounded_channel::<SamplerEvent>();
    let pool = SamplerPool::new(instances, config, factory, |index| {
        Some(Arc::new(ChannelSink::new(index, tx.clone())) as Arc<dyn ResultSink>)
    });
    drop(tx);

    // Frames
    let source = DirectorySource::open(&frame_dir, constants::get_frame_interval())?
        .with_rotation(constants::get_frame_rotation())
        .with_looping(constants::get_frame_loop());
    if source.is_empty() {
        log::warn!("No images found in {:?}", frame_dir);
    }
    let pump = spawn_pump(Arc::new(source), pool.slot());

    // Measurements
    let throughput = telemetry::spawn_throughput_logger(
        pool.samplers().to_vec(),
        &output_dir,
        telemetry::THROUGHPUT_INTERVAL,
    )?;
    let performance = telemetry::spawn_performance_logger(
        &output_dir,
        DeviceMonitor::new(telemetry::SYSFS_ROOT),
        telemetry::PERFORMANCE_INTERVAL,
    )?;

    pool.start_all();
    log::info!("{} sampler(s) running, Ctrl-C to stop", pool.len());
    log::info!("Commands on stdin: threshold +/-, results +/-, threads +/-, period +/-/<ms>, delegate <d>, model <m>, rebuild, start, pause, status");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    log::warn!("Ctrl-C handler failed: {}", e);
                }
                log::info!("Stopping...");
                break;
            }
            event = rx.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            line = commands.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_command(&pool, &line),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("Stopped reading commands: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    pool.pause_all();
    pump.abort();
    throughput.abort();
    performance.abort();

    for status in pool.status() {
        log::info!(
            "Sampler {}: {} samples, {} samples/s ({} on {})",
            status.index,
            status.stats.execution_count,
            status.stats.throughput,
            status.model,
            status.delegate
        );
    }

    Ok(())
}

fn handle_command(pool: &SamplerPool, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let Some(command) = ControlCommand::parse(line) else {
        log::warn!("Unknown command: {:?}", line.trim());
        return;
    };

    if !control::apply(pool, command) && command != ControlCommand::Status {
        log::info!("{:?}: no change", command);
    }
    match serde_json::to_string(&pool.status()) {
        Ok(json) => log::info!("{}", json),
        Err(e) => log::warn!("Status not serializable: {}", e),
    }
}

fn log_event(event: &SamplerEvent) {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            log::warn!("Event for sampler {} not serializable: {}", event.index(), e);
            return;
        }
    };

    match event {
        SamplerEvent::Results { .. } => log::info!("{}", json),
        SamplerEvent::Error { .. } => log::warn!("{}", json),
    }
}
