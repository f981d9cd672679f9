//! Central Configuration Constants
//!
//! Single source of truth for the CLI defaults. Every value can be
//! overridden through the environment; unparsable values fall back.

use std::path::PathBuf;
use std::time::Duration;

use crate::logic::config::{
    Delegate, ModelChoice, SessionConfig, DEFAULT_MAX_RESULTS, DEFAULT_NUM_THREADS,
    DEFAULT_TASK_PERIOD_MS, DEFAULT_THRESHOLD,
};

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "frame-sampler";

/// Default model directory (relative to the working directory)
pub const DEFAULT_MODEL_DIR: &str = "models";

/// Default frame directory
pub const DEFAULT_FRAME_DIR: &str = "frames";

/// Default delay between replayed frames (ms)
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;

/// Default number of samplers sharing the frame stream
pub const DEFAULT_INSTANCES: usize = 1;

// ============================================
// Helper functions to read from env with fallback
// ============================================

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Get model directory from environment or use default
pub fn get_model_dir() -> PathBuf {
    std::env::var("SAMPLER_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_DIR))
}

/// Get frame directory from environment or use default
pub fn get_frame_dir() -> PathBuf {
    std::env::var("SAMPLER_FRAME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_FRAME_DIR))
}

/// Get measurement output directory from environment or use the app data dir
pub fn get_output_dir() -> PathBuf {
    std::env::var("SAMPLER_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
                .join(crate::logic::telemetry::MEASUREMENTS_DIR)
        })
}

/// Get the target task period from environment or use default
pub fn get_task_period() -> Duration {
    Duration::from_millis(env_parsed("SAMPLER_TASK_PERIOD_MS").unwrap_or(DEFAULT_TASK_PERIOD_MS))
}

/// Get delegate from environment ("cpu", "gpu", "npu" or 0/1/2)
pub fn get_delegate() -> Delegate {
    match std::env::var("SAMPLER_DELEGATE") {
        Ok(raw) => Delegate::parse(&raw).unwrap_or_else(|| {
            log::warn!("Unknown delegate {:?}, using CPU", raw);
            Delegate::Cpu
        }),
        Err(_) => Delegate::Cpu,
    }
}

/// Get model from environment (stem, file name or 0..3)
pub fn get_model() -> ModelChoice {
    std::env::var("SAMPLER_MODEL")
        .map(|raw| ModelChoice::parse(&raw))
        .unwrap_or_default()
}

pub fn get_num_threads() -> usize {
    env_parsed("SAMPLER_THREADS").unwrap_or(DEFAULT_NUM_THREADS)
}

pub fn get_max_results() -> usize {
    env_parsed("SAMPLER_MAX_RESULTS").unwrap_or(DEFAULT_MAX_RESULTS)
}

pub fn get_threshold() -> f32 {
    env_parsed("SAMPLER_THRESHOLD").unwrap_or(DEFAULT_THRESHOLD)
}

pub fn get_frame_interval() -> Duration {
    Duration::from_millis(env_parsed("SAMPLER_FRAME_INTERVAL_MS").unwrap_or(DEFAULT_FRAME_INTERVAL_MS))
}

/// Sensor rotation applied to every replayed frame (degrees)
pub fn get_frame_rotation() -> i32 {
    env_parsed("SAMPLER_ROTATION").unwrap_or(0)
}

/// Replay the frame directory forever unless SAMPLER_LOOP=false
pub fn get_frame_loop() -> bool {
    env_parsed("SAMPLER_LOOP").unwrap_or(true)
}

pub fn get_instances() -> usize {
    env_parsed("SAMPLER_INSTANCES").unwrap_or(DEFAULT_INSTANCES).max(1)
}

/// Session configuration assembled from the environment, clamped to the
/// adjuster bounds
pub fn session_config_from_env() -> SessionConfig {
    SessionConfig {
        threshold: get_threshold(),
        num_threads: get_num_threads(),
        max_results: get_max_results(),
        delegate: get_delegate(),
        model: get_model(),
        task_period: get_task_period(),
    }
    .clamped()
}
