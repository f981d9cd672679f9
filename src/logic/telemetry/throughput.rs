//! Throughput log: one row per sampler per tick.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::recorder::{row_time, CsvRecorder};
use crate::logic::error::SamplerResult;
use crate::logic::sampler::ThrottledSampler;

pub const THROUGHPUT_PREFIX: &str = "Throughput_Measurements";
pub const THROUGHPUT_HEADER: [&str; 5] = ["time", "model", "delegate", "throughput", "period"];
pub const THROUGHPUT_INTERVAL: Duration = Duration::from_secs(1);

pub struct ThroughputRecorder {
    csv: CsvRecorder,
}

impl ThroughputRecorder {
    pub fn create(dir: &Path) -> SamplerResult<Self> {
        Ok(Self {
            csv: CsvRecorder::create(dir, THROUGHPUT_PREFIX, &THROUGHPUT_HEADER)?,
        })
    }

    pub fn record(&mut self, sampler: &ThrottledSampler) -> SamplerResult<()> {
        let period_ms = sampler.config().task_period_ms();
        self.csv.append(&[
            row_time(Local::now()),
            sampler.current_model_name(),
            sampler.current_delegate_name().to_string(),
            sampler.throughput().to_string(),
            period_ms.to_string(),
        ])
    }

    pub fn path(&self) -> &Path {
        self.csv.path()
    }
}

/// Append a row for every sampler each `every` until aborted
pub fn spawn_throughput_logger(
    samplers: Vec<Arc<ThrottledSampler>>,
    dir: &Path,
    every: Duration,
) -> SamplerResult<JoinHandle<()>> {
    let mut recorder = ThroughputRecorder::create(dir)?;
    log::info!("Throughput log every {:?} to {:?}", every, recorder.path());

    Ok(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for sampler in &samplers {
                if let Err(e) = recorder.record(sampler) {
                    log::error!("Failed to write throughput row: {}", e);
                }
            }
        }
    }))
}
