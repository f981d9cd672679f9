//! Result delivery
//!
//! Samplers publish through a `ResultSink`: fire-and-forget, in sample
//! completion order. A sampler with no sink simply drops its results.

use std::time::Duration;
use serde::Serialize;
use tokio::sync::mpsc;

use super::model::Classifications;

/// Message shown when a classifier cannot be built
pub const INIT_FAILED_MESSAGE: &str =
    "Image classifier failed to initialize. See error logs for details";

/// Message shown when the GPU delegate is requested but unavailable
pub const GPU_UNSUPPORTED_MESSAGE: &str = "GPU is not supported on this device";

pub trait ResultSink: Send + Sync {
    fn on_results(&self, results: &[Classifications], inference_time: Duration);
    fn on_error(&self, message: &str);
}

/// Event form used by channel-backed sinks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplerEvent {
    Results {
        index: usize,
        results: Vec<Classifications>,
        inference_ms: u64,
    },
    Error {
        index: usize,
        message: String,
    },
}

impl SamplerEvent {
    pub fn index(&self) -> usize {
        match self {
            SamplerEvent::Results { index, .. } | SamplerEvent::Error { index, .. } => *index,
        }
    }
}

// ============================================================================
// CHANNEL SINK
// ============================================================================

/// Forwards events into an unbounded channel tagged with the sampler index
#[derive(Debug, Clone)]
pub struct ChannelSink {
    index: usize,
    tx: mpsc::UnboundedSender<SamplerEvent>,
}

impl ChannelSink {
    pub fn new(index: usize, tx: mpsc::UnboundedSender<SamplerEvent>) -> Self {
        Self { index, tx }
    }

    fn send(&self, event: SamplerEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Event receiver for sampler {} dropped", self.index);
        }
    }
}

impl ResultSink for ChannelSink {
    fn on_results(&self, results: &[Classifications], inference_time: Duration) {
        self.send(SamplerEvent::Results {
            index: self.index,
            results: results.to_vec(),
            inference_ms: u64::try_from(inference_time.as_millis()).unwrap_or(u64::MAX),
        });
    }

    fn on_error(&self, message: &str) {
        self.send(SamplerEvent::Error {
            index: self.index,
            message: message.to_string(),
        });
    }
}
