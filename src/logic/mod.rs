//! Logic Module - Sampling engine & collaborators
//!
//! ## Layout
//! - `sampler/` - throttled sampling loop (start / pause / process_frame)
//! - `config`, `stats` - session configuration and running statistics
//! - `frames` - frame sources (latest-frame slot, image directory)
//! - `model/` - classifier seam + ONNX Runtime backend
//! - `events` - result sinks
//! - `pool` - several indexed samplers over one frame slot
//! - `control` - runtime commands (step settings, switch model, start / pause)
//! - `telemetry/` - CSV throughput and device performance logs

pub mod error;
pub mod config;
pub mod stats;
pub mod frames;
pub mod model;
pub mod events;
pub mod sampler;
pub mod pool;
pub mod control;
pub mod telemetry;
