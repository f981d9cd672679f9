//! Telemetry Module
//!
//! Periodic CSV measurement logs written next to a sampling run.
//!
//! ## Structure
//! - `recorder.rs` - CSV series writer (header, flushed rows, timestamped names)
//! - `throughput.rs` - `time,model,delegate,throughput,period` every second
//! - `performance.rs` - thermal / clock / utilisation every two seconds
//!
//! ## Usage
//! ```ignore
//! use crate::logic::telemetry;
//!
//! let throughput = telemetry::spawn_throughput_logger(samplers, &dir, telemetry::THROUGHPUT_INTERVAL)?;
//! let monitor = telemetry::DeviceMonitor::new(telemetry::SYSFS_ROOT);
//! let performance = telemetry::spawn_performance_logger(&dir, monitor, telemetry::PERFORMANCE_INTERVAL)?;
//!
//! // On shutdown
//! throughput.abort();
//! performance.abort();
//! ```

pub mod performance;
pub mod recorder;
pub mod throughput;

pub use performance::{
    spawn_performance_logger,
    DeviceMonitor,
    PerformanceRecorder,
    PerformanceSample,
    ThermalStatus,
    PERFORMANCE_INTERVAL,
    SYSFS_ROOT,
};

pub use recorder::{CsvRecorder, MEASUREMENTS_DIR};

pub use throughput::{spawn_throughput_logger, ThroughputRecorder, THROUGHPUT_INTERVAL};
