//! Device Performance Log
//!
//! Samples temperatures, clocks and utilisation from sysfs plus the
//! process CPU share from sysinfo.
//!
//! ## Sources (relative to the sysfs root)
//! - `class/thermal/thermal_zone*/{type,temp}` - millidegrees, averaged per
//!   zone kind (cpu / gpu / npu)
//! - `devices/system/cpu/cpuN/cpufreq/scaling_cur_freq` - kHz, averaged
//! - `class/kgsl/kgsl-3d0/{clock_mhz,gpu_busy_percentage}` (Adreno), else
//!   `class/misc/mali0/device/{cur_freq,utilization}` (Mali)
//!
//! Missing files read as 0. A zone kind with no zones averages to NaN.

use std::path::{Path, PathBuf};
use std::time::Duration;
use chrono::Local;
use serde::Serialize;
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::recorder::{row_time, CsvRecorder};
use crate::logic::error::SamplerResult;

pub const PERFORMANCE_PREFIX: &str = "Performance_Measurements";
pub const PERFORMANCE_HEADER: [&str; 9] = [
    "time",
    "thermalStatus",
    "cpuTemperature",
    "gpuTemperature",
    "npuTemperature",
    "cpuFrequency",
    "gpuFrequency",
    "cpuUtilization",
    "gpuUtilization",
];
pub const PERFORMANCE_INTERVAL: Duration = Duration::from_secs(2);

/// Default sysfs mount
pub const SYSFS_ROOT: &str = "/sys";

const KGSL_DIR: &str = "class/kgsl/kgsl-3d0";
const MALI_DIR: &str = "class/misc/mali0/device";

// ============================================================================
// THERMAL STATUS
// ============================================================================

/// Device thermal severity, 0..=5 in rising order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThermalStatus {
    None,
    Light,
    Moderate,
    Severe,
    Critical,
    Emergency,
    Unknown,
}

impl ThermalStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ThermalStatus::None => "None",
            ThermalStatus::Light => "Light",
            ThermalStatus::Moderate => "Moderate",
            ThermalStatus::Severe => "Severe",
            ThermalStatus::Critical => "Critical",
            ThermalStatus::Emergency => "Emergency",
            ThermalStatus::Unknown => "Unknown",
        }
    }

    /// Severity implied by a crossed trip point type
    fn from_trip_type(kind: &str) -> Self {
        match kind {
            "active" => ThermalStatus::Light,
            "passive" => ThermalStatus::Severe,
            "hot" => ThermalStatus::Critical,
            "critical" => ThermalStatus::Emergency,
            _ => ThermalStatus::Moderate,
        }
    }
}

impl std::fmt::Display for ThermalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SAMPLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSample {
    pub thermal_status: ThermalStatus,
    /// Degrees Celsius
    pub cpu_temperature: f32,
    pub gpu_temperature: f32,
    pub npu_temperature: f32,
    /// GHz
    pub cpu_frequency: f32,
    pub gpu_frequency: f32,
    /// Percent
    pub cpu_utilization: f32,
    pub gpu_utilization: f32,
}

impl PerformanceSample {
    fn to_fields(&self, time: String) -> Vec<String> {
        vec![
            time,
            self.thermal_status.to_string(),
            self.cpu_temperature.to_string(),
            self.gpu_temperature.to_string(),
            self.npu_temperature.to_string(),
            self.cpu_frequency.to_string(),
            self.gpu_frequency.to_string(),
            self.cpu_utilization.to_string(),
            self.gpu_utilization.to_string(),
        ]
    }
}

// ============================================================================
// MONITOR
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct Average {
    sum: f32,
    count: u32,
}

impl Average {
    fn add(&mut self, value: f32) {
        self.sum += value;
        self.count += 1;
    }

    /// 0/0 stays NaN when nothing was added
    fn value(&self) -> f32 {
        self.sum / self.count as f32
    }
}

pub struct DeviceMonitor {
    root: PathBuf,
    system: System,
    pid: Option<Pid>,
}

impl DeviceMonitor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| log::warn!("Process CPU usage unavailable: {}", e))
            .ok();
        Self {
            root: root.into(),
            system: System::new(),
            pid,
        }
    }

    pub fn sample(&mut self) -> PerformanceSample {
        let (thermal_status, [cpu, gpu, npu]) = self.read_thermal();
        let (gpu_frequency, gpu_utilization) = self.read_gpu();

        PerformanceSample {
            thermal_status,
            cpu_temperature: cpu,
            gpu_temperature: gpu,
            npu_temperature: npu,
            cpu_frequency: self.read_cpu_frequency(),
            gpu_frequency,
            cpu_utilization: self.read_process_cpu(),
            gpu_utilization,
        }
    }

    /// Per-kind average temperatures and the worst crossed trip point
    fn read_thermal(&self) -> (ThermalStatus, [f32; 3]) {
        let mut averages = [Average::default(); 3];
        let mut status: Option<ThermalStatus> = None;

        for zone in list_prefixed(&self.root.join("class/thermal"), "thermal_zone") {
            let kind = read_trimmed(&zone.join("type")).unwrap_or_default().to_lowercase();
            let millidegrees = read_number(&zone.join("temp")).unwrap_or(0.0);
            let celsius = (millidegrees / 1000.0).max(0.0);

            let slot = if kind.contains("cpu") {
                Some(0)
            } else if kind.contains("gpu") {
                Some(1)
            } else if kind.contains("npu") {
                Some(2)
            } else {
                None
            };

            if let Some(i) = slot {
                averages[i].add(celsius);
            }

            if let Some(zone_status) = crossed_trip(&zone, millidegrees) {
                status = Some(match status {
                    Some(current) if severity(current) >= severity(zone_status) => current,
                    _ => zone_status,
                });
            }
        }

        (
            status.unwrap_or(ThermalStatus::Unknown),
            [averages[0].value(), averages[1].value(), averages[2].value()],
        )
    }

    fn read_cpu_frequency(&self) -> f32 {
        let mut average = Average::default();
        for cpu in list_prefixed(&self.root.join("devices/system/cpu"), "cpu") {
            let numbered = cpu
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.len() > 3 && n[3..].chars().all(|c| c.is_ascii_digit()));
            if !numbered {
                continue;
            }
            let khz = read_number(&cpu.join("cpufreq/scaling_cur_freq")).unwrap_or(0.0);
            average.add(khz / 1_000_000.0);
        }
        average.value()
    }

    /// (GHz, busy percent)
    fn read_gpu(&self) -> (f32, f32) {
        let kgsl = self.root.join(KGSL_DIR);
        if kgsl.is_dir() {
            let mhz = read_number(&kgsl.join("clock_mhz")).unwrap_or(0.0);
            let busy = read_percent(&kgsl.join("gpu_busy_percentage")).unwrap_or(0.0);
            return (mhz / 1000.0, busy);
        }

        let mali = self.root.join(MALI_DIR);
        if mali.is_dir() {
            let hz = read_number(&mali.join("cur_freq")).unwrap_or(0.0);
            let busy = read_percent(&mali.join("utilization")).unwrap_or(0.0);
            return (hz / 1_000_000_000.0, busy);
        }

        (0.0, 0.0)
    }

    fn read_process_cpu(&mut self) -> f32 {
        let Some(pid) = self.pid else {
            return 0.0;
        };
        self.system.refresh_process(pid);
        self.system.process(pid).map_or(0.0, |p| p.cpu_usage())
    }
}

fn severity(status: ThermalStatus) -> i32 {
    match status {
        ThermalStatus::Unknown => -1,
        other => other as i32,
    }
}

/// Highest trip point of `zone` at or below `millidegrees`
fn crossed_trip(zone: &Path, millidegrees: f32) -> Option<ThermalStatus> {
    let mut worst: Option<ThermalStatus> = None;
    let mut any_trip = false;

    for index in 0.. {
        let temp_path = zone.join(format!("trip_point_{}_temp", index));
        let Some(trip_temp) = read_number(&temp_path) else {
            break;
        };
        any_trip = true;
        if millidegrees < trip_temp {
            continue;
        }
        let kind = read_trimmed(&zone.join(format!("trip_point_{}_type", index))).unwrap_or_default();
        let status = ThermalStatus::from_trip_type(&kind);
        if worst.map_or(true, |w| severity(status) > severity(w)) {
            worst = Some(status);
        }
    }

    match worst {
        Some(status) => Some(status),
        None if any_trip => Some(ThermalStatus::None),
        None => None,
    }
}

fn list_prefixed(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(read) => read
            .filter_map(|res| res.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
            .map(|e| e.path())
            .collect(),
        Err(_) => Vec::new(),
    };
    entries.sort();
    entries
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_number(path: &Path) -> Option<f32> {
    read_trimmed(path)?.parse().ok()
}

/// Accepts both `37` and `37 %`
fn read_percent(path: &Path) -> Option<f32> {
    let raw = read_trimmed(path)?;
    raw.split('%').next()?.trim().parse().ok()
}

// ============================================================================
// RECORDER
// ============================================================================

pub struct PerformanceRecorder {
    csv: CsvRecorder,
    monitor: DeviceMonitor,
}

impl PerformanceRecorder {
    pub fn create(dir: &Path, monitor: DeviceMonitor) -> SamplerResult<Self> {
        Ok(Self {
            csv: CsvRecorder::create(dir, PERFORMANCE_PREFIX, &PERFORMANCE_HEADER)?,
            monitor,
        })
    }

    pub fn record(&mut self) -> SamplerResult<PerformanceSample> {
        let sample = self.monitor.sample();
        self.csv.append(&sample.to_fields(row_time(Local::now())))?;
        Ok(sample)
    }

    pub fn path(&self) -> &Path {
        self.csv.path()
    }
}

/// Append a device sample each `every` until aborted
pub fn spawn_performance_logger(
    dir: &Path,
    monitor: DeviceMonitor,
    every: Duration,
) -> SamplerResult<JoinHandle<()>> {
    let mut recorder = PerformanceRecorder::create(dir, monitor)?;
    log::info!("Performance log every {:?} to {:?}", every, recorder.path());

    Ok(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match recorder.record() {
                Ok(sample) => log::debug!("Performance sample: {:?}", sample),
                Err(e) => log::error!("Failed to write performance row: {}", e),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Two CPU zones, one GPU zone, two cores, an Adreno GPU
    fn fake_sysfs() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "class/thermal/thermal_zone0/type", "cpu-0-0-usr\n");
        write(root, "class/thermal/thermal_zone0/temp", "40000\n");
        write(root, "class/thermal/thermal_zone1/type", "cpu-1-0-usr\n");
        write(root, "class/thermal/thermal_zone1/temp", "50000\n");
        write(root, "class/thermal/thermal_zone1/trip_point_0_temp", "45000\n");
        write(root, "class/thermal/thermal_zone1/trip_point_0_type", "passive\n");
        write(root, "class/thermal/thermal_zone1/trip_point_1_temp", "95000\n");
        write(root, "class/thermal/thermal_zone1/trip_point_1_type", "critical\n");
        write(root, "class/thermal/thermal_zone2/type", "gpuss-0\n");
        write(root, "class/thermal/thermal_zone2/temp", "-3000\n");
        write(root, "class/thermal/thermal_zone3/type", "battery\n");
        write(root, "class/thermal/thermal_zone3/temp", "30000\n");
        write(root, "devices/system/cpu/cpu0/cpufreq/scaling_cur_freq", "1000000\n");
        write(root, "devices/system/cpu/cpu1/cpufreq/scaling_cur_freq", "2000000\n");
        write(root, "devices/system/cpu/cpufreq/policy0/scaling_cur_freq", "9999999\n");
        write(root, "class/kgsl/kgsl-3d0/clock_mhz", "585\n");
        write(root, "class/kgsl/kgsl-3d0/gpu_busy_percentage", "37 %\n");
        dir
    }

    #[test]
    fn test_thermal_status_names() {
        assert_eq!(ThermalStatus::from_trip_type("active").to_string(), "Light");
        assert_eq!(ThermalStatus::from_trip_type("passive").to_string(), "Severe");
        assert_eq!(ThermalStatus::from_trip_type("critical").to_string(), "Emergency");
        assert_eq!(ThermalStatus::from_trip_type("user_space").to_string(), "Moderate");
        assert_eq!(severity(ThermalStatus::Unknown), -1);
        assert_eq!(severity(ThermalStatus::Emergency), 5);
    }

    #[test]
    fn test_monitor_reads_fake_tree() {
        let sysfs = fake_sysfs();
        let mut monitor = DeviceMonitor::new(sysfs.path());
        let sample = monitor.sample();

        assert_eq!(sample.cpu_temperature, 45.0);
        // Negative readings clamp to zero
        assert_eq!(sample.gpu_temperature, 0.0);
        assert!(sample.npu_temperature.is_nan());
        assert!((sample.cpu_frequency - 1.5).abs() < 1e-6);
        assert!((sample.gpu_frequency - 0.585).abs() < 1e-6);
        assert_eq!(sample.gpu_utilization, 37.0);
        // 50 C crossed the passive trip but not the critical one
        assert_eq!(sample.thermal_status, ThermalStatus::Severe);
    }

    #[test]
    fn test_mali_fallback() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "class/misc/mali0/device/cur_freq", "848000000\n");
        write(dir.path(), "class/misc/mali0/device/utilization", "12\n");

        let sample = DeviceMonitor::new(dir.path()).sample();
        assert!((sample.gpu_frequency - 0.848).abs() < 1e-6);
        assert_eq!(sample.gpu_utilization, 12.0);
        assert_eq!(sample.thermal_status, ThermalStatus::Unknown);
    }

    #[test]
    fn test_empty_tree() {
        let dir = TempDir::new().unwrap();
        let sample = DeviceMonitor::new(dir.path()).sample();
        assert!(sample.cpu_temperature.is_nan());
        assert!(sample.cpu_frequency.is_nan());
        assert_eq!(sample.gpu_frequency, 0.0);
    }

    #[test]
    fn test_recorder_row_layout() {
        let sysfs = fake_sysfs();
        let out = TempDir::new().unwrap();
        let mut recorder = PerformanceRecorder::create(out.path(), DeviceMonitor::new(sysfs.path())).unwrap();
        recorder.record().unwrap();

        let content = fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], PERFORMANCE_HEADER.join(","));

        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields.len(), PERFORMANCE_HEADER.len());
        assert_eq!(fields[1], "Severe");
        assert_eq!(fields[2], "45");
        assert_eq!(fields[4], "NaN");
    }
}
