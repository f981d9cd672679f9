//! Session Configuration
//!
//! Draft settings for a sampler. The live classifier only sees a snapshot
//! taken when it is (re)built, so edits here are lazy by nature.

use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};

// ============================================================================
// BOUNDS
// ============================================================================

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NUM_THREADS: usize = 2;
pub const DEFAULT_MAX_RESULTS: usize = 3;
pub const DEFAULT_TASK_PERIOD_MS: u64 = 500;

pub const THRESHOLD_STEP: f32 = 0.1;
pub const THRESHOLD_MAX: f32 = 0.9;
pub const MAX_RESULTS_LIMIT: usize = 3;
pub const NUM_THREADS_LIMIT: usize = 4;
pub const TASK_PERIOD_LIMIT_MS: u64 = 1000;

// ============================================================================
// DELEGATE
// ============================================================================

/// Compute backend used by the inference session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Delegate {
    #[default]
    Cpu,
    Gpu,
    Npu,
}

impl Delegate {
    /// Map a selector position (0 = CPU, 1 = GPU, 2 = NPU)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Delegate::Cpu),
            1 => Some(Delegate::Gpu),
            2 => Some(Delegate::Npu),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Delegate::Cpu => "CPU",
            Delegate::Gpu => "GPU",
            Delegate::Npu => "NPU",
        }
    }

    /// Parse "cpu" / "gpu" / "npu" / "nnapi" or a numeric code
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Some(Delegate::Cpu),
            "gpu" => Some(Delegate::Gpu),
            "npu" | "nnapi" => Some(Delegate::Npu),
            other => other.parse().ok().and_then(Self::from_code),
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// MODEL
// ============================================================================

/// Bundled classification models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelChoice {
    #[default]
    MobileNetV1,
    EfficientNetLite0,
    EfficientNetLite1,
    EfficientNetLite2,
}

impl ModelChoice {
    pub const ALL: [ModelChoice; 4] = [
        ModelChoice::MobileNetV1,
        ModelChoice::EfficientNetLite0,
        ModelChoice::EfficientNetLite1,
        ModelChoice::EfficientNetLite2,
    ];

    /// Unknown codes fall back to MobileNetV1
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ModelChoice::EfficientNetLite0,
            2 => ModelChoice::EfficientNetLite1,
            3 => ModelChoice::EfficientNetLite2,
            _ => ModelChoice::MobileNetV1,
        }
    }

    /// File stem under the model directory
    pub fn stem(&self) -> &'static str {
        match self {
            ModelChoice::MobileNetV1 => "mobilenetv1",
            ModelChoice::EfficientNetLite0 => "efficientnet-lite0",
            ModelChoice::EfficientNetLite1 => "efficientnet-lite1",
            ModelChoice::EfficientNetLite2 => "efficientnet-lite2",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.onnx", self.stem())
    }

    /// Square input edge in pixels
    pub fn input_size(&self) -> u32 {
        match self {
            ModelChoice::MobileNetV1 | ModelChoice::EfficientNetLite0 => 224,
            ModelChoice::EfficientNetLite1 => 240,
            ModelChoice::EfficientNetLite2 => 260,
        }
    }

    pub fn parse(value: &str) -> Self {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.stem() == value || m.file_name() == value)
            .unwrap_or_else(|| Self::from_code(value.parse().unwrap_or(0)))
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

// ============================================================================
// SESSION CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Minimum score for a category to be reported (0.0 - 0.9)
    pub threshold: f32,
    pub num_threads: usize,
    pub max_results: usize,
    pub delegate: Delegate,
    pub model: ModelChoice,
    /// Minimum wall-clock time between successive sample starts
    pub task_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            num_threads: DEFAULT_NUM_THREADS,
            max_results: DEFAULT_MAX_RESULTS,
            delegate: Delegate::Cpu,
            model: ModelChoice::MobileNetV1,
            task_period: Duration::from_millis(DEFAULT_TASK_PERIOD_MS),
        }
    }
}

impl SessionConfig {
    pub fn task_period_ms(&self) -> u64 {
        u64::try_from(self.task_period.as_millis()).unwrap_or(u64::MAX)
    }

    // Stepwise adjusters. Each returns false when the bound was already hit.

    pub fn lower_threshold(&mut self) -> bool {
        if self.threshold >= THRESHOLD_STEP {
            self.threshold = round_tenth(self.threshold - THRESHOLD_STEP);
            true
        } else {
            false
        }
    }

    pub fn raise_threshold(&mut self) -> bool {
        if self.threshold < THRESHOLD_MAX {
            self.threshold = round_tenth(self.threshold + THRESHOLD_STEP);
            true
        } else {
            false
        }
    }

    pub fn decrement_max_results(&mut self) -> bool {
        if self.max_results > 1 {
            self.max_results -= 1;
            true
        } else {
            false
        }
    }

    pub fn increment_max_results(&mut self) -> bool {
        if self.max_results < MAX_RESULTS_LIMIT {
            self.max_results += 1;
            true
        } else {
            false
        }
    }

    pub fn decrement_threads(&mut self) -> bool {
        if self.num_threads > 1 {
            self.num_threads -= 1;
            true
        } else {
            false
        }
    }

    pub fn increment_threads(&mut self) -> bool {
        if self.num_threads < NUM_THREADS_LIMIT {
            self.num_threads += 1;
            true
        } else {
            false
        }
    }

    pub fn decrement_period(&mut self) -> bool {
        let ms = self.task_period_ms();
        if ms > 0 {
            self.task_period = Duration::from_millis(ms - 1);
            true
        } else {
            false
        }
    }

    pub fn increment_period(&mut self) -> bool {
        let ms = self.task_period_ms();
        if ms < TASK_PERIOD_LIMIT_MS {
            self.task_period = Duration::from_millis(ms + 1);
            true
        } else {
            false
        }
    }

    /// Clamp every field into its allowed range (used for env/CLI input)
    pub fn clamped(mut self) -> Self {
        self.threshold = self.threshold.clamp(0.0, THRESHOLD_MAX);
        self.max_results = self.max_results.clamp(1, MAX_RESULTS_LIMIT);
        self.num_threads = self.num_threads.clamp(1, NUM_THREADS_LIMIT);
        self.task_period = self
            .task_period
            .min(Duration::from_millis(TASK_PERIOD_LIMIT_MS));
        self
    }
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
