//! Runtime controls
//!
//! One-line commands for a running pool, the same knobs a settings panel
//! would expose: step threshold / max results / threads / period, switch
//! delegate or model, rebuild, start, pause, status.
//!
//! Classifier settings apply to every sampler and clear its classifier so
//! the next frame rebuilds with them. The period is read live and needs no
//! rebuild.

use std::time::Duration;

use super::config::{Delegate, ModelChoice, SessionConfig, TASK_PERIOD_LIMIT_MS};
use super::pool::SamplerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Up,
    Down,
}

impl Step {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "+" | "up" => Some(Step::Up),
            "-" | "down" => Some(Step::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Threshold(Step),
    MaxResults(Step),
    Threads(Step),
    Period(Step),
    SetPeriod(Duration),
    SetDelegate(Delegate),
    SetModel(ModelChoice),
    Rebuild,
    Start,
    Pause,
    Status,
}

impl ControlCommand {
    /// Accepts `threshold +`, `threshold+`, `period 250`, `delegate gpu`,
    /// `model efficientnet-lite1`, `rebuild`, `start`, `pause`, `status`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim().to_ascii_lowercase();
        let mut parts = line.split_whitespace();
        let head = parts.next()?;

        let (name, inline) = if let Some(name) = head.strip_suffix('+') {
            (name, Some("+"))
        } else if let Some(name) = head.strip_suffix('-') {
            (name, Some("-"))
        } else {
            (head, None)
        };
        let arg = inline.or_else(|| parts.next());

        match (name, arg) {
            ("threshold", Some(a)) => Step::parse(a).map(ControlCommand::Threshold),
            ("results" | "max_results", Some(a)) => Step::parse(a).map(ControlCommand::MaxResults),
            ("threads", Some(a)) => Step::parse(a).map(ControlCommand::Threads),
            ("period", Some(a)) => Step::parse(a)
                .map(ControlCommand::Period)
                .or_else(|| a.parse().ok().map(|ms| ControlCommand::SetPeriod(Duration::from_millis(ms)))),
            ("delegate", Some(a)) => Delegate::parse(a).map(ControlCommand::SetDelegate),
            ("model", Some(a)) => Some(ControlCommand::SetModel(ModelChoice::parse(a))),
            ("rebuild", None) => Some(ControlCommand::Rebuild),
            ("start", None) => Some(ControlCommand::Start),
            ("pause", None) => Some(ControlCommand::Pause),
            ("status", None) => Some(ControlCommand::Status),
            _ => None,
        }
    }

    /// Whether the change only takes effect after a classifier rebuild
    fn needs_rebuild(&self) -> bool {
        matches!(
            self,
            ControlCommand::Threshold(_)
                | ControlCommand::MaxResults(_)
                | ControlCommand::Threads(_)
                | ControlCommand::SetDelegate(_)
                | ControlCommand::SetModel(_)
        )
    }

    fn edit(&self, config: &mut SessionConfig) -> bool {
        match *self {
            ControlCommand::Threshold(Step::Up) => config.raise_threshold(),
            ControlCommand::Threshold(Step::Down) => config.lower_threshold(),
            ControlCommand::MaxResults(Step::Up) => config.increment_max_results(),
            ControlCommand::MaxResults(Step::Down) => config.decrement_max_results(),
            ControlCommand::Threads(Step::Up) => config.increment_threads(),
            ControlCommand::Threads(Step::Down) => config.decrement_threads(),
            ControlCommand::Period(Step::Up) => config.increment_period(),
            ControlCommand::Period(Step::Down) => config.decrement_period(),
            ControlCommand::SetPeriod(period) => {
                let period = period.min(Duration::from_millis(TASK_PERIOD_LIMIT_MS));
                let changed = config.task_period != period;
                config.task_period = period;
                changed
            }
            ControlCommand::SetDelegate(delegate) => {
                let changed = config.delegate != delegate;
                config.delegate = delegate;
                changed
            }
            ControlCommand::SetModel(model) => {
                let changed = config.model != model;
                config.model = model;
                changed
            }
            ControlCommand::Rebuild
            | ControlCommand::Start
            | ControlCommand::Pause
            | ControlCommand::Status => false,
        }
    }
}

/// Apply `command` to every sampler. Returns false when nothing changed,
/// e.g. a setting already at its bound.
pub fn apply(pool: &SamplerPool, command: ControlCommand) -> bool {
    match command {
        ControlCommand::Rebuild => {
            pool.clear_all();
            true
        }
        ControlCommand::Start => {
            pool.start_all();
            true
        }
        ControlCommand::Pause => {
            pool.pause_all();
            true
        }
        ControlCommand::Status => false,
        _ => {
            let mut changed = false;
            for sampler in pool.samplers() {
                if sampler.update_config(|c| command.edit(c)) {
                    changed = true;
                    if command.needs_rebuild() {
                        sampler.clear_classifier();
                    }
                }
            }
            changed
        }
    }
}
