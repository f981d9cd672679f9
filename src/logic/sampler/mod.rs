//! Throttled Sampling Loop
//!
//! While running, a single consumer task pulls the latest frame, classifies
//! it on the blocking pool and then sleeps out whatever is left of the task
//! period before it accepts the next frame.
//!
//! ## States
//! - Idle -> Running on `start()`
//! - Running -> Idle on `pause()`
//! - Running -> Running on a repeated `start()` (stats re-armed, same consumer)
//!
//! ## Cancellation
//! `pause()` flips the cancel signal and aborts the consumer. A sample caught
//! inside its rate-limit sleep is abandoned: it neither updates the stats
//! nor publishes. Every pause also bumps an epoch, and a sample only commits
//! if the epoch it began under is still current. A repeated `start()` only
//! re-arms the stats; the in-flight sample still commits, against the new
//! running period.
//!
//! An inference already on the blocking pool cannot be aborted. It holds the
//! inference gate until `classify` returns, so a consumer started right after
//! a pause waits for it instead of running the classifier concurrently.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use super::config::{Delegate, SessionConfig};
use super::events::{ResultSink, GPU_UNSUPPORTED_MESSAGE, INIT_FAILED_MESSAGE};
use super::frames::{Frame, FrameSource};
use super::model::{preprocess, Classifications, Classifier, ClassifierFactory};
use super::stats::{StatsAccumulator, StatsSnapshot};

// ============================================================================
// OUTCOME
// ============================================================================

/// What happened to one frame handed to `process_frame`
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Classified, counted and published
    Completed {
        results: Vec<Classifications>,
        inference_time: Duration,
    },
    /// No classifier could be built for this frame
    NoClassifier,
    /// Inference itself failed
    Failed,
    /// Cancelled during the rate-limit sleep
    Cancelled,
    /// Finished after a pause; not counted
    Stale,
}

// ============================================================================
// SAMPLER
// ============================================================================

struct Consumer {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct SamplerCore {
    index: usize,
    config: RwLock<SessionConfig>,
    factory: Arc<dyn ClassifierFactory>,
    source: Arc<dyn FrameSource>,
    sink: Option<Arc<dyn ResultSink>>,
    running: AtomicBool,
    epoch: AtomicU64,
    classifier: Mutex<Option<Arc<dyn Classifier>>>,
    /// Held for the whole of one `classify` call
    inference_gate: Arc<AsyncMutex<()>>,
    stats: Mutex<StatsAccumulator>,
}

pub struct ThrottledSampler {
    core: Arc<SamplerCore>,
    consumer: Mutex<Option<Consumer>>,
}

impl ThrottledSampler {
    pub fn new(
        index: usize,
        config: SessionConfig,
        factory: Arc<dyn ClassifierFactory>,
        source: Arc<dyn FrameSource>,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Self {
        Self {
            core: Arc::new(SamplerCore {
                index,
                config: RwLock::new(config),
                factory,
                source,
                sink,
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                classifier: Mutex::new(None),
                inference_gate: Arc::new(AsyncMutex::new(())),
                stats: Mutex::new(StatsAccumulator::new()),
            }),
            consumer: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Begin (or re-arm) sampling. Must be called inside a tokio runtime.
    pub fn start(&self) {
        self.core.running.store(true, Ordering::SeqCst);
        self.core.stats.lock().reset(Instant::now());

        let mut consumer = self.consumer.lock();
        if consumer.as_ref().map_or(false, |c| !c.handle.is_finished()) {
            log::debug!("Sampler {} already running, stats re-armed", self.core.index);
            return;
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let core = self.core.clone();
        let handle = tokio::spawn(async move {
            core.consume(cancel_rx).await;
        });
        *consumer = Some(Consumer { cancel, handle });

        log::info!("Sampler {} started", self.core.index);
    }

    /// Stop sampling. No new sample begins after this returns.
    pub fn pause(&self) {
        self.core.running.store(false, Ordering::SeqCst);
        self.core.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(consumer) = self.consumer.lock().take() {
            let _ = consumer.cancel.send(true);
            consumer.handle.abort();
            log::info!("Sampler {} paused", self.core.index);
        }
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Run one sample on `frame` directly, outside the consumer loop
    pub async fn process_frame(&self, frame: &Frame) -> SampleOutcome {
        // Sender dropped on purpose: this call is never cancelled
        let (_, mut never) = watch::channel(false);
        self.core.process_frame(frame, &mut never).await
    }

    /// Drop the cached classifier; the next sample rebuilds it from the
    /// then-current configuration
    pub fn clear_classifier(&self) {
        *self.core.classifier.lock() = None;
    }

    pub fn has_classifier(&self) -> bool {
        self.core.classifier.lock().is_some()
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Samples per second since the last `start()`
    pub fn throughput(&self) -> u64 {
        self.core.stats.lock().throughput()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.core.stats.lock().snapshot()
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn index(&self) -> usize {
        self.core.index
    }

    pub fn config(&self) -> SessionConfig {
        self.core.config.read().clone()
    }

    /// Edit the draft configuration. Takes effect for the classifier only
    /// after `clear_classifier()`; the task period applies from the next sample.
    pub fn update_config<R>(&self, edit: impl FnOnce(&mut SessionConfig) -> R) -> R {
        edit(&mut self.core.config.write())
    }

    pub fn current_model_name(&self) -> String {
        self.core.config.read().model.file_name()
    }

    pub fn current_delegate_name(&self) -> &'static str {
        self.core.config.read().delegate.name()
    }
}

impl Drop for ThrottledSampler {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.get_mut().take() {
            consumer.handle.abort();
        }
    }
}

// ============================================================================
// CONSUMER
// ============================================================================

impl SamplerCore {
    async fn consume(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let mut frames = self.source.subscribe();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                next = frames.next_frame() => next,
            };

            let frame = match next {
                Some(Some(frame)) => frame,
                Some(None) => continue,
                None => {
                    log::info!("Frame source for sampler {} ended", self.index);
                    break;
                }
            };

            // Iteration boundary: nothing new starts once paused
            if *cancel.borrow() || !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.process_frame(&frame, &mut cancel).await;
        }
    }

    async fn process_frame(
        &self,
        frame: &Frame,
        cancel: &mut watch::Receiver<bool>,
    ) -> SampleOutcome {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let classifier = match self.classifier_or_build().await {
            Some(c) => c,
            None => return SampleOutcome::NoClassifier,
        };

        // Released inside the blocking job, so an aborted consumer still
        // keeps the next one out until `classify` returns
        let gate = self.inference_gate.clone().lock_owned().await;

        let started = Instant::now();
        let image = frame.image.clone();
        let rotation = frame.rotation_degrees;

        let job = tokio::task::spawn_blocking(move || {
            let _gate = gate;
            let upright = preprocess::upright(&image, rotation);
            let before = std::time::Instant::now();
            let result = classifier.classify(&upright);
            (result, before.elapsed())
        });

        let (result, inference_time) = match job.await {
            Ok(done) => done,
            Err(e) => {
                log::error!("Inference task for sampler {} failed: {}", self.index, e);
                self.report_error("Inference task failed");
                return SampleOutcome::Failed;
            }
        };
        let finished = Instant::now();

        let results = match result {
            Ok(results) => results,
            Err(e) => {
                log::error!("Sampler {} inference error: {}", self.index, e);
                self.report_error(&e.to_string());
                return SampleOutcome::Failed;
            }
        };

        // Rate limiter
        let period = self.config.read().task_period;
        if let Some(remaining) = period.checked_sub(inference_time).filter(|d| !d.is_zero()) {
            tokio::select! {
                biased;
                _ = cancelled(cancel) => return SampleOutcome::Cancelled,
                _ = sleep(remaining) => {}
            }
        }

        {
            let mut stats = self.stats.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return SampleOutcome::Stale;
            }
            stats.record(started, inference_time, finished);
        }

        if let Some(sink) = &self.sink {
            sink.on_results(&results, inference_time);
        }

        SampleOutcome::Completed { results, inference_time }
    }

    /// Cached classifier, or a fresh one from the current config snapshot.
    /// Failures are reported and leave the cache empty so the next frame
    /// retries.
    async fn classifier_or_build(&self) -> Option<Arc<dyn Classifier>> {
        let cached = self.classifier.lock().clone();
        if let Some(existing) = cached {
            return Some(existing);
        }

        let mut snapshot = self.config.read().clone();
        if snapshot.delegate == Delegate::Gpu && !self.factory.delegate_supported(Delegate::Gpu) {
            log::warn!("Sampler {}: GPU delegate unavailable, using CPU", self.index);
            self.report_error(GPU_UNSUPPORTED_MESSAGE);
            snapshot.delegate = Delegate::Cpu;
        }

        let factory = self.factory.clone();
        let built = tokio::task::spawn_blocking(move || factory.build(&snapshot)).await;

        match built {
            Ok(Ok(classifier)) => {
                *self.classifier.lock() = Some(classifier.clone());
                Some(classifier)
            }
            Ok(Err(e)) => {
                log::error!("Failed to load model with error: {}", e);
                self.report_error(INIT_FAILED_MESSAGE);
                None
            }
            Err(e) => {
                log::error!("Classifier build task failed: {}", e);
                self.report_error(INIT_FAILED_MESSAGE);
                None
            }
        }
    }

    fn report_error(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink.on_error(message);
        }
    }
}

/// Resolves once the cancel flag is raised. A dropped sender means
/// "never cancelled".
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
