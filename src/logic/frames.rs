//! Frame Sources
//!
//! A source hands out subscriptions; each `start()` of a sampler takes a
//! fresh one. A subscription yields:
//! - `Some(Some(frame))` when a frame is available
//! - `Some(None)` when the source ticked with nothing to offer (skipped)
//! - `None` when the source is exhausted

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use image::RgbImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::error::{SamplerError, SamplerResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Image extensions picked up by `DirectorySource`
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

// ============================================================================
// FRAME
// ============================================================================

/// One captured frame and how far the sensor had it rotated
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    pub rotation_degrees: i32,
}

impl Frame {
    pub fn new(image: RgbImage, rotation_degrees: i32) -> Self {
        Self { image: Arc::new(image), rotation_degrees }
    }
}

// ============================================================================
// TRAITS
// ============================================================================

pub trait FrameSubscription: Send {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Option<Frame>>>;
}

pub trait FrameSource: Send + Sync {
    fn subscribe(&self) -> Box<dyn FrameSubscription>;
}

// ============================================================================
// LATEST FRAME SLOT
// ============================================================================

/// Keep-only-latest push source. Producers overwrite, consumers see the
/// newest frame; intermediate frames are dropped.
#[derive(Debug)]
pub struct LatestFrameSlot {
    tx: watch::Sender<Option<Frame>>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(frame));
    }

    /// Drop the held frame; subscribers see an empty tick
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

struct SlotSubscription {
    rx: watch::Receiver<Option<Frame>>,
    primed: bool,
}

impl FrameSubscription for SlotSubscription {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Option<Frame>>> {
        Box::pin(async move {
            // First poll replays the held frame, or an empty tick that
            // landed after subscribing
            if !self.primed {
                self.primed = true;
                let changed = self.rx.has_changed().unwrap_or(false);
                let current = self.rx.borrow_and_update().clone();
                if current.is_some() || changed {
                    return Some(current);
                }
            }
            self.rx.changed().await.ok()?;
            Some(self.rx.borrow_and_update().clone())
        })
    }
}

impl FrameSource for LatestFrameSlot {
    fn subscribe(&self) -> Box<dyn FrameSubscription> {
        Box::new(SlotSubscription {
            rx: self.tx.subscribe(),
            primed: false,
        })
    }
}

// ============================================================================
// DIRECTORY SOURCE
// ============================================================================

/// Replays the images of a directory at a fixed frame interval
#[derive(Debug, Clone)]
pub struct DirectorySource {
    files: Arc<Vec<PathBuf>>,
    frame_interval: Duration,
    rotation_degrees: i32,
    looping: bool,
}

impl DirectorySource {
    /// Scan `dir` for images, sorted by name
    pub fn open(dir: &Path, frame_interval: Duration) -> SamplerResult<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|res| res.ok())
            .map(|e| e.path())
            .filter(|p| is_image(p))
            .collect();
        files.sort();

        log::info!("Frame source: {} images in {:?}", files.len(), dir);

        Ok(Self {
            files: Arc::new(files),
            frame_interval,
            rotation_degrees: 0,
            looping: true,
        })
    }

    pub fn with_rotation(mut self, rotation_degrees: i32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Decode any supported image into RGB8
pub fn decode_frame(path: &Path) -> SamplerResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| SamplerError::FrameDecode(format!("{:?}: {}", path, e)))
}

struct DirectorySubscription {
    source: DirectorySource,
    ticker: Interval,
    position: usize,
}

impl FrameSubscription for DirectorySubscription {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Option<Frame>>> {
        Box::pin(async move {
            let files = &self.source.files;
            if files.is_empty() || (!self.source.looping && self.position >= files.len()) {
                return None;
            }

            self.ticker.tick().await;

            let path = files[self.position % files.len()].clone();
            self.position += 1;

            let decoded = tokio::task::spawn_blocking(move || decode_frame(&path)).await;
            match decoded {
                Ok(Ok(image)) => Some(Some(Frame::new(image, self.source.rotation_degrees))),
                Ok(Err(e)) => {
                    log::warn!("Skipping frame: {}", e);
                    Some(None)
                }
                Err(e) => {
                    log::warn!("Frame decode task failed: {}", e);
                    Some(None)
                }
            }
        })
    }
}

impl FrameSource for DirectorySource {
    fn subscribe(&self) -> Box<dyn FrameSubscription> {
        let mut ticker = interval(self.frame_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Box::new(DirectorySubscription {
            source: self.clone(),
            ticker,
            position: 0,
        })
    }
}

// ============================================================================
// PUMP
// ============================================================================

/// Forward every tick of `source` into `slot` until the source ends.
/// An empty tick clears the slot.
pub fn spawn_pump(source: Arc<dyn FrameSource>, slot: Arc<LatestFrameSlot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut subscription = source.subscribe();
        let mut forwarded = 0u64;
        while let Some(next) = subscription.next_frame().await {
            match next {
                Some(frame) => {
                    slot.publish(frame);
                    forwarded += 1;
                }
                None => slot.clear(),
            }
        }
        log::info!("Frame pump finished after {} frames", forwarded);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([value, value, value]))
    }

    #[tokio::test]
    async fn test_slot_replays_current_then_waits() {
        let slot = LatestFrameSlot::new();
        slot.publish(Frame::new(solid(1), 0));

        let mut sub = slot.subscribe();
        let first = sub.next_frame().await.unwrap().unwrap();
        assert_eq!(first.image.get_pixel(0, 0), &Rgb([1, 1, 1]));

        slot.publish(Frame::new(solid(2), 0));
        slot.publish(Frame::new(solid(3), 90));
        let latest = sub.next_frame().await.unwrap().unwrap();
        // Only the newest frame survives
        assert_eq!(latest.image.get_pixel(0, 0), &Rgb([3, 3, 3]));
        assert_eq!(latest.rotation_degrees, 90);
    }

    #[tokio::test]
    async fn test_slot_clear_yields_empty_tick() {
        let slot = LatestFrameSlot::new();
        let mut sub = slot.subscribe();
        slot.clear();
        assert!(matches!(sub.next_frame().await, Some(None)));
    }

    #[tokio::test]
    async fn test_slot_clear_after_frame_yields_empty_tick() {
        let slot = LatestFrameSlot::new();
        slot.publish(Frame::new(solid(1), 0));
        let mut sub = slot.subscribe();
        slot.clear();
        assert!(matches!(sub.next_frame().await, Some(None)));

        slot.publish(Frame::new(solid(2), 0));
        let next = sub.next_frame().await.unwrap().unwrap();
        assert_eq!(next.image.get_pixel(0, 0), &Rgb([2, 2, 2]));
    }

    #[tokio::test]
    async fn test_slot_ends_when_dropped() {
        let slot = LatestFrameSlot::new();
        let mut sub = slot.subscribe();
        drop(slot);
        assert!(sub.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_directory_source_replays_images() {
        let dir = tempdir().unwrap();
        solid(10).save(dir.path().join("a.png")).unwrap();
        solid(20).save(dir.path().join("b.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectorySource::open(dir.path(), Duration::from_millis(1))
            .unwrap()
            .with_rotation(180)
            .with_looping(false);

        let mut sub = source.subscribe();
        let a = sub.next_frame().await.unwrap().unwrap();
        let b = sub.next_frame().await.unwrap().unwrap();
        assert_eq!(a.image.get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(b.image.get_pixel(0, 0), &Rgb([20, 20, 20]));
        assert_eq!(b.rotation_degrees, 180);
        assert!(sub.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_directory_source_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let source = DirectorySource::open(dir.path(), Duration::from_millis(1)).unwrap();
        let mut sub = source.subscribe();
        assert!(matches!(sub.next_frame().await, Some(None)));
    }

    #[tokio::test]
    async fn test_pump_forwards_into_slot() {
        let dir = tempdir().unwrap();
        solid(42).save(dir.path().join("only.png")).unwrap();

        let source = DirectorySource::open(dir.path(), Duration::from_millis(1))
            .unwrap()
            .with_looping(false);
        let slot = Arc::new(LatestFrameSlot::new());
        let mut sub = slot.subscribe();
        spawn_pump(Arc::new(source), slot.clone()).await.unwrap();

        let frame = sub.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([42, 42, 42]));
    }

    #[tokio::test]
    async fn test_pump_clears_slot_on_corrupt_frame() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let source = DirectorySource::open(dir.path(), Duration::from_millis(1))
            .unwrap()
            .with_looping(false);
        let slot = Arc::new(LatestFrameSlot::new());
        slot.publish(Frame::new(solid(7), 0));
        let mut sub = slot.subscribe();
        spawn_pump(Arc::new(source), slot.clone()).await.unwrap();

        assert!(matches!(sub.next_frame().await, Some(None)));
    }
}
