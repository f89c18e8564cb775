//! Periodic frame capture for live feeds.
//!
//! A `CaptureTask` owns the feed's media stream on a worker thread. Every
//! tick it checks the channel; when open it grabs a frame, encodes it as
//! base64 JPEG and offers it to the channel's single outbound slot. Ticks
//! while the channel is not open are skipped without grabbing. The cadence
//! is fixed and does not adapt to round-trip latency.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::channel::{ChannelHandle, OutboundMessage};
use crate::config::{CaptureSettings, DetectionConfig};
use crate::feed::FeedId;
use crate::ingest::{MediaStream, TrackHandle};

/// Detection settings shared between the dashboard and capture tasks.
pub type SharedDetectionConfig = Arc<RwLock<DetectionConfig>>;

/// Counters reported when a capture task ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub ticks: u64,
    pub sent: u64,
    /// Ticks skipped because the channel was not open.
    pub skipped: u64,
    pub errors: u64,
}

pub struct CaptureTask {
    feed: FeedId,
    track: TrackHandle,
    shutdown: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Arc<RgbImage>>>>,
    join: Option<JoinHandle<CaptureStats>>,
}

impl CaptureTask {
    pub fn spawn(
        feed: FeedId,
        stream: Box<dyn MediaStream>,
        channel: ChannelHandle,
        config: SharedDetectionConfig,
        settings: CaptureSettings,
    ) -> Result<Self> {
        if settings.fps == 0 {
            return Err(anyhow!("capture fps must be greater than zero"));
        }
        let track = stream.track();
        let shutdown = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(Mutex::new(None));
        let worker = CaptureWorker {
            feed: feed.clone(),
            stream,
            channel,
            config,
            interval: Duration::from_secs_f64(1.0 / settings.fps as f64),
            jpeg_quality: settings.jpeg_quality,
            shutdown: shutdown.clone(),
            latest: latest.clone(),
            stats: CaptureStats::default(),
        };
        let join = std::thread::Builder::new()
            .name(format!("capture-{}", feed))
            .spawn(move || worker.run())
            .context("spawn capture worker")?;
        log::info!("Capture[{}]: started at {} fps", feed, settings.fps);
        Ok(Self {
            feed,
            track,
            shutdown,
            latest,
            join: Some(join),
        })
    }

    pub fn track(&self) -> &TrackHandle {
        &self.track
    }

    /// Most recent frame offered to the channel.
    pub fn latest_frame(&self) -> Option<Arc<RgbImage>> {
        match self.latest.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stop capturing and release the media stream.
    pub fn stop(mut self) -> Result<CaptureStats> {
        self.shutdown_worker()
    }

    fn shutdown_worker(&mut self) -> Result<CaptureStats> {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(join) = self.join.take() else {
            return Ok(CaptureStats::default());
        };
        join.thread().unpark();
        let stats = join
            .join()
            .map_err(|_| anyhow!("capture thread for {} panicked", self.feed))?;
        log::info!(
            "Capture[{}]: stopped after {} ticks ({} sent, {} skipped, {} errors)",
            self.feed,
            stats.ticks,
            stats.sent,
            stats.skipped,
            stats.errors
        );
        Ok(stats)
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_worker() {
            log::warn!("Capture[{}]: {:#}", self.feed, err);
        }
    }
}

struct CaptureWorker {
    feed: FeedId,
    stream: Box<dyn MediaStream>,
    channel: ChannelHandle,
    config: SharedDetectionConfig,
    interval: Duration,
    jpeg_quality: u8,
    shutdown: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Arc<RgbImage>>>>,
    stats: CaptureStats,
}

impl CaptureWorker {
    fn run(mut self) -> CaptureStats {
        let mut next = Instant::now() + self.interval;
        loop {
            if !self.wait_until(next) {
                break;
            }
            self.tick();
            next += self.interval;
            let now = Instant::now();
            if next < now {
                // Fell behind; drop the missed ticks.
                next = now;
            }
        }
        self.stream.stop();
        self.stats
    }

    /// Sleep until `deadline`. Returns false once shutdown was requested.
    fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::park_timeout(deadline - now);
        }
    }

    fn tick(&mut self) {
        self.stats.ticks += 1;
        if !self.channel.is_open() {
            self.stats.skipped += 1;
            return;
        }
        match self.capture_message() {
            Ok((message, image)) => {
                {
                    let mut slot = match self.latest.lock() {
                        Ok(slot) => slot,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    *slot = Some(Arc::new(image));
                }
                if self.channel.send(message) {
                    self.stats.sent += 1;
                } else {
                    self.stats.skipped += 1;
                }
            }
            Err(err) => {
                self.stats.errors += 1;
                log::warn!("Capture[{}]: {:#}", self.feed, err);
            }
        }
    }

    fn capture_message(&mut self) -> Result<(OutboundMessage, RgbImage)> {
        let frame = self
            .stream
            .next_frame()
            .with_context(|| format!("grab frame from {}", self.stream.label()))?;
        let data = frame.to_base64_jpeg(self.jpeg_quality)?;
        let config = match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let message = OutboundMessage::frame(data, self.feed.clone(), &config);
        Ok((message, frame.into_image()))
    }
}
