//! Per-feed state and the indexed feed registry.
//!
//! Feed state is plain data. Live resources (camera stream, capture task,
//! channel) are owned by the dashboard and keyed by the same `FeedId`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::detect::{Detection, FrameResult, VideoAnalysis};
use crate::error::FeedError;

pub const DEFAULT_FEED_IDS: [&str; 2] = ["feed1", "feed2"];

const STATS_WINDOW: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    #[default]
    Idle,
    Live,
    File,
}

/// A video file bound to a feed.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoSource {
    pub path: PathBuf,
    pub mime: String,
    /// Intrinsic pixel size when known.
    pub size: Option<(u32, u32)>,
}

/// Playback clock for file feeds.
#[derive(Clone, Debug, Default)]
pub struct Playback {
    playing: bool,
    /// Position accumulated up to the last pause/seek.
    base_position: f64,
    resumed_at: Option<Instant>,
    duration: Option<f64>,
}

impl Playback {
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration;
    }

    /// Flip play/pause. Returns the new playing state.
    pub fn toggle(&mut self, now: Instant) -> bool {
        if self.playing {
            self.base_position = self.position(now);
            self.resumed_at = None;
            self.playing = false;
        } else {
            self.resumed_at = Some(now);
            self.playing = true;
        }
        self.playing
    }

    pub fn position(&self, now: Instant) -> f64 {
        let mut position = self.base_position;
        if let Some(resumed_at) = self.resumed_at {
            position += now.saturating_duration_since(resumed_at).as_secs_f64();
        }
        self.clamp(position)
    }

    pub fn seek(&mut self, position: f64, now: Instant) {
        self.base_position = self.clamp(position);
        if self.playing {
            self.resumed_at = Some(now);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn clamp(&self, position: f64) -> f64 {
        let position = position.max(0.0);
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

/// Throughput and latency over the last few live results.
#[derive(Clone, Debug, Default)]
pub struct FeedStats {
    arrivals: VecDeque<Instant>,
    latencies_s: VecDeque<f64>,
}

impl FeedStats {
    pub fn record(&mut self, at: Instant, latency_s: Option<f64>) {
        self.arrivals.push_back(at);
        if self.arrivals.len() > STATS_WINDOW {
            self.arrivals.pop_front();
        }
        if let Some(latency) = latency_s {
            self.latencies_s.push_back(latency);
            if self.latencies_s.len() > STATS_WINDOW {
                self.latencies_s.pop_front();
            }
        }
    }

    /// Results per second across the window; zero until two results arrived.
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.arrivals.front(), self.arrivals.back()) else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first);
        if span == Duration::ZERO {
            return 0.0;
        }
        (self.arrivals.len() - 1) as f64 / span.as_secs_f64()
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.latencies_s.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.latencies_s.iter().sum();
        sum / self.latencies_s.len() as f64 * 1000.0
    }

    pub fn clear(&mut self) {
        self.arrivals.clear();
        self.latencies_s.clear();
    }
}

#[derive(Clone, Debug)]
pub struct Feed {
    pub id: FeedId,
    pub mode: FeedMode,
    pub is_streaming: bool,
    /// Streaming channel connectivity.
    pub is_connected: bool,
    pub is_processing: bool,
    pub people_count: usize,
    pub detections: Vec<Detection>,
    pub stats: FeedStats,
    pub source: Option<VideoSource>,
    pub playback: Playback,
    pub analysis: Option<VideoAnalysis>,
    pub last_error: Option<String>,
    generation: u64,
}

impl Feed {
    pub fn new(id: FeedId) -> Self {
        Self {
            id,
            mode: FeedMode::Idle,
            is_streaming: false,
            is_connected: false,
            is_processing: false,
            people_count: 0,
            detections: Vec::new(),
            stats: FeedStats::default(),
            source: None,
            playback: Playback::default(),
            analysis: None,
            last_error: None,
            generation: 0,
        }
    }

    /// Identity of the feed's current session. Async results issued under an
    /// older generation must be discarded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new session and return its generation.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn apply_frame_result(&mut self, result: &FrameResult, at: Instant) {
        self.detections = result.detections.clone();
        self.people_count = result.people_count();
        self.stats.record(at, result.processing_time);
    }

    /// Return to the offline state, keeping any bound file.
    pub fn clear_live_state(&mut self) {
        self.is_streaming = false;
        self.is_connected = false;
        self.people_count = 0;
        self.detections.clear();
        self.stats.clear();
        if self.mode == FeedMode::Live {
            self.mode = FeedMode::Idle;
        }
    }
}

/// Feeds kept in insertion order, looked up by id.
#[derive(Clone, Debug)]
pub struct FeedRegistry {
    feeds: Vec<Feed>,
}

impl Default for FeedRegistry {
    fn default() -> Self {
        Self::with_ids(DEFAULT_FEED_IDS.iter().map(|id| FeedId::new(*id)))
    }
}

impl FeedRegistry {
    pub fn with_ids(ids: impl IntoIterator<Item = FeedId>) -> Self {
        let mut registry = Self { feeds: Vec::new() };
        for id in ids {
            // Duplicate ids collapse into one feed.
            let _ = registry.add(id);
        }
        registry
    }

    pub fn add(&mut self, id: FeedId) -> Result<&mut Feed, FeedError> {
        if self.position(&id).is_some() {
            return Err(FeedError::DuplicateFeed(id));
        }
        self.feeds.push(Feed::new(id));
        let last = self.feeds.len() - 1;
        Ok(&mut self.feeds[last])
    }

    pub fn get(&self, id: &FeedId) -> Result<&Feed, FeedError> {
        self.position(id)
            .map(|idx| &self.feeds[idx])
            .ok_or_else(|| FeedError::UnknownFeed(id.clone()))
    }

    pub fn get_mut(&mut self, id: &FeedId) -> Result<&mut Feed, FeedError> {
        match self.position(id) {
            Some(idx) => Ok(&mut self.feeds[idx]),
            None => Err(FeedError::UnknownFeed(id.clone())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feed> {
        self.feeds.iter()
    }

    pub fn ids(&self) -> Vec<FeedId> {
        self.feeds.iter().map(|feed| feed.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    fn position(&self, id: &FeedId) -> Option<usize> {
        self.feeds.iter().position(|feed| &feed.id == id)
    }
}
