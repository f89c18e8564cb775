//! The dashboard: feed controller and event dispatcher.
//!
//! Worker threads (channel transports, capture tasks, HTTP jobs) never touch
//! dashboard state. They post `DashboardEvent`s to a queue which the owner
//! drains with `pump` / `pump_until`; each event is applied as one state
//! transition keyed by feed id.
//!
//! Every async result carries the feed generation it was issued under.
//! Starting, stopping, loading or resetting a feed bumps the generation, so
//! results from an abandoned session are dropped instead of applied.

use anyhow::{anyhow, Result};
use image::{RgbImage, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::alerts::{AlertLog, Severity};
use crate::analytics::{AnalyticsAggregator, AnalyticsSnapshot};
use crate::api::{HealthStatus, HttpApi, InferenceApi, VideoUpload};
use crate::boundary::{RecoveryScreen, RenderBoundary};
use crate::capture::{CaptureTask, SharedDetectionConfig};
use crate::channel::{ChannelConnector, ChannelEvent, ChannelHandle, InboundMessage, WsConnector};
use crate::config::{DashboardConfig, DetectionConfig};
use crate::detect::{synthesize_detections, Detection, FrameResult, VideoAnalysis};
use crate::error::FeedError;
use crate::executor::{Executor, ThreadExecutor};
use crate::feed::{Feed, FeedId, FeedMode, FeedRegistry};
use crate::ingest::{validate_video_file, CameraDevices, MediaDevices, TrackHandle};
use crate::overlay::{OverlayPlan, OverlayRenderer, VideoGeometry};

/// External collaborators of a dashboard.
#[derive(Clone)]
pub struct Services {
    pub api: Arc<dyn InferenceApi>,
    pub devices: Arc<dyn MediaDevices>,
    pub connector: Arc<dyn ChannelConnector>,
    pub executor: Arc<dyn Executor>,
}

impl Services {
    /// HTTP + WebSocket against `config.api_base`, jobs on threads.
    pub fn connect(config: &DashboardConfig, devices: CameraDevices) -> Result<Self> {
        Ok(Self {
            api: Arc::new(HttpApi::new(&config.api_base)),
            devices: Arc::new(devices),
            connector: Arc::new(WsConnector::new(&config.api_base)?),
            executor: Arc::new(ThreadExecutor),
        })
    }
}

/// Work completed off the dashboard thread.
#[derive(Debug)]
pub enum DashboardEvent {
    Channel {
        feed: FeedId,
        generation: u64,
        event: ChannelEvent,
    },
    Analysis {
        feed: FeedId,
        generation: u64,
        outcome: Result<VideoAnalysis, String>,
    },
    Health(Result<HealthStatus, String>),
    ConfigPushed(Result<(), String>),
}

/// A failure the user must acknowledge (a blocking dialog in a GUI).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub feed: Option<FeedId>,
    pub message: String,
}

struct LiveSession {
    channel: ChannelHandle,
    capture: CaptureTask,
}

pub struct Dashboard {
    config: DashboardConfig,
    detection: SharedDetectionConfig,
    services: Services,
    feeds: FeedRegistry,
    sessions: HashMap<FeedId, LiveSession>,
    analytics: AnalyticsAggregator,
    alerts: AlertLog,
    notices: Vec<Notice>,
    boundary: RenderBoundary,
    renderer: OverlayRenderer,
    api_connected: bool,
    detector_type: Option<String>,
    events_tx: Sender<DashboardEvent>,
    events_rx: Receiver<DashboardEvent>,
    started: Instant,
}

impl Dashboard {
    pub fn new(mut config: DashboardConfig, services: Services) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        config.detection = config.detection.clone().clamped();
        Self {
            detection: Arc::new(RwLock::new(config.detection.clone())),
            feeds: FeedRegistry::default(),
            sessions: HashMap::new(),
            analytics: AnalyticsAggregator::new(config.history_capacity),
            alerts: AlertLog::with_capacity(config.alert_capacity),
            notices: Vec::new(),
            boundary: RenderBoundary::new(config.dev_mode),
            renderer: OverlayRenderer::from_config(config.font_path.as_deref()),
            api_connected: false,
            detector_type: None,
            events_tx,
            events_rx,
            started: Instant::now(),
            config,
            services,
        }
    }

    // ----- state -----

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn detection_config(&self) -> DetectionConfig {
        match self.detection.read() {
            Ok(cfg) => cfg.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn feeds(&self) -> &FeedRegistry {
        &self.feeds
    }

    pub fn feed(&self, id: &FeedId) -> Result<&Feed, FeedError> {
        self.feeds.get(id)
    }

    pub fn add_feed(&mut self, id: FeedId) -> Result<(), FeedError> {
        self.feeds.add(id).map(|_| ())
    }

    pub fn analytics(&self) -> &AnalyticsSnapshot {
        self.analytics.snapshot()
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    pub fn api_connected(&self) -> bool {
        self.api_connected
    }

    pub fn detector_type(&self) -> Option<&str> {
        self.detector_type.as_deref()
    }

    /// Drain notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Track of the camera held by a live feed.
    pub fn camera_track(&self, feed: &FeedId) -> Option<TrackHandle> {
        self.sessions
            .get(feed)
            .map(|session| session.capture.track().clone())
    }

    pub fn channel(&self, feed: &FeedId) -> Option<&ChannelHandle> {
        self.sessions.get(feed).map(|session| &session.channel)
    }

    /// Last frame captured on a live feed.
    pub fn latest_frame(&self, feed: &FeedId) -> Option<Arc<RgbImage>> {
        self.sessions
            .get(feed)
            .and_then(|session| session.capture.latest_frame())
    }

    // ----- feed controller -----

    /// Open the feed's camera and result channel and start capturing.
    pub fn start_live_feed(&mut self, id: &FeedId) -> Result<()> {
        let feed = self.feeds.get(id)?;
        if feed.is_streaming {
            return Err(FeedError::AlreadyStreaming(id.clone()).into());
        }

        let stream = match self.services.devices.open_camera(id) {
            Ok(stream) => stream,
            Err(err) => {
                let reason = format!("{:#}", err);
                log::warn!("Dashboard: camera access failed for {}: {}", id, reason);
                self.notify(Some(id), format!("Camera access failed: {}", reason));
                return Err(FeedError::CameraUnavailable {
                    feed: id.clone(),
                    reason,
                }
                .into());
            }
        };

        let generation = self.feeds.get_mut(id)?.bump_generation();
        let subscriber = {
            let tx = self.events_tx.clone();
            let feed = id.clone();
            Box::new(move |event: ChannelEvent| {
                let _ = tx.send(DashboardEvent::Channel {
                    feed: feed.clone(),
                    generation,
                    event,
                });
            })
        };
        let channel = match self.services.connector.connect(id, subscriber) {
            Ok(channel) => channel,
            Err(err) => {
                let reason = format!("{:#}", err);
                drop(stream);
                log::warn!("Dashboard: streaming channel for {} failed: {}", id, reason);
                self.feeds.get_mut(id)?.is_connected = false;
                self.alerts.record(
                    format!("Streaming connection failed for {}: {}", id, reason),
                    Severity::High,
                    Some(id.clone()),
                );
                return Err(FeedError::ChannelUnavailable {
                    feed: id.clone(),
                    reason,
                }
                .into());
            }
        };

        let capture = match CaptureTask::spawn(
            id.clone(),
            stream,
            channel.clone(),
            self.detection.clone(),
            self.config.capture.clone(),
        ) {
            Ok(capture) => capture,
            Err(err) => {
                channel.close();
                return Err(err);
            }
        };

        let feed = self.feeds.get_mut(id)?;
        feed.mode = FeedMode::Live;
        feed.is_streaming = true;
        feed.is_processing = false;
        feed.is_connected = channel.is_open();
        feed.source = None;
        feed.analysis = None;
        feed.playback.reset();
        feed.detections.clear();
        feed.people_count = 0;
        feed.stats.clear();
        feed.last_error = None;
        self.sessions.insert(id.clone(), LiveSession { channel, capture });
        log::info!("Dashboard: {} live (generation {})", id, generation);
        Ok(())
    }

    /// Stop capturing, release the camera and close the channel. Stopping a
    /// feed that is not live is a no-op.
    pub fn stop_live_feed(&mut self, id: &FeedId) -> Result<()> {
        self.feeds.get(id)?;
        let Some(session) = self.sessions.remove(id) else {
            return Ok(());
        };
        let feed = self.feeds.get_mut(id)?;
        feed.bump_generation();
        feed.clear_live_state();
        session.channel.close();
        session.capture.stop()?;
        log::info!("Dashboard: {} stopped", id);
        Ok(())
    }

    /// Drop and reopen the channel of a live feed.
    pub fn reconnect_feed(&mut self, id: &FeedId) -> Result<()> {
        self.stop_live_feed(id)?;
        self.start_live_feed(id)
    }

    /// Bind a video file to the feed and submit it for batch analysis.
    /// Non-video files are rejected before any state change or request.
    pub fn load_file(&mut self, id: &FeedId, path: &Path) -> Result<()> {
        self.feeds.get(id)?;
        let source = match validate_video_file(path) {
            Ok(source) => source,
            Err(err) => {
                log::warn!("Dashboard: rejected {} for {}: {}", path.display(), id, err);
                self.notify(Some(id), err.to_string());
                return Err(err.into());
            }
        };
        if self.sessions.contains_key(id) {
            self.stop_live_feed(id)?;
        }

        let upload = VideoUpload {
            feed_id: id.clone(),
            path: source.path.clone(),
            mime: source.mime.clone(),
            confidence: self.detection_config().confidence,
        };
        let feed = self.feeds.get_mut(id)?;
        let generation = feed.bump_generation();
        feed.mode = FeedMode::File;
        feed.source = Some(source);
        feed.analysis = None;
        feed.playback.reset();
        feed.detections.clear();
        feed.people_count = 0;
        feed.last_error = None;
        feed.is_processing = true;

        let api = self.services.api.clone();
        let tx = self.events_tx.clone();
        let feed_id = id.clone();
        let job = Box::new(move || {
            let outcome = api
                .analyze_video(&upload)
                .map_err(|err| format!("{:#}", err));
            let _ = tx.send(DashboardEvent::Analysis {
                feed: feed_id,
                generation,
                outcome,
            });
        });
        if let Err(err) = self
            .services
            .executor
            .spawn(&format!("analyze-{}", id), job)
        {
            self.feeds.get_mut(id)?.is_processing = false;
            return Err(err);
        }
        log::info!("Dashboard: {} analyzing {}", id, path.display());
        Ok(())
    }

    /// Return the feed to its initial idle state. Pending results for it
    /// are dropped when they arrive.
    pub fn reset_feed(&mut self, id: &FeedId) -> Result<()> {
        self.stop_live_feed(id)?;
        let feed = self.feeds.get_mut(id)?;
        feed.bump_generation();
        feed.clear_live_state();
        feed.mode = FeedMode::Idle;
        feed.is_processing = false;
        feed.source = None;
        feed.analysis = None;
        feed.playback.reset();
        feed.last_error = None;
        Ok(())
    }

    /// Play or pause a file feed. Returns whether it is now playing.
    pub fn toggle_playback(&mut self, id: &FeedId) -> Result<bool> {
        let feed = self.file_feed_mut(id)?;
        Ok(feed.playback.toggle(Instant::now()))
    }

    pub fn seek(&mut self, id: &FeedId, position_s: f64) -> Result<()> {
        let feed = self.file_feed_mut(id)?;
        feed.playback.seek(position_s, Instant::now());
        Ok(())
    }

    pub fn playback_position(&self, id: &FeedId) -> Result<f64> {
        let feed = self.feeds.get(id)?;
        if feed.source.is_none() {
            return Err(FeedError::NoVideoSource(id.clone()).into());
        }
        Ok(feed.playback.position(Instant::now()))
    }

    fn file_feed_mut(&mut self, id: &FeedId) -> Result<&mut Feed> {
        let feed = self.feeds.get_mut(id)?;
        if feed.source.is_none() {
            return Err(FeedError::NoVideoSource(id.clone()).into());
        }
        Ok(feed)
    }

    // ----- service -----

    /// Check the inference service; the outcome arrives as an event.
    pub fn check_health(&mut self) -> Result<()> {
        let api = self.services.api.clone();
        let tx = self.events_tx.clone();
        self.services.executor.spawn(
            "health",
            Box::new(move || {
                let outcome = api.health().map_err(|err| format!("{:#}", err));
                let _ = tx.send(DashboardEvent::Health(outcome));
            }),
        )
    }

    /// Startup handshake with the service: a health check, then the current
    /// detection settings pushed so the service alerts on our thresholds.
    pub fn start(&mut self) -> Result<()> {
        self.check_health()?;
        self.update_config(self.detection_config())
    }

    /// Apply new detection settings (clamped) and push them to the service.
    /// Running capture tasks pick them up on their next frame.
    pub fn update_config(&mut self, config: DetectionConfig) -> Result<()> {
        let config = config.clamped();
        {
            let mut shared = match self.detection.write() {
                Ok(shared) => shared,
                Err(poisoned) => poisoned.into_inner(),
            };
            *shared = config.clone();
        }
        self.config.detection = config.clone();

        let api = self.services.api.clone();
        let tx = self.events_tx.clone();
        self.services.executor.spawn(
            "stream-config",
            Box::new(move || {
                let outcome = api
                    .push_stream_config(&config)
                    .map_err(|err| format!("{:#}", err));
                let _ = tx.send(DashboardEvent::ConfigPushed(outcome));
            }),
        )
    }

    // ----- overlay -----

    /// Detections to draw for a feed right now. File feeds synthesise
    /// placeholder boxes from the timeline entry nearest the playback
    /// position.
    pub fn current_detections(
        &self,
        id: &FeedId,
        frame_size: (u32, u32),
    ) -> Result<Vec<Detection>> {
        let feed = self.feeds.get(id)?;
        Ok(detections_for(feed, frame_size, Instant::now()))
    }

    /// Overlay plan for a feed shown at `displayed` size. Returns `None`
    /// while the render boundary is tripped.
    pub fn overlay_for(
        &mut self,
        id: &FeedId,
        displayed: (u32, u32),
    ) -> Result<Option<OverlayPlan>> {
        let feed = self.feeds.get(id)?;
        let video = VideoGeometry::new(self.intrinsic_size(feed), displayed);
        let show_boxes = self.detection_config().show_boxes;
        let now = Instant::now();
        Ok(self.boundary.guard(|| {
            let detections = detections_for(feed, video.source_size(), now);
            Ok(OverlayPlan::for_video(&detections, video, show_boxes))
        }))
    }

    /// Rasterised overlay for a feed. With `over_frame`, live feeds are
    /// composited onto their latest captured frame.
    pub fn render_overlay(
        &mut self,
        id: &FeedId,
        displayed: (u32, u32),
        over_frame: bool,
    ) -> Result<Option<RgbaImage>> {
        let Some(plan) = self.overlay_for(id, displayed)? else {
            return Ok(None);
        };
        let frame = if over_frame { self.latest_frame(id) } else { None };
        let renderer = &self.renderer;
        Ok(self.boundary.guard(|| {
            Ok(match &frame {
                Some(frame) => renderer.composite(frame, &plan),
                None => renderer.render(&plan),
            })
        }))
    }

    pub fn recovery_screen(&self) -> Option<RecoveryScreen> {
        self.boundary.recovery_screen()
    }

    pub fn render_boundary(&mut self) -> &mut RenderBoundary {
        &mut self.boundary
    }

    /// Clear a tripped render boundary so overlays render again.
    pub fn reset_view(&mut self) {
        self.boundary.reset();
    }

    fn intrinsic_size(&self, feed: &Feed) -> Option<(u32, u32)> {
        match feed.mode {
            FeedMode::Live => self
                .latest_frame(&feed.id)
                .map(|frame| frame.dimensions()),
            FeedMode::File => feed.source.as_ref().and_then(|source| source.size),
            FeedMode::Idle => None,
        }
    }

    // ----- dispatch -----

    /// Apply all queued events. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Apply events as they arrive until `done` holds or `timeout` passes.
    /// Returns whether `done` held.
    pub fn pump_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&Dashboard) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        self.pump();
        loop {
            if done(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.events_rx.recv_timeout(deadline - now) {
                Ok(event) => self.apply(event),
                Err(RecvTimeoutError::Timeout) => return done(self),
                Err(RecvTimeoutError::Disconnected) => return done(self),
            }
        }
    }

    /// Post an event as if a worker had produced it.
    pub fn event_sender(&self) -> Sender<DashboardEvent> {
        self.events_tx.clone()
    }

    fn apply(&mut self, event: DashboardEvent) {
        match event {
            DashboardEvent::Channel {
                feed,
                generation,
                event,
            } => self.apply_channel_event(&feed, generation, event),
            DashboardEvent::Analysis {
                feed,
                generation,
                outcome,
            } => self.apply_analysis(&feed, generation, outcome),
            DashboardEvent::Health(outcome) => self.apply_health(outcome),
            DashboardEvent::ConfigPushed(Ok(())) => {
                log::debug!("Dashboard: stream config pushed");
            }
            DashboardEvent::ConfigPushed(Err(reason)) => {
                log::warn!("Dashboard: pushing stream config failed: {}", reason);
                self.alerts.record(
                    format!("Failed to update detection settings: {}", reason),
                    Severity::Medium,
                    None,
                );
            }
        }
    }

    fn apply_channel_event(&mut self, id: &FeedId, generation: u64, event: ChannelEvent) {
        let Ok(feed) = self.feeds.get_mut(id) else {
            log::debug!("Dashboard: event for unknown feed {}", id);
            return;
        };
        if !feed.is_current(generation) {
            log::debug!("Dashboard: dropping stale channel event for {}", id);
            return;
        }
        match event {
            ChannelEvent::Opened => {
                feed.is_connected = true;
                self.alerts.record(
                    format!("{} connected to detection stream", id),
                    Severity::Low,
                    Some(id.clone()),
                );
            }
            ChannelEvent::Message(InboundMessage::DetectionResult(result)) => {
                if feed.mode != FeedMode::Live {
                    return;
                }
                feed.apply_frame_result(&result, Instant::now());
                let timestamp = self.frame_timestamp(&result);
                self.analytics.record_frame(id, &result, timestamp);
            }
            ChannelEvent::Message(InboundMessage::Alert(remote)) => {
                let origin = remote.feed_id.map(FeedId::new).unwrap_or_else(|| id.clone());
                self.alerts
                    .record(remote.message, remote.severity, Some(origin));
            }
            ChannelEvent::Message(_) => {}
            ChannelEvent::Closed { reason } => {
                feed.is_connected = false;
                match reason {
                    Some(reason) => {
                        log::warn!("Dashboard: {} stream closed: {}", id, reason);
                        self.alerts.record(
                            format!("Detection stream lost for {}: {}", id, reason),
                            Severity::High,
                            Some(id.clone()),
                        );
                    }
                    None => {
                        self.alerts.record(
                            format!("{} disconnected from detection stream", id),
                            Severity::Medium,
                            Some(id.clone()),
                        );
                    }
                }
            }
        }
    }

    fn apply_analysis(
        &mut self,
        id: &FeedId,
        generation: u64,
        outcome: Result<VideoAnalysis, String>,
    ) {
        let Ok(feed) = self.feeds.get_mut(id) else {
            return;
        };
        if !feed.is_current(generation) {
            log::info!("Dashboard: ignoring stale analysis result for {}", id);
            return;
        }
        feed.is_processing = false;
        match outcome {
            Ok(analysis) => {
                feed.playback.set_duration(analysis.duration());
                self.analytics.record_analysis(id, &analysis);
                self.alerts.record(
                    format!(
                        "Analysis complete for {}: {} detections, peak {}",
                        id, analysis.total_detections, analysis.peak_occupancy
                    ),
                    Severity::Low,
                    Some(id.clone()),
                );
                log::info!(
                    "Dashboard: {} analysis done ({} frames)",
                    id,
                    analysis.frames_processed
                );
                feed.analysis = Some(analysis);
            }
            Err(reason) => {
                log::warn!("Dashboard: analysis for {} failed: {}", id, reason);
                feed.last_error = Some(reason.clone());
                self.alerts.record(
                    format!("Video analysis failed for {}: {}", id, reason),
                    Severity::High,
                    Some(id.clone()),
                );
                self.notify(Some(id), format!("Video analysis failed: {}", reason));
            }
        }
    }

    fn apply_health(&mut self, outcome: Result<HealthStatus, String>) {
        match outcome {
            Ok(status) => {
                if !self.api_connected {
                    self.alerts.record(
                        format!("Detection API online ({})", status.detector_type),
                        Severity::Low,
                        None,
                    );
                }
                log::info!("Dashboard: api healthy, detector {}", status.detector_type);
                self.api_connected = true;
                self.detector_type = Some(status.detector_type);
            }
            Err(reason) => {
                log::warn!("Dashboard: health check failed: {}", reason);
                self.api_connected = false;
                self.alerts.record(
                    format!("Detection API unreachable: {}", reason),
                    Severity::High,
                    None,
                );
            }
        }
    }

    fn frame_timestamp(&self, result: &FrameResult) -> f64 {
        result
            .timestamp
            .unwrap_or_else(|| self.started.elapsed().as_secs_f64())
    }

    fn notify(&mut self, feed: Option<&FeedId>, message: String) {
        self.notices.push(Notice {
            feed: feed.cloned(),
            message,
        });
    }

    // ----- teardown -----

    /// Stop every live feed.
    pub fn shutdown(&mut self) -> Result<()> {
        let live: Vec<FeedId> = self.sessions.keys().cloned().collect();
        let mut first_err = None;
        for id in live {
            if let Err(err) = self.stop_live_feed(&id) {
                log::warn!("Dashboard: stopping {} failed: {:#}", id, err);
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(anyhow!("shutdown incomplete: {:#}", err)),
            None => Ok(()),
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("Dashboard: {:#}", err);
        }
    }
}

fn detections_for(feed: &Feed, frame_size: (u32, u32), now: Instant) -> Vec<Detection> {
    match feed.mode {
        FeedMode::Live => feed.detections.clone(),
        FeedMode::File => {
            let Some(analysis) = &feed.analysis else {
                return Vec::new();
            };
            let position = feed.playback.position(now);
            analysis
                .nearest_entry(position)
                .map(|entry| synthesize_detections(entry, frame_size))
                .unwrap_or_default()
        }
        FeedMode::Idle => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AnnotatedImage;
    use crate::channel::MemoryConnector;
    use crate::detect::TimelineEntry;
    use crate::executor::InlineExecutor;

    struct OfflineApi;

    impl InferenceApi for OfflineApi {
        fn health(&self) -> Result<HealthStatus> {
            Err(anyhow!("connection refused"))
        }

        fn analyze_video(&self, _upload: &VideoUpload) -> Result<VideoAnalysis> {
            Err(anyhow!("connection refused"))
        }

        fn annotate_image(&self, _path: &Path, _confidence: f32) -> Result<AnnotatedImage> {
            Err(anyhow!("connection refused"))
        }

        fn push_stream_config(&self, _cfg: &DetectionConfig) -> Result<()> {
            Ok(())
        }
    }

    fn dashboard() -> Dashboard {
        Dashboard::new(
            DashboardConfig::default(),
            Services {
                api: Arc::new(OfflineApi),
                devices: Arc::new(CameraDevices::new()),
                connector: Arc::new(MemoryConnector::new()),
                executor: Arc::new(InlineExecutor),
            },
        )
    }

    #[test]
    fn stale_analysis_is_dropped() {
        let mut dash = dashboard();
        let feed = FeedId::new("feed1");
        let old = dash.feeds.get_mut(&feed).unwrap().bump_generation();
        dash.feeds.get_mut(&feed).unwrap().bump_generation();

        dash.event_sender()
            .send(DashboardEvent::Analysis {
                feed: feed.clone(),
                generation: old,
                outcome: Ok(VideoAnalysis {
                    total_detections: 9,
                    peak_occupancy: 4,
                    ..VideoAnalysis::default()
                }),
            })
            .unwrap();
        assert_eq!(dash.pump(), 1);
        assert_eq!(dash.analytics().total_detections, 0);
        assert!(dash.feed(&feed).unwrap().analysis.is_none());
    }

    #[test]
    fn file_feed_synthesises_boxes_from_nearest_entry() {
        let mut dash = dashboard();
        let feed = FeedId::new("feed2");
        {
            let f = dash.feeds.get_mut(&feed).unwrap();
            f.mode = FeedMode::File;
            f.analysis = Some(VideoAnalysis {
                detection_timeline: vec![
                    TimelineEntry {
                        timestamp: 0.0,
                        people_count: 1,
                        avg_confidence: 0.9,
                    },
                    TimelineEntry {
                        timestamp: 5.0,
                        people_count: 3,
                        avg_confidence: 0.5,
                    },
                ],
                ..VideoAnalysis::default()
            });
        }
        let at_start = dash.current_detections(&feed, (640, 480)).unwrap();
        assert_eq!(at_start.len(), 1);
        assert!(at_start.iter().all(|d| d.synthetic));

        dash.feeds
            .get_mut(&feed)
            .unwrap()
            .playback
            .seek(4.0, Instant::now());
        assert_eq!(dash.current_detections(&feed, (640, 480)).unwrap().len(), 3);
    }

    #[test]
    fn playback_requires_a_video() {
        let mut dash = dashboard();
        let err = dash.toggle_playback(&FeedId::new("feed1")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FeedError>(),
            Some(FeedError::NoVideoSource(_))
        ));
    }

    #[test]
    fn config_updates_are_clamped() {
        let mut dash = dashboard();
        dash.update_config(DetectionConfig {
            confidence: 3.0,
            max_people: 0,
            ..DetectionConfig::default()
        })
        .unwrap();
        let cfg = dash.detection_config();
        assert_eq!(cfg.confidence, 1.0);
        assert_eq!(cfg.max_people, 1);
        dash.pump();
        assert!(dash.alerts().is_empty());
    }
}
