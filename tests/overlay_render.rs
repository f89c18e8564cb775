use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;

use crowdwatch::api::{AnnotatedImage, HealthStatus, InferenceApi, VideoUpload};
use crowdwatch::overlay::TierStyle;
use crowdwatch::{
    CameraDevices, ConfidenceTier, Dashboard, DashboardConfig, DetectionConfig, FeedId,
    InlineExecutor, MemoryConnector, RecoveryAction, Services, TimelineEntry, VideoAnalysis,
};

/// Answers every analysis with one timeline entry of two people.
struct OneEntryApi;

impl InferenceApi for OneEntryApi {
    fn health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            detector_type: "stub".to_string(),
        })
    }

    fn analyze_video(&self, _upload: &VideoUpload) -> Result<VideoAnalysis> {
        Ok(VideoAnalysis {
            detection_timeline: vec![TimelineEntry {
                timestamp: 0.0,
                people_count: 2,
                avg_confidence: 0.6,
            }],
            total_detections: 2,
            peak_occupancy: 2,
            avg_confidence: 0.6,
            frames_processed: 1,
            ..VideoAnalysis::default()
        })
    }

    fn annotate_image(&self, _path: &Path, _confidence: f32) -> Result<AnnotatedImage> {
        Err(anyhow!("not used"))
    }

    fn push_stream_config(&self, _cfg: &DetectionConfig) -> Result<()> {
        Ok(())
    }
}

fn dashboard_with_clip(dev_mode: bool) -> (Dashboard, FeedId, tempfile::TempDir) {
    let mut config = DashboardConfig::default();
    config.dev_mode = dev_mode;
    let mut dashboard = Dashboard::new(
        config,
        Services {
            api: Arc::new(OneEntryApi),
            devices: Arc::new(CameraDevices::new()),
            connector: Arc::new(MemoryConnector::new()),
            executor: Arc::new(InlineExecutor),
        },
    );
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("hall.mp4");
    std::fs::write(&clip, b"clip").unwrap();
    let feed = FeedId::new("feed1");
    dashboard.load_file(&feed, &clip).unwrap();
    dashboard.pump();
    (dashboard, feed, dir)
}

#[test]
fn file_feed_overlay_draws_synthetic_boxes() {
    let (mut dashboard, feed, _dir) = dashboard_with_clip(false);

    let plan = dashboard.overlay_for(&feed, (320, 240)).unwrap().unwrap();
    assert_eq!(plan.canvas, (320, 240));
    assert_eq!(plan.boxes.len(), 2);
    assert!(plan.boxes.iter().all(|item| item.synthetic));
    assert!(plan
        .boxes
        .iter()
        .all(|item| item.tier == ConfidenceTier::Medium && item.label == "60%"));
    assert_eq!(plan.boxes[0].rect, [48.0, 24.0, 112.0, 216.0]);
    assert_eq!(plan.badge.as_ref().unwrap().text, "People: 2");

    let image = dashboard
        .render_overlay(&feed, (320, 240), false)
        .unwrap()
        .unwrap();
    assert_eq!(image.dimensions(), (320, 240));
    let yellow = TierStyle::of(ConfidenceTier::Medium).color;
    assert_eq!(*image.get_pixel(48, 120), yellow);
    assert_eq!(*image.get_pixel(47, 120), yellow);
    assert_eq!(image.get_pixel(200, 230)[3], 0);
    assert!(image.get_pixel(12, 12)[3] > 0);
}

#[test]
fn hidden_boxes_render_an_empty_overlay() {
    let (mut dashboard, feed, _dir) = dashboard_with_clip(false);
    dashboard
        .update_config(DetectionConfig {
            show_boxes: false,
            ..DetectionConfig::default()
        })
        .unwrap();
    dashboard.pump();

    let plan = dashboard.overlay_for(&feed, (320, 240)).unwrap().unwrap();
    assert!(plan.boxes.is_empty());
    assert!(plan.badge.is_none());
    let image = dashboard
        .render_overlay(&feed, (320, 240), false)
        .unwrap()
        .unwrap();
    assert!(image.pixels().all(|pixel| pixel[3] == 0));
}

#[test]
fn tripped_boundary_shows_recovery_until_reset() {
    let (mut dashboard, feed, _dir) = dashboard_with_clip(true);

    let tripped: Option<()> = dashboard
        .render_boundary()
        .guard(|| panic!("widget exploded"));
    assert!(tripped.is_none());
    assert!(dashboard.overlay_for(&feed, (320, 240)).unwrap().is_none());

    let screen = dashboard.recovery_screen().unwrap();
    assert_eq!(
        screen.actions,
        vec![RecoveryAction::Reload, RecoveryAction::Reset]
    );
    assert_eq!(screen.details.as_deref(), Some("widget exploded"));

    dashboard.reset_view();
    assert!(dashboard.recovery_screen().is_none());
    assert!(dashboard.overlay_for(&feed, (320, 240)).unwrap().is_some());
}

#[test]
fn recovery_screen_hides_details_outside_dev_mode() {
    let (mut dashboard, _feed, _dir) = dashboard_with_clip(false);
    let _: Option<()> = dashboard
        .render_boundary()
        .guard(|| Err(anyhow!("decode failed")));
    let screen = dashboard.recovery_screen().unwrap();
    assert!(screen.details.is_none());
}
