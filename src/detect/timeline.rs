//! Batch (file upload) analysis results.
//!
//! The batch endpoint returns per-timestamp aggregates only. Boxes shown
//! over a playing file are therefore laid out by the client from the
//! nearest timeline entry and flagged `synthetic`.

use serde::{Deserialize, Serialize};

use super::result::{ConfidenceTier, Detection};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Seconds from the start of the video.
    pub timestamp: f64,
    #[serde(default)]
    pub people_count: u32,
    #[serde(default)]
    pub avg_confidence: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    #[serde(default)]
    pub high: u64,
    #[serde(default)]
    pub medium: u64,
    #[serde(default)]
    pub low: u64,
}

impl ConfidenceDistribution {
    pub fn record(&mut self, tier: ConfidenceTier) {
        match tier {
            ConfidenceTier::High => self.high += 1,
            ConfidenceTier::Medium => self.medium += 1,
            ConfidenceTier::Low => self.low += 1,
        }
    }

    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut dist = Self::default();
        for detection in detections {
            dist.record(detection.tier());
        }
        dist
    }

    pub fn add(&mut self, other: &ConfidenceDistribution) {
        self.high = self.high.saturating_add(other.high);
        self.medium = self.medium.saturating_add(other.medium);
        self.low = self.low.saturating_add(other.low);
    }

    pub fn total(&self) -> u64 {
        self.high
            .saturating_add(self.medium)
            .saturating_add(self.low)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Seconds per frame on the server.
    #[serde(default)]
    pub avg_processing_time: f64,
    #[serde(default)]
    pub processing_fps: f64,
}

/// Response of `POST /detect/video/analyze`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    #[serde(default)]
    pub detection_timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub total_detections: u64,
    #[serde(default)]
    pub peak_occupancy: u32,
    #[serde(default)]
    pub avg_confidence: f32,
    #[serde(default)]
    pub confidence_distribution: ConfidenceDistribution,
    #[serde(default)]
    pub processing_stats: ProcessingStats,
    #[serde(default)]
    pub frames_processed: u64,
}

impl VideoAnalysis {
    /// Timestamp of the last timeline entry, if any.
    pub fn duration(&self) -> Option<f64> {
        self.detection_timeline
            .iter()
            .map(|entry| entry.timestamp)
            .fold(None, |acc: Option<f64>, ts| {
                Some(acc.map_or(ts, |max| max.max(ts)))
            })
    }

    pub fn nearest_entry(&self, position_s: f64) -> Option<&TimelineEntry> {
        nearest_entry(&self.detection_timeline, position_s)
    }
}

/// Entry whose timestamp is closest to `position_s`. Ties go to the earlier entry.
pub fn nearest_entry(timeline: &[TimelineEntry], position_s: f64) -> Option<&TimelineEntry> {
    let mut best: Option<(&TimelineEntry, f64)> = None;
    for entry in timeline {
        let distance = (entry.timestamp - position_s).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((entry, distance)),
        }
    }
    best.map(|(entry, _)| entry)
}

/// Upper bound on placeholder boxes drawn for one timeline entry.
pub const MAX_SYNTHETIC_BOXES: usize = 100;

/// Lay out `entry.people_count` placeholder boxes on a grid over a frame,
/// at most [`MAX_SYNTHETIC_BOXES`] of them.
///
/// The layout depends only on the count and frame size, so replaying the
/// same position always draws the same boxes.
pub fn synthesize_detections(entry: &TimelineEntry, frame_size: (u32, u32)) -> Vec<Detection> {
    let count = (entry.people_count as usize).min(MAX_SYNTHETIC_BOXES);
    if count == 0 || frame_size.0 == 0 || frame_size.1 == 0 {
        return Vec::new();
    }
    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    let cell_w = frame_size.0 as f32 / cols as f32;
    let cell_h = frame_size.1 as f32 / rows as f32;

    (0..count)
        .map(|i| {
            let col = (i % cols) as f32;
            let row = (i / cols) as f32;
            let box_w = cell_w * 0.4;
            let box_h = cell_h * 0.8;
            let x1 = col * cell_w + (cell_w - box_w) / 2.0;
            let y1 = row * cell_h + (cell_h - box_h) / 2.0;
            Detection::synthetic([x1, y1, x1 + box_w, y1 + box_h], entry.avg_confidence)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: f64, people_count: u32) -> TimelineEntry {
        TimelineEntry {
            timestamp,
            people_count,
            avg_confidence: 0.8,
        }
    }

    #[test]
    fn nearest_entry_picks_closest_timestamp() {
        let timeline = vec![entry(0.0, 1), entry(1.0, 2), entry(2.0, 3)];
        assert_eq!(nearest_entry(&timeline, 1.4).unwrap().people_count, 2);
        assert_eq!(nearest_entry(&timeline, 1.6).unwrap().people_count, 3);
        assert_eq!(nearest_entry(&timeline, 99.0).unwrap().people_count, 3);
        assert_eq!(nearest_entry(&timeline, 0.5).unwrap().people_count, 1);
        assert!(nearest_entry(&[], 1.0).is_none());
    }

    #[test]
    fn synthesized_boxes_are_flagged_and_stay_in_frame() {
        let boxes = synthesize_detections(&entry(0.0, 5), (640, 480));
        assert_eq!(boxes.len(), 5);
        for b in &boxes {
            assert!(b.synthetic);
            assert!(b.bbox[0] >= 0.0 && b.bbox[2] <= 640.0);
            assert!(b.bbox[1] >= 0.0 && b.bbox[3] <= 480.0);
            assert!((b.confidence - 0.8).abs() < f32::EPSILON);
        }
        assert_eq!(boxes, synthesize_detections(&entry(3.0, 5), (640, 480)));
    }

    #[test]
    fn synthesized_boxes_are_capped() {
        let boxes = synthesize_detections(&entry(0.0, u32::MAX), (640, 480));
        assert_eq!(boxes.len(), MAX_SYNTHETIC_BOXES);
        assert!(boxes.iter().all(|b| b.bbox[2] <= 640.0 && b.bbox[3] <= 480.0));
    }

    #[test]
    fn analysis_parses_minimal_payload() {
        let analysis: VideoAnalysis = serde_json::from_str(
            r#"{"detection_timeline":[{"timestamp":0.5,"people_count":2,"avg_confidence":0.6}],
                "total_detections":2,"peak_occupancy":2}"#,
        )
        .unwrap();
        assert_eq!(analysis.duration(), Some(0.5));
        assert_eq!(analysis.frames_processed, 0);
        assert_eq!(analysis.confidence_distribution.total(), 0);
    }
}
