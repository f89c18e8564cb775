use serde::{Deserialize, Serialize};

/// Confidence at or above which a detection is drawn in the "high" tier.
pub const HIGH_CONFIDENCE: f32 = 0.7;
/// Confidence at or above which a detection is drawn in the "medium" tier.
pub const MEDIUM_CONFIDENCE: f32 = 0.4;

/// A single person detection reported by the inference service.
///
/// Coordinates are in source-video pixel space (`[x1, y1, x2, y2]`).
/// Derived geometry is recomputed from the box when the service omits it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "DetectionWire")]
pub struct Detection {
    pub bbox: [f32; 4],
    /// Always within 0..=1.
    pub confidence: f32,
    pub center: [f32; 2],
    pub width: f32,
    pub height: f32,
    pub area: f32,
    /// Placeholder box laid out by the client (batch mode), not model output.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

#[derive(Deserialize)]
struct DetectionWire {
    bbox: [f32; 4],
    confidence: f32,
    #[serde(default)]
    center: Option<[f32; 2]>,
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    area: Option<f32>,
    #[serde(default)]
    synthetic: bool,
}

impl From<DetectionWire> for Detection {
    fn from(wire: DetectionWire) -> Self {
        let mut detection = Detection::new(wire.bbox, wire.confidence);
        if let Some(center) = wire.center {
            detection.center = center;
        }
        if let Some(width) = wire.width {
            detection.width = width;
        }
        if let Some(height) = wire.height {
            detection.height = height;
        }
        if let Some(area) = wire.area {
            detection.area = area;
        }
        detection.synthetic = wire.synthetic;
        detection
    }
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32) -> Self {
        let [x1, y1, x2, y2] = bbox;
        let width = (x2 - x1).abs();
        let height = (y2 - y1).abs();
        Self {
            bbox,
            confidence: clamp_confidence(confidence),
            center: [(x1 + x2) / 2.0, (y1 + y2) / 2.0],
            width,
            height,
            area: width * height,
            synthetic: false,
        }
    }

    pub fn synthetic(bbox: [f32; 4], confidence: f32) -> Self {
        Self {
            synthetic: true,
            ..Self::new(bbox, confidence)
        }
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::of(self.confidence)
    }
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Display tier derived from a detection's confidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn of(confidence: f32) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            ConfidenceTier::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

/// Result of running detection on one live frame, as pushed by the service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Falls back to `detections.len()` when absent.
    #[serde(default)]
    pub people_count: Option<usize>,
    /// Server-side processing time in seconds.
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Echo of the feed the frame was captured on.
    #[serde(default, alias = "feedId")]
    pub feed_id: Option<String>,
}

impl FrameResult {
    pub fn people_count(&self) -> usize {
        self.people_count.unwrap_or(self.detections.len())
    }

    pub fn average_confidence(&self) -> f32 {
        if self.detections.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.detections.iter().map(|d| d.confidence).sum();
        sum / self.detections.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert_eq!(ConfidenceTier::of(1.0), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::of(0.7), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::of(0.6999), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::of(0.4), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::of(0.3999), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::of(0.0), ConfidenceTier::Low);
    }

    #[test]
    fn tier_is_a_partition_of_unit_interval() {
        for step in 0..=1000 {
            let c = step as f32 / 1000.0;
            let tier = ConfidenceTier::of(c);
            assert_eq!(tier == ConfidenceTier::High, c >= 0.7, "c={c}");
            assert_eq!(tier == ConfidenceTier::Medium, (0.4..0.7).contains(&c), "c={c}");
            assert_eq!(tier == ConfidenceTier::Low, c < 0.4, "c={c}");
        }
    }

    #[test]
    fn derives_geometry_from_bbox() {
        let d = Detection::new([100.0, 100.0, 300.0, 400.0], 0.9);
        assert_eq!(d.center, [200.0, 250.0]);
        assert_eq!(d.width, 200.0);
        assert_eq!(d.height, 300.0);
        assert_eq!(d.area, 60_000.0);
    }

    #[test]
    fn deserialize_fills_missing_fields_and_clamps_confidence() {
        let d: Detection =
            serde_json::from_str(r#"{"bbox":[0,0,10,20],"confidence":1.3}"#).unwrap();
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.area, 200.0);
        assert!(!d.synthetic);
    }

    #[test]
    fn deserialize_keeps_reported_geometry() {
        let d: Detection = serde_json::from_str(
            r#"{"bbox":[0,0,10,20],"confidence":0.5,"center":[1,2],"width":3,"height":4,"area":12}"#,
        )
        .unwrap();
        assert_eq!(d.center, [1.0, 2.0]);
        assert_eq!(d.area, 12.0);
    }

    #[test]
    fn frame_result_people_count_falls_back_to_detections() {
        let result = FrameResult {
            detections: vec![Detection::new([0.0, 0.0, 1.0, 1.0], 0.5)],
            ..FrameResult::default()
        };
        assert_eq!(result.people_count(), 1);
        assert!((result.average_confidence() - 0.5).abs() < f32::EPSILON);
    }
}
