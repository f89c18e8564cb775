mod result;
mod timeline;

pub use result::{
    ConfidenceTier, Detection, FrameResult, HIGH_CONFIDENCE, MEDIUM_CONFIDENCE,
};
pub use timeline::{
    nearest_entry, synthesize_detections, ConfidenceDistribution, ProcessingStats,
    TimelineEntry, VideoAnalysis, MAX_SYNTHETIC_BOXES,
};
