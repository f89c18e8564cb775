//! Running aggregate over live frame results and batch analyses.
//!
//! - total detections only grows
//! - peak occupancy never decreases
//! - average confidence is the latest reported value, not a weighted mean
//! - history is FIFO with a fixed capacity

use serde::Serialize;
use std::collections::VecDeque;

use crate::detect::{ConfidenceDistribution, FrameResult, ProcessingStats, VideoAnalysis};
use crate::feed::FeedId;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: f64,
    pub people_count: u32,
    pub avg_confidence: f32,
    pub feed_id: Option<FeedId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_detections: u64,
    pub avg_confidence: f32,
    pub peak_occupancy: u32,
    pub history: VecDeque<HistoryPoint>,
    pub confidence_distribution: ConfidenceDistribution,
    pub processing: ProcessingStats,
    pub frames_processed: u64,
}

#[derive(Clone, Debug)]
pub struct AnalyticsAggregator {
    snapshot: AnalyticsSnapshot,
    history_capacity: usize,
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl AnalyticsAggregator {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            snapshot: AnalyticsSnapshot::default(),
            history_capacity: history_capacity.max(1),
        }
    }

    pub fn snapshot(&self) -> &AnalyticsSnapshot {
        &self.snapshot
    }

    /// Fold one live frame result in.
    pub fn record_frame(&mut self, feed_id: &FeedId, result: &FrameResult, timestamp: f64) {
        let count = result.people_count();
        let snap = &mut self.snapshot;
        snap.total_detections = snap.total_detections.saturating_add(count as u64);
        snap.peak_occupancy = snap.peak_occupancy.max(count as u32);
        if !result.detections.is_empty() {
            snap.avg_confidence = result.average_confidence();
        }
        snap.confidence_distribution
            .add(&ConfidenceDistribution::from_detections(&result.detections));
        if let Some(seconds) = result.processing_time.filter(|s| *s > 0.0) {
            snap.processing = ProcessingStats {
                avg_processing_time: seconds,
                processing_fps: 1.0 / seconds,
            };
        }
        snap.frames_processed = snap.frames_processed.saturating_add(1);
        self.push_history(HistoryPoint {
            timestamp,
            people_count: count as u32,
            avg_confidence: result.average_confidence(),
            feed_id: Some(feed_id.clone()),
        });
    }

    /// Fold a complete batch analysis in.
    pub fn record_analysis(&mut self, feed_id: &FeedId, analysis: &VideoAnalysis) {
        let snap = &mut self.snapshot;
        snap.total_detections = snap
            .total_detections
            .saturating_add(analysis.total_detections);
        snap.peak_occupancy = snap.peak_occupancy.max(analysis.peak_occupancy);
        snap.avg_confidence = analysis.avg_confidence;
        snap.confidence_distribution = analysis.confidence_distribution;
        snap.processing = analysis.processing_stats;
        snap.frames_processed = snap
            .frames_processed
            .saturating_add(analysis.frames_processed);
        for entry in &analysis.detection_timeline {
            self.push_history(HistoryPoint {
                timestamp: entry.timestamp,
                people_count: entry.people_count,
                avg_confidence: entry.avg_confidence,
                feed_id: Some(feed_id.clone()),
            });
        }
    }

    fn push_history(&mut self, point: HistoryPoint) {
        self.snapshot.history.push_back(point);
        while self.snapshot.history.len() > self.history_capacity {
            self.snapshot.history.pop_front();
        }
    }
}
