//! crowdwatch
//!
//! Client side of a people-detection surveillance dashboard. The detection
//! model runs in a remote service; this crate manages the video feeds,
//! streams frames to the service, and turns what comes back into overlays,
//! analytics and alerts.
//!
//! # Architecture
//!
//! - Background work (capture, channel transports, HTTP requests) runs on
//!   threads and reports through a queue of `DashboardEvent`s.
//! - The `Dashboard` applies those events one at a time, keyed by feed id.
//! - Each feed has a generation counter; results issued for an older
//!   generation are discarded.
//!
//! # Module Structure
//!
//! - `feed`: per-feed state and the indexed `FeedRegistry`
//! - `ingest`: cameras (`stub://`, V4L2) and video file validation
//! - `frame` / `capture`: frame encoding and the periodic capture task
//! - `channel`: streaming result channel (WebSocket, in-memory)
//! - `api`: HTTP client for health, batch analysis, annotation, config
//! - `detect`: detection and analysis result types
//! - `overlay`: detection overlay planning and rasterisation
//! - `analytics` / `alerts`: running aggregates and the bounded alert log
//! - `boundary`: render failure containment
//! - `dashboard`: feed controller and event dispatcher

pub mod alerts;
pub mod analytics;
pub mod api;
pub mod boundary;
pub mod capture;
pub mod channel;
pub mod config;
pub mod dashboard;
pub mod detect;
pub mod error;
pub mod executor;
pub mod feed;
pub mod frame;
pub mod ingest;
pub mod overlay;

pub use alerts::{Alert, AlertLog, RemoteAlert, Severity};
pub use analytics::{AnalyticsAggregator, AnalyticsSnapshot, HistoryPoint};
pub use api::{AnnotatedImage, HealthStatus, HttpApi, InferenceApi, VideoUpload};
pub use boundary::{RecoveryAction, RecoveryScreen, RenderBoundary};
pub use capture::{CaptureStats, CaptureTask};
pub use channel::{
    ChannelConnector, ChannelEvent, ChannelHandle, ChannelState, InboundMessage,
    MemoryConnector, OutboundMessage, WsConnector,
};
pub use config::{CaptureSettings, DashboardConfig, DetectionConfig};
pub use dashboard::{Dashboard, DashboardEvent, Notice, Services};
pub use detect::{ConfidenceTier, Detection, FrameResult, TimelineEntry, VideoAnalysis};
pub use error::FeedError;
pub use executor::{Executor, InlineExecutor, ThreadExecutor};
pub use feed::{Feed, FeedId, FeedMode, FeedRegistry};
pub use frame::CapturedFrame;
pub use ingest::{CameraConfig, CameraDevices, MediaDevices, MediaStream, SyntheticCamera};
pub use overlay::{OverlayPlan, OverlayRenderer, VideoGeometry};
