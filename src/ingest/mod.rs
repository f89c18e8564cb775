//! Media sources for feeds.
//!
//! - Cameras (`MediaDevices` / `MediaStream`): synthetic `stub://` devices and,
//!   with the `camera-v4l2` feature, local V4L2 devices.
//! - Video files (`file`): MIME validation before a file is bound to a feed.
//!
//! A camera stream holds its device until `stop()` is called or it is
//! dropped. Every stream exposes a `TrackHandle` so owners can verify the
//! device was actually released.

pub mod camera;
pub mod file;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::feed::FeedId;
use crate::frame::CapturedFrame;

pub use camera::{CameraConfig, CameraDevices, SyntheticCamera};
pub use file::validate_video_file;

/// Shared liveness flag of a camera track.
#[derive(Clone, Debug)]
pub struct TrackHandle(Arc<AtomicBool>);

impl TrackHandle {
    pub fn live() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// An open camera producing frames.
pub trait MediaStream: Send {
    /// Device label (path or stub URL).
    fn label(&self) -> &str;

    fn next_frame(&mut self) -> Result<CapturedFrame>;

    fn track(&self) -> TrackHandle;

    /// Release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Grants camera access per feed.
pub trait MediaDevices: Send + Sync {
    /// Open the camera assigned to `feed`. An error means access was denied
    /// or no device is available.
    fn open_camera(&self, feed: &FeedId) -> Result<Box<dyn MediaStream>>;
}
