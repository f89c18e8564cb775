//! Camera device selection and the synthetic `stub://` camera.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::collections::HashMap;

use super::{MediaDevices, MediaStream, TrackHandle};
use crate::feed::FeedId;
use crate::frame::CapturedFrame;

/// Configuration of one camera device.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Device path (e.g. "/dev/video0") or "stub://<name>".
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

impl CameraConfig {
    pub fn stub(name: &str) -> Self {
        Self {
            device: format!("stub://{}", name),
            ..Self::default()
        }
    }
}

/// Feed-to-device assignment. Feeds without an assignment have no camera.
#[derive(Clone, Debug, Default)]
pub struct CameraDevices {
    assignments: HashMap<FeedId, CameraConfig>,
}

impl CameraDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, feed: FeedId, config: CameraConfig) -> Self {
        self.assignments.insert(feed, config);
        self
    }

    pub fn assignment(&self, feed: &FeedId) -> Option<&CameraConfig> {
        self.assignments.get(feed)
    }
}

impl MediaDevices for CameraDevices {
    fn open_camera(&self, feed: &FeedId) -> Result<Box<dyn MediaStream>> {
        let config = self
            .assignments
            .get(feed)
            .ok_or_else(|| anyhow!("no camera assigned to {}", feed))?
            .clone();
        if config.device.starts_with("stub://") {
            return Ok(Box::new(SyntheticCamera::open(config)));
        }
        open_device(config)
    }
}

#[cfg(feature = "camera-v4l2")]
fn open_device(config: CameraConfig) -> Result<Box<dyn MediaStream>> {
    Ok(Box::new(super::v4l2::V4l2Camera::open(config)?))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device(config: CameraConfig) -> Result<Box<dyn MediaStream>> {
    Err(anyhow!(
        "camera {} requires the camera-v4l2 feature",
        config.device
    ))
}

/// Synthetic camera: a drifting gradient with a dark block walking across it.
pub struct SyntheticCamera {
    config: CameraConfig,
    track: TrackHandle,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn open(config: CameraConfig) -> Self {
        log::info!("SyntheticCamera: opened {}", config.device);
        Self {
            config,
            track: TrackHandle::live(),
            frame_count: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let (w, h) = (self.config.width.max(1), self.config.height.max(1));
        let shift = self.frame_count as u32;
        let block_w = (w / 8).max(1);
        let block_h = (h / 2).max(1);
        let block_x = (shift * 4) % w;
        let block_y = h / 4;
        RgbImage::from_fn(w, h, |x, y| {
            let in_block = x >= block_x
                && x < block_x + block_w
                && y >= block_y
                && y < block_y + block_h;
            if in_block {
                Rgb([20, 20, 30])
            } else {
                Rgb([
                    ((x + shift) % 256) as u8,
                    ((y + shift / 2) % 256) as u8,
                    128,
                ])
            }
        })
    }
}

impl MediaStream for SyntheticCamera {
    fn label(&self) -> &str {
        &self.config.device
    }

    fn next_frame(&mut self) -> Result<CapturedFrame> {
        if !self.track.is_live() {
            return Err(anyhow!("camera {} has been stopped", self.config.device));
        }
        self.frame_count += 1;
        Ok(CapturedFrame::new(self.render(), self.frame_count))
    }

    fn track(&self) -> TrackHandle {
        self.track.clone()
    }

    fn stop(&mut self) {
        if self.track.is_live() {
            self.track.end();
            log::info!("SyntheticCamera: released {}", self.config.device);
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_camera_produces_frames_of_configured_size() -> Result<()> {
        let devices = CameraDevices::new().assign(
            FeedId::new("feed1"),
            CameraConfig {
                width: 64,
                height: 48,
                ..CameraConfig::stub("front")
            },
        );
        let mut stream = devices.open_camera(&FeedId::new("feed1"))?;
        let frame = stream.next_frame()?;
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(frame.sequence, 1);
        Ok(())
    }

    #[test]
    fn unassigned_feed_has_no_camera() {
        let devices = CameraDevices::new();
        let err = devices.open_camera(&FeedId::new("feed2")).err().unwrap();
        assert!(err.to_string().contains("no camera assigned"));
    }

    #[test]
    fn stop_ends_track_and_blocks_capture() {
        let mut camera = SyntheticCamera::open(CameraConfig::stub("x"));
        let track = camera.track();
        assert!(track.is_live());
        camera.stop();
        camera.stop();
        assert!(!track.is_live());
        assert!(camera.next_frame().is_err());
    }

    #[test]
    fn dropping_releases_the_track() {
        let camera = SyntheticCamera::open(CameraConfig::stub("y"));
        let track = camera.track();
        drop(camera);
        assert!(!track.is_live());
    }
}
