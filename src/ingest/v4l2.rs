//! V4L2 camera stream.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates RGB24 at the
//! configured size and rate, and yields frames from an mmap buffer stream.
//! Dropping or stopping the camera closes the device.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::CameraConfig;
use super::{MediaStream, TrackHandle};
use crate::frame::CapturedFrame;

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Camera {
    config: CameraConfig,
    state: Option<V4l2State>,
    track: TrackHandle,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

impl V4l2Camera {
    pub fn open(config: CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "v4l2 device {} does not deliver RGB24 frames",
                config.device
            ));
        }

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Camera: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Camera: opened {} ({}x{})",
            config.device,
            format.width,
            format.height
        );
        Ok(Self {
            active_width: format.width,
            active_height: format.height,
            config,
            state: Some(state),
            track: TrackHandle::live(),
            frame_count: 0,
        })
    }
}

impl MediaStream for V4l2Camera {
    fn label(&self) -> &str {
        &self.config.device
    }

    fn next_frame(&mut self) -> Result<CapturedFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("camera {} has been stopped", self.config.device))?;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;
        self.frame_count += 1;
        CapturedFrame::from_rgb(
            pixels,
            self.active_width,
            self.active_height,
            self.frame_count,
        )
    }

    fn track(&self) -> TrackHandle {
        self.track.clone()
    }

    fn stop(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Camera: released {}", self.config.device);
        }
        self.track.end();
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.stop();
    }
}
