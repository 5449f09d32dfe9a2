//! V4L2 camera session for USB cameras (`/dev/videoN`).

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::CaptureSession;

/// Open V4L2 capture stream. Dropping or releasing closes the device.
pub struct V4l2Session {
    device: String,
    state: Option<DeviceV4l2State>,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_count: u64,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Session {
    /// Open `device`, negotiate RGB3 (or YUYV) at the preferred size and start
    /// streaming.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self> {
        use v4l::buffer::Type;

        let device = v4l::Device::with_path(device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;

        let format = negotiate_format(&device, device_path, width, height)?;
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "{} offers unsupported pixel format {}",
                device_path,
                format.fourcc
            )
        })?;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Session: opened {} ({}x{} {:?})",
            device_path,
            format.width,
            format.height,
            pixel_format
        );

        Ok(Self {
            device: device_path.to_string(),
            state: Some(state),
            format: pixel_format,
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }
}

fn negotiate_format(
    device: &v4l::Device,
    device_path: &str,
    width: u32,
    height: u32,
) -> Result<v4l::Format> {
    use v4l::video::Capture;

    let mut wanted = device.format().context("read v4l2 format")?;
    wanted.width = width;
    wanted.height = height;

    for fourcc in [b"RGB3", b"YUYV"] {
        wanted.fourcc = v4l::FourCC::new(fourcc);
        match device.set_format(&wanted) {
            Ok(actual) if PixelFormat::from_fourcc(&actual.fourcc.repr).is_some() => {
                return Ok(actual)
            }
            Ok(actual) => log::debug!(
                "V4l2Session: {} answered {} when asked for {}",
                device_path,
                actual.fourcc,
                wanted.fourcc
            ),
            Err(err) => log::warn!(
                "V4l2Session: failed to set format on {}: {}",
                device_path,
                err
            ),
        }
    }

    device
        .format()
        .context("read v4l2 format after set failure")
}

impl CaptureSession for V4l2Session {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let (format, width, height) = (self.format, self.width, self.height);
        let image = state.with_mut(|fields| -> Result<RgbImage> {
            let (buf, _meta) = fields
                .stream
                .next()
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
            normalize_to_rgb(buf, width, height, format)
        })?;
        self.frame_count += 1;
        Ok(Some(image))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Session: released {} after {} frames",
                self.device,
                self.frame_count
            );
        }
    }

    fn describe(&self) -> String {
        format!("USB camera {}", self.device)
    }
}

impl Drop for V4l2Session {
    fn drop(&mut self) {
        self.release();
    }
}
