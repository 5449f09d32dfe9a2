//! Video file playback using FFmpeg.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};

pub(crate) struct FfmpegFileSession {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    /// EOF has been sent; the decoder only hands out buffered frames.
    draining: bool,
    loops: u64,
}

impl FfmpegFileSession {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("{} has no video track", path.display()))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FfmpegFileSession: {} ({}x{})",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            scaler,
            draining: false,
            loops: 0,
        })
    }

    /// Next decoded frame. Rewinds once at end of file; `None` if the file
    /// yields nothing even after rewinding.
    pub(crate) fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(image) = self.decode_next()? {
            return Ok(Some(image));
        }
        self.rewind()?;
        self.decode_next()
    }

    fn decode_next(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return convert(&mut self.scaler, &decoded, &mut rgb_frame).map(Some);
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;

            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return convert(&mut self.scaler, &decoded, &mut rgb_frame).map(Some);
            }
        }

        if !self.draining {
            self.decoder
                .send_eof()
                .context("signal end of stream to ffmpeg decoder")?;
            self.draining = true;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return convert(&mut self.scaler, &decoded, &mut rgb_frame).map(Some);
            }
        }

        Ok(None)
    }

    fn rewind(&mut self) -> Result<()> {
        self.input
            .seek(0, ..)
            .with_context(|| format!("rewind {}", self.path.display()))?;
        self.decoder.flush();
        self.draining = false;
        self.loops += 1;
        log::info!(
            "FfmpegFileSession: {} reached end, looping (pass {})",
            self.path.display(),
            self.loops + 1
        );
        Ok(())
    }
}

fn convert(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::frame::Video,
    rgb_frame: &mut ffmpeg::frame::Video,
) -> Result<RgbImage> {
    scaler
        .run(decoded, rgb_frame)
        .context("scale frame to RGB")?;
    frame_to_image(rgb_frame)
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    RgbImage::from_raw(width, height, pixels).context("ffmpeg frame size mismatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    /// Encode a short clip with B-frames so the decoder holds frames back
    /// until end of stream. `None` when no ffmpeg CLI is installed.
    fn encode_clip(path: &Path, frames: u32) -> Option<()> {
        let count = frames.to_string();
        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i"])
            .arg("testsrc=size=64x48:rate=10")
            .args(["-frames:v", count.as_str(), "-c:v", "mpeg4", "-bf", "2"])
            .arg(path)
            .status()
            .ok()?;
        status.success().then_some(())
    }

    #[test]
    fn every_frame_is_played_before_looping() -> Result<()> {
        const FRAMES: u32 = 12;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("entrance.mp4");
        if encode_clip(&path, FRAMES).is_none() {
            log::warn!("ffmpeg CLI unavailable, clip playback not exercised");
            return Ok(());
        }

        let mut session = FfmpegFileSession::open(&path)?;
        for _ in 0..FRAMES {
            let image = session.next_frame()?.context("frame before end of clip")?;
            assert_eq!(image.dimensions(), (64, 48));
        }
        assert_eq!(session.loops, 0);

        assert!(session.next_frame()?.is_some());
        assert_eq!(session.loops, 1);
        Ok(())
    }
}
