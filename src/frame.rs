//! Captured frames.
//!
//! A `Frame` is owned by exactly one loop iteration: it is captured, maybe
//! annotated in place by the cascade, presented, and dropped. Crops are copied
//! out for mite inference and written back after annotation.

use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};
use std::time::Instant;

use crate::geometry::CropRegion;

/// RGB frame plus its capture sequence number.
pub struct Frame {
    image: RgbImage,
    /// Monotonic capture counter, 1-based, never reset by reconnects.
    pub seq: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a captured image. Called by the acquisition layer.
    pub fn new(image: RgbImage, seq: u64) -> Self {
        Self {
            image,
            seq,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Time since capture, for latency logging.
    pub fn age_ms(&self) -> f64 {
        self.captured_at.elapsed().as_secs_f64() * 1000.0
    }

    /// Copy the crop region out of the frame. `None` for an empty region.
    pub fn crop(&self, region: &CropRegion) -> Option<RgbImage> {
        if region.is_empty() || region.x2 > self.width() || region.y2 > self.height() {
            return None;
        }
        Some(
            imageops::crop_imm(
                &self.image,
                region.x1,
                region.y1,
                region.width(),
                region.height(),
            )
            .to_image(),
        )
    }

    /// Write an (annotated) crop back at the region's location.
    pub fn write_back(&mut self, region: &CropRegion, crop: &RgbImage) -> Result<()> {
        if crop.width() != region.width() || crop.height() != region.height() {
            return Err(anyhow!(
                "crop size {}x{} does not match region {}x{}",
                crop.width(),
                crop.height(),
                region.width(),
                region.height()
            ));
        }
        if region.x2 > self.width() || region.y2 > self.height() {
            return Err(anyhow!(
                "region {:?} exceeds frame {}x{}",
                region,
                self.width(),
                self.height()
            ));
        }
        imageops::replace(
            &mut self.image,
            crop,
            i64::from(region.x1),
            i64::from(region.y1),
        );
        Ok(())
    }
}
