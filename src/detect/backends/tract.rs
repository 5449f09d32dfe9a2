#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{decode_yolo, non_max_suppression, DEFAULT_IOU_THRESHOLD};
use crate::detect::result::{DetectionSet, ObjectClass};

/// Lowest score decoded from the model; the cascade applies the real threshold.
const SCORE_FLOOR: f32 = 0.05;

/// Tract-based backend for single-class YOLO ONNX exports.
///
/// Images of any size are stretched to the square model input and boxes are
/// scaled back to the source image. The model is loaded from a local file;
/// no network I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    class: ObjectClass,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, class: ObjectClass, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            class,
            input_size,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let side = self.input_size;
        let resized = imageops::resize(image, side, side, imageops::FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, side as usize, side as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class(&self) -> ObjectClass {
        self.class
    }

    fn detect(&mut self, image: &RgbImage) -> Result<DetectionSet> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(DetectionSet::empty());
        }
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let values: Vec<f32> = view.iter().copied().collect();
        let decoded = decode_yolo(
            &values,
            &shape,
            self.class,
            SCORE_FLOOR,
            self.input_size,
            image.width(),
            image.height(),
        )?;
        Ok(non_max_suppression(decoded, DEFAULT_IOU_THRESHOLD))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank).map(|_| ())
    }
}
