//! Box and label drawing for display output.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::ObjectClass;
use crate::geometry::PixelBox;

pub const BEE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const MITE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 16.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub bbox: PixelBox,
    pub label: Option<String>,
    pub color: Rgb<u8>,
}

impl Annotation {
    /// Styled annotation for a detection of `class`.
    pub fn for_detection(bbox: PixelBox, class: ObjectClass, confidence: f32) -> Self {
        let (color, label) = match class {
            ObjectClass::Varroa => (MITE_COLOR, format!("Varroa ({:.2})", confidence)),
            ObjectClass::Bee => (BEE_COLOR, format!("bee {:.2}", confidence)),
        };
        Self {
            bbox,
            label: Some(label),
            color,
        }
    }
}

pub trait Annotator {
    /// Draw `annotation` onto `image`. Boxes partly outside the image are
    /// clipped; empty boxes draw nothing.
    fn draw(&self, image: &mut RgbImage, annotation: &Annotation);
}

/// Hollow rectangles, plus text labels when a font was loaded.
#[derive(Default)]
pub struct BoxAnnotator {
    font: Option<FontVec>,
}

impl BoxAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TTF/OTF file for labels.
    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read label font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|err| anyhow!("invalid label font {}: {}", path.display(), err))?;
        Ok(Self { font: Some(font) })
    }
}

impl Annotator for BoxAnnotator {
    fn draw(&self, image: &mut RgbImage, annotation: &Annotation) {
        let Some(bbox) = clip_to_image(&annotation.bbox, image.width(), image.height()) else {
            return;
        };
        for offset in 0..BOX_THICKNESS {
            let width = bbox.width() - 2 * offset;
            let height = bbox.height() - 2 * offset;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(bbox.x1 + offset, bbox.y1 + offset).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(image, rect, annotation.color);
        }

        if let (Some(font), Some(label)) = (&self.font, &annotation.label) {
            if bbox.width() > 0 && bbox.height() > 0 {
                let y = (bbox.y1 - LABEL_SCALE as i32 - 2).max(0);
                draw_text_mut(
                    image,
                    annotation.color,
                    bbox.x1.max(0),
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    label,
                );
            }
        }
    }
}

/// Clamp `bbox` to the image plus a `BOX_THICKNESS` margin, so edges that lie
/// outside the image stay outside and line lengths are bounded by the image.
/// `None` when the box does not touch the image.
fn clip_to_image(bbox: &PixelBox, width: u32, height: u32) -> Option<PixelBox> {
    let width = i32::try_from(width).unwrap_or(i32::MAX);
    let height = i32::try_from(height).unwrap_or(i32::MAX);
    if bbox.x2 <= 0 || bbox.y2 <= 0 || bbox.x1 >= width || bbox.y1 >= height {
        return None;
    }
    let (lo_x, hi_x) = (-BOX_THICKNESS, width.saturating_add(BOX_THICKNESS));
    let (lo_y, hi_y) = (-BOX_THICKNESS, height.saturating_add(BOX_THICKNESS));
    Some(PixelBox::new(
        bbox.x1.clamp(lo_x, hi_x),
        bbox.y1.clamp(lo_y, hi_y),
        bbox.x2.clamp(lo_x, hi_x),
        bbox.y2.clamp(lo_y, hi_y),
    ))
}
