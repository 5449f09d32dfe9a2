//! Box geometry for the bee -> mite cascade.
//!
//! Detectors report `BoundingBox`es in floating-point pixel coordinates of the
//! image they were given. The cascade truncates those to integer `PixelBox`es
//! before cropping so that the crop-local -> frame remap is exact integer
//! arithmetic: `frame = local + (x1p, y1p)` and `local = frame - (x1p, y1p)`.

/// Axis-aligned box `(x1, y1, x2, y2)` as produced by a detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a box from YOLO-style centre/size coordinates.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Truncate to integer pixels (toward zero, NaN maps to 0).
    pub fn to_pixels(&self) -> PixelBox {
        PixelBox {
            x1: self.x1 as i32,
            y1: self.y1 as i32,
            x2: self.x2 as i32,
            y2: self.y2 as i32,
        }
    }
}

/// Integer pixel box. Coordinates may lie outside the image they refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x1: self.x1.saturating_add(dx),
            y1: self.y1.saturating_add(dy),
            x2: self.x2.saturating_add(dx),
            y2: self.y2.saturating_add(dy),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }
}

/// Padded, clamped rectangle of the frame that is handed to the mite detector.
///
/// Always satisfies `0 <= x1 <= x2 <= frame_width` and
/// `0 <= y1 <= y2 <= frame_height`. May be empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Crop-local box -> frame box.
    pub fn to_frame(&self, local: &PixelBox) -> PixelBox {
        local.translate(self.x1 as i32, self.y1 as i32)
    }

    /// Frame box -> crop-local box. Inverse of [`CropRegion::to_frame`].
    pub fn to_local(&self, framed: &PixelBox) -> PixelBox {
        framed.translate(-(self.x1 as i32), -(self.y1 as i32))
    }
}

/// Expand `bbox` by `padding` on every side and clamp to a `width` x `height`
/// frame.
pub fn crop_region(bbox: &PixelBox, padding: u32, width: u32, height: u32) -> CropRegion {
    let (x1, x2) = clamp_span(bbox.x1, bbox.x2, padding, width);
    let (y1, y2) = clamp_span(bbox.y1, bbox.y2, padding, height);
    CropRegion { x1, y1, x2, y2 }
}

fn clamp_span(lo: i32, hi: i32, padding: u32, limit: u32) -> (u32, u32) {
    let padding = i64::from(padding);
    let limit = i64::from(limit);
    let start = (i64::from(lo) - padding).clamp(0, limit);
    let end = (i64::from(hi) + padding).clamp(start, limit);
    (start as u32, end as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_within(region: &CropRegion, width: u32, height: u32) {
        assert!(region.x1 <= region.x2 && region.x2 <= width, "{region:?}");
        assert!(region.y1 <= region.y2 && region.y2 <= height, "{region:?}");
    }

    #[test]
    fn padding_expands_inside_frame() {
        let region = crop_region(&PixelBox::new(100, 100, 140, 150), 20, 640, 480);
        assert_eq!(
            region,
            CropRegion {
                x1: 80,
                y1: 80,
                x2: 160,
                y2: 170
            }
        );
    }

    #[test]
    fn padding_clamps_at_frame_edges() {
        let region = crop_region(&PixelBox::new(5, 460, 630, 480), 150, 640, 480);
        assert_eq!(region.x1, 0);
        assert_eq!(region.y1, 310);
        assert_eq!(region.x2, 640);
        assert_eq!(region.y2, 480);
    }

    #[test]
    fn crop_stays_in_bounds_for_hostile_boxes() {
        let boxes = [
            PixelBox::new(0, 0, 0, 0),
            PixelBox::new(-50, -50, -10, -10),
            PixelBox::new(700, 500, 900, 900),
            PixelBox::new(300, 200, 100, 50),
            PixelBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX),
            PixelBox::new(639, 479, 640, 480),
        ];
        for padding in [0, 1, 10, 20, 150, u32::MAX] {
            for bbox in &boxes {
                let region = crop_region(bbox, padding, 640, 480);
                assert_within(&region, 640, 480);
            }
        }
    }

    #[test]
    fn box_outside_frame_degenerates_to_empty() {
        let region = crop_region(&PixelBox::new(700, 10, 720, 30), 10, 640, 480);
        assert!(region.is_empty());
        assert_eq!(region.x1, 640);
        assert_eq!(region.x2, 640);
    }

    #[test]
    fn zero_sized_frame_gives_empty_region() {
        let region = crop_region(&PixelBox::new(1, 1, 5, 5), 10, 0, 0);
        assert!(region.is_empty());
    }

    #[test]
    fn remap_adds_crop_offset_to_both_corners() {
        let region = CropRegion {
            x1: 130,
            y1: 45,
            x2: 400,
            y2: 300,
        };
        let local = PixelBox::new(12, 7, 30, 21);
        assert_eq!(region.to_frame(&local), PixelBox::new(142, 52, 160, 66));
    }

    #[test]
    fn remap_round_trip_is_exact() {
        let regions = [
            CropRegion {
                x1: 0,
                y1: 0,
                x2: 10,
                y2: 10,
            },
            CropRegion {
                x1: 1919,
                y1: 1079,
                x2: 1920,
                y2: 1080,
            },
            CropRegion {
                x1: 37,
                y1: 211,
                x2: 400,
                y2: 500,
            },
        ];
        let locals = [
            PixelBox::new(0, 0, 0, 0),
            PixelBox::new(3, 9, 27, 81),
            PixelBox::new(-4, -2, 5, 6),
        ];
        for region in &regions {
            for local in &locals {
                assert_eq!(region.to_local(&region.to_frame(local)), *local);
            }
        }
    }

    #[test]
    fn truncation_matches_integer_cast() {
        let b = BoundingBox::new(10.9, 20.1, 30.99, -0.5);
        assert_eq!(b.to_pixels(), PixelBox::new(10, 20, 30, 0));
        let nan = BoundingBox::new(f32::NAN, 1.0, 2.0, 3.0);
        assert_eq!(nan.to_pixels().x1, 0);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }
}
