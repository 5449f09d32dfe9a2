//! Two-stage cascade: bee detection on the full frame, mite detection on a
//! padded crop around each bee, mite boxes remapped back to frame space.
//!
//! Crops are processed one bee at a time against the frame as it stands, so
//! a later crop that overlaps an earlier one writes its own pixels (which
//! already include the earlier annotations) back over the shared area.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::annotate::{Annotation, Annotator, BoxAnnotator};
use crate::detect::{Detection, DetectionSet, DetectorBackend, ObjectClass};
use crate::frame::Frame;
use crate::geometry::{crop_region, CropRegion, PixelBox};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeSettings {
    /// Applied to both stages. Inclusive.
    pub confidence_threshold: f32,
    /// Pixels added on every side of a bee box before cropping.
    pub crop_padding: u32,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            crop_padding: 150,
        }
    }
}

/// A mite found in a bee crop, in both coordinate spaces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemappedMite {
    pub region: CropRegion,
    pub local: PixelBox,
    pub frame_box: PixelBox,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CascadeTimings {
    pub bee: Duration,
    /// Summed over every crop.
    pub mite: Duration,
    /// Crops actually handed to the mite detector.
    pub crops: usize,
}

#[derive(Clone, Debug, Default)]
pub struct CascadeOutcome {
    /// Bees at or above the threshold.
    pub bees: DetectionSet,
    pub mites: Vec<RemappedMite>,
    pub timings: CascadeTimings,
}

impl CascadeOutcome {
    pub fn bee_count(&self) -> usize {
        self.bees.len()
    }

    pub fn mite_count(&self) -> usize {
        self.mites.len()
    }
}

pub struct CascadePipeline {
    bee_detector: Box<dyn DetectorBackend>,
    mite_detector: Box<dyn DetectorBackend>,
    annotator: Box<dyn Annotator>,
    settings: CascadeSettings,
}

impl CascadePipeline {
    pub fn new(
        bee_detector: Box<dyn DetectorBackend>,
        mite_detector: Box<dyn DetectorBackend>,
        settings: CascadeSettings,
    ) -> Self {
        Self {
            bee_detector,
            mite_detector,
            annotator: Box::new(BoxAnnotator::new()),
            settings,
        }
    }

    pub fn with_annotator(mut self, annotator: Box<dyn Annotator>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn settings(&self) -> &CascadeSettings {
        &self.settings
    }

    /// Run both stages on `frame` and annotate it in place.
    ///
    /// A bee detector failure fails the whole frame. A mite detector failure
    /// counts as zero mites for that crop.
    pub fn process(&mut self, frame: &mut Frame) -> Result<CascadeOutcome> {
        let threshold = self.settings.confidence_threshold;
        let mut timings = CascadeTimings::default();

        let started = Instant::now();
        let bees = self
            .bee_detector
            .detect(frame.image())
            .with_context(|| format!("bee detection on frame {}", frame.seq))?
            .filter_by_confidence(threshold);
        timings.bee = started.elapsed();

        let mut mites = Vec::new();
        for bee in &bees {
            self.inspect_bee(frame, bee, &mut mites, &mut timings)?;
        }

        for bee in &bees {
            let annotation =
                Annotation::for_detection(bee.bbox().to_pixels(), ObjectClass::Bee, bee.confidence());
            self.annotator.draw(frame.image_mut(), &annotation);
        }

        log::debug!(
            "frame {}: bee inference {:.1} ms, mite inference {:.1} ms over {} crops",
            frame.seq,
            timings.bee.as_secs_f64() * 1000.0,
            timings.mite.as_secs_f64() * 1000.0,
            timings.crops
        );

        Ok(CascadeOutcome {
            bees,
            mites,
            timings,
        })
    }

    fn inspect_bee(
        &mut self,
        frame: &mut Frame,
        bee: &Detection,
        mites: &mut Vec<RemappedMite>,
        timings: &mut CascadeTimings,
    ) -> Result<()> {
        let threshold = self.settings.confidence_threshold;
        let region = crop_region(
            &bee.bbox().to_pixels(),
            self.settings.crop_padding,
            frame.width(),
            frame.height(),
        );
        let Some(mut crop) = frame.crop(&region) else {
            log::debug!("frame {}: empty crop {:?}, mite detection skipped", frame.seq, region);
            return Ok(());
        };

        let started = Instant::now();
        let found = match self.mite_detector.detect(&crop) {
            Ok(found) => found.filter_by_confidence(threshold),
            Err(err) => {
                log::warn!(
                    "frame {}: mite detection failed for crop {:?}: {:#}",
                    frame.seq,
                    region,
                    err
                );
                DetectionSet::empty()
            }
        };
        let elapsed = started.elapsed();
        timings.mite += elapsed;
        timings.crops += 1;
        log::debug!(
            "frame {}: mite inference {:.1} ms on bee crop [{}:{}, {}:{}], {} found",
            frame.seq,
            elapsed.as_secs_f64() * 1000.0,
            region.x1,
            region.x2,
            region.y1,
            region.y2,
            found.len()
        );

        for mite in &found {
            let local = mite.bbox().to_pixels();
            let frame_box = region.to_frame(&local);
            log::info!(
                "frame {}: Varroa at ({}, {})-({}, {}) in bee crop [{}:{}, {}:{}] conf {:.2}",
                frame.seq,
                frame_box.x1,
                frame_box.y1,
                frame_box.x2,
                frame_box.y2,
                region.x1,
                region.x2,
                region.y1,
                region.y2,
                mite.confidence()
            );
            let annotation = Annotation::for_detection(local, ObjectClass::Varroa, mite.confidence());
            self.annotator.draw(&mut crop, &annotation);
            mites.push(RemappedMite {
                region,
                local,
                frame_box,
                confidence: mite.confidence(),
            });
        }

        frame
            .write_back(&region, &crop)
            .with_context(|| format!("write annotated crop back into frame {}", frame.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{BEE_COLOR, MITE_COLOR};
    use crate::detect::{StubBackend, StubProbe};
    use crate::geometry::BoundingBox;
    use image::{Rgb, RgbImage};

    const BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, BACKGROUND), 1)
    }

    fn bees(boxes: &[(f32, f32, f32, f32, f32)]) -> DetectionSet {
        boxes
            .iter()
            .map(|&(x1, y1, x2, y2, conf)| {
                Detection::new(BoundingBox::new(x1, y1, x2, y2), conf, ObjectClass::Bee)
            })
            .collect()
    }

    fn mites(boxes: &[(f32, f32, f32, f32, f32)]) -> DetectionSet {
        boxes
            .iter()
            .map(|&(x1, y1, x2, y2, conf)| {
                Detection::new(BoundingBox::new(x1, y1, x2, y2), conf, ObjectClass::Varroa)
            })
            .collect()
    }

    fn pipeline(
        bee_set: DetectionSet,
        mite_set: DetectionSet,
        padding: u32,
    ) -> (CascadePipeline, StubProbe, StubProbe) {
        let bee = StubBackend::new(ObjectClass::Bee).with_detections(bee_set);
        let mite = StubBackend::new(ObjectClass::Varroa).with_detections(mite_set);
        let (bee_probe, mite_probe) = (bee.probe(), mite.probe());
        let settings = CascadeSettings {
            confidence_threshold: 0.25,
            crop_padding: padding,
        };
        (
            CascadePipeline::new(Box::new(bee), Box::new(mite), settings),
            bee_probe,
            mite_probe,
        )
    }

    #[test]
    fn no_bees_means_no_crops_and_untouched_frame() -> Result<()> {
        let (mut cascade, bee_probe, mite_probe) =
            pipeline(DetectionSet::empty(), mites(&[(0.0, 0.0, 4.0, 4.0, 0.9)]), 20);
        let mut frame = frame(64, 48);

        let outcome = cascade.process(&mut frame)?;

        assert_eq!((outcome.bee_count(), outcome.mite_count()), (0, 0));
        assert_eq!(bee_probe.calls(), 1);
        assert_eq!(mite_probe.calls(), 0);
        assert!(frame.image().pixels().all(|p| *p == BACKGROUND));
        Ok(())
    }

    #[test]
    fn mites_are_remapped_by_crop_offset() -> Result<()> {
        let (mut cascade, _, mite_probe) = pipeline(
            bees(&[(100.0, 100.0, 140.0, 140.0, 0.9)]),
            mites(&[(10.0, 12.0, 20.0, 22.0, 0.8)]),
            20,
        );
        let mut frame = frame(640, 480);

        let outcome = cascade.process(&mut frame)?;

        assert_eq!(mite_probe.image_sizes(), vec![(80, 80)]);
        assert_eq!(outcome.mite_count(), 1);
        let mite = outcome.mites[0];
        assert_eq!(
            mite.region,
            CropRegion {
                x1: 80,
                y1: 80,
                x2: 160,
                y2: 160
            }
        );
        assert_eq!(mite.frame_box, PixelBox::new(90, 92, 100, 102));
        assert_eq!(mite.region.to_local(&mite.frame_box), mite.local);
        Ok(())
    }

    #[test]
    fn annotations_land_in_frame_space() -> Result<()> {
        let (mut cascade, _, _) = pipeline(
            bees(&[(100.0, 100.0, 140.0, 140.0, 0.9)]),
            mites(&[(10.0, 12.0, 20.0, 22.0, 0.8)]),
            20,
        );
        let mut frame = frame(640, 480);

        cascade.process(&mut frame)?;

        assert_eq!(*frame.image().get_pixel(90, 92), MITE_COLOR);
        assert_eq!(*frame.image().get_pixel(100, 100), BEE_COLOR);
        assert_eq!(*frame.image().get_pixel(300, 300), BACKGROUND);
        Ok(())
    }

    #[test]
    fn threshold_is_inclusive_for_both_stages() -> Result<()> {
        let (mut cascade, _, mite_probe) = pipeline(
            bees(&[
                (10.0, 10.0, 20.0, 20.0, 0.25),
                (40.0, 40.0, 50.0, 50.0, 0.2499),
            ]),
            mites(&[(1.0, 1.0, 2.0, 2.0, 0.25), (3.0, 3.0, 4.0, 4.0, 0.1)]),
            5,
        );
        let mut frame = frame(100, 100);

        let outcome = cascade.process(&mut frame)?;

        assert_eq!(outcome.bee_count(), 1);
        assert_eq!(mite_probe.calls(), 1);
        assert_eq!(outcome.mite_count(), 1);
        Ok(())
    }

    #[test]
    fn each_bee_gets_its_own_crop() -> Result<()> {
        let (mut cascade, _, mite_probe) = pipeline(
            bees(&[
                (0.0, 0.0, 10.0, 10.0, 0.9),
                (150.0, 50.0, 190.0, 90.0, 0.9),
            ]),
            mites(&[(1.0, 1.0, 3.0, 3.0, 0.5)]),
            150,
        );
        let mut frame = frame(200, 100);

        let outcome = cascade.process(&mut frame)?;

        // both crops clamp to the frame edges
        assert_eq!(mite_probe.image_sizes(), vec![(160, 100), (200, 100)]);
        assert_eq!(outcome.mite_count(), 2);
        assert_eq!(outcome.timings.crops, 2);
        Ok(())
    }

    #[test]
    fn empty_crop_skips_mite_detection() -> Result<()> {
        let (mut cascade, _, mite_probe) = pipeline(
            bees(&[(300.0, 300.0, 320.0, 320.0, 0.9)]),
            mites(&[(1.0, 1.0, 3.0, 3.0, 0.5)]),
            0,
        );
        let mut frame = frame(100, 100);

        let outcome = cascade.process(&mut frame)?;

        assert_eq!(outcome.bee_count(), 1);
        assert_eq!(outcome.mite_count(), 0);
        assert_eq!(mite_probe.calls(), 0);
        Ok(())
    }

    #[test]
    fn mite_failure_counts_zero_mites() -> Result<()> {
        let bee = StubBackend::new(ObjectClass::Bee)
            .with_detections(bees(&[(10.0, 10.0, 30.0, 30.0, 0.9)]));
        let mite = StubBackend::new(ObjectClass::Varroa).failing("bad tensor");
        let mut cascade =
            CascadePipeline::new(Box::new(bee), Box::new(mite), CascadeSettings::default());
        let mut frame = frame(64, 64);

        let outcome = cascade.process(&mut frame)?;

        assert_eq!((outcome.bee_count(), outcome.mite_count()), (1, 0));
        Ok(())
    }

    #[test]
    fn later_overlapping_crop_keeps_earlier_mite_marks() -> Result<()> {
        // crops (5,5)-(25,25) and (9,9)-(29,29); the first mite lands at
        // (13,13), inside the second crop
        let (mut cascade, _, mite_probe) = pipeline(
            bees(&[
                (10.0, 10.0, 20.0, 20.0, 0.9),
                (14.0, 14.0, 24.0, 24.0, 0.9),
            ]),
            mites(&[(8.0, 8.0, 10.0, 10.0, 0.7)]),
            5,
        );
        let mut frame = frame(64, 48);

        let outcome = cascade.process(&mut frame)?;

        assert_eq!(mite_probe.calls(), 2);
        assert_eq!(outcome.mite_count(), 2);
        assert_eq!(outcome.mites[0].frame_box, PixelBox::new(13, 13, 15, 15));
        assert_eq!(outcome.mites[1].frame_box, PixelBox::new(17, 17, 19, 19));
        assert_eq!(*frame.image().get_pixel(13, 13), MITE_COLOR);
        assert_eq!(*frame.image().get_pixel(17, 17), MITE_COLOR);
        Ok(())
    }

    struct NoMarks;

    impl Annotator for NoMarks {
        fn draw(&self, _image: &mut RgbImage, _annotation: &Annotation) {}
    }

    #[test]
    fn crop_without_mites_is_written_back_unchanged() -> Result<()> {
        let (cascade, _, mite_probe) = pipeline(
            bees(&[(20.0, 10.0, 40.0, 30.0, 0.9)]),
            DetectionSet::empty(),
            8,
        );
        let mut cascade = cascade.with_annotator(Box::new(NoMarks));
        let original = RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]));
        let mut frame = Frame::new(original.clone(), 1);

        let outcome = cascade.process(&mut frame)?;

        assert_eq!(mite_probe.image_sizes(), vec![(36, 36)]);
        assert_eq!(outcome.mite_count(), 0);
        assert_eq!(frame.image().as_raw(), original.as_raw());
        Ok(())
    }

    #[test]
    fn out_of_frame_bee_box_is_processed_promptly() -> Result<()> {
        let (mut cascade, _, mite_probe) = pipeline(
            bees(&[(0.0, 0.0, 1e10, 1e10, 0.9)]),
            DetectionSet::empty(),
            20,
        );
        let mut frame = frame(64, 48);
        let started = Instant::now();

        let outcome = cascade.process(&mut frame)?;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.bee_count(), 1);
        assert_eq!(mite_probe.image_sizes(), vec![(64, 48)]);
        assert_eq!(*frame.image().get_pixel(0, 10), BEE_COLOR);
        assert_eq!(*frame.image().get_pixel(32, 24), BACKGROUND);
        Ok(())
    }

    #[test]
    fn bee_failure_fails_the_frame() {
        let bee = StubBackend::new(ObjectClass::Bee).failing("model gone");
        let mite = StubBackend::new(ObjectClass::Varroa);
        let mite_probe = mite.probe();
        let mut cascade =
            CascadePipeline::new(Box::new(bee), Box::new(mite), CascadeSettings::default());

        assert!(cascade.process(&mut frame(32, 32)).is_err());
        assert_eq!(mite_probe.calls(), 0);
    }
}
