use crate::geometry::BoundingBox;

/// What a detector instance looks for.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Bee,
    Varroa,
}

impl ObjectClass {
    /// Label drawn next to the box.
    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Bee => "bee",
            ObjectClass::Varroa => "Varroa",
        }
    }
}

/// One detector hit, in pixel coordinates of the image it was produced from.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    bbox: BoundingBox,
    confidence: f32,
    class: ObjectClass,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class: ObjectClass) -> Self {
        Self {
            bbox,
            confidence,
            class,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn class(&self) -> ObjectClass {
        self.class
    }
}

/// Ordered set of detections.
///
/// "Nothing found" is a zero-length set, never an absent value, so the
/// annotator and counters never special-case it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    /// Keep detections with `confidence >= threshold` (inclusive), preserving order.
    pub fn filter_by_confidence(&self, threshold: f32) -> DetectionSet {
        self.iter()
            .filter(|d| d.confidence >= threshold)
            .cloned()
            .collect()
    }
}

impl From<Vec<Detection>> for DetectionSet {
    fn from(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self {
            detections: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DetectionSet {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.into_iter()
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(confidence: f32) -> Detection {
        Detection::new(
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            confidence,
            ObjectClass::Bee,
        )
    }

    #[test]
    fn filter_keeps_exactly_detections_at_or_above_threshold() {
        let set: DetectionSet = [0.1, 0.25, 0.24999, 0.9, 0.4, 1.0]
            .into_iter()
            .map(hit)
            .collect();
        for threshold in [0.01_f32, 0.25, 0.4, 0.5, 1.0] {
            let kept = set.filter_by_confidence(threshold);
            let expected: Vec<f32> = set
                .iter()
                .map(Detection::confidence)
                .filter(|c| *c >= threshold)
                .collect();
            let got: Vec<f32> = kept.iter().map(Detection::confidence).collect();
            assert_eq!(got, expected, "threshold {threshold}");
        }
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let set: DetectionSet = vec![hit(0.25)].into();
        assert_eq!(set.filter_by_confidence(0.25).len(), 1);
    }

    #[test]
    fn filtering_empty_set_gives_empty_set() {
        let set = DetectionSet::empty();
        let kept = set.filter_by_confidence(0.25);
        assert!(kept.is_empty());
        assert_eq!(kept, DetectionSet::empty());
    }
}
