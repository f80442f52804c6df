use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::errors::{RipenessError, Result};
use crate::preprocess::ScaleFactors;

/// Axis-aligned rectangle in pixel space, `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(RipenessError::validation(
                "bounding box",
                format!("has non-finite coordinates [{x1}, {y1}, {x2}, {y2}]"),
            ));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(RipenessError::validation(
                "bounding box",
                format!("is degenerate [{x1}, {y1}, {x2}, {y2}]"),
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub const fn corners(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Map into another resolution. Scale factors are positive, so ordering is preserved.
    pub fn rescale(&self, factors: ScaleFactors) -> Result<Self> {
        Self::new(
            self.x1 * factors.x,
            self.y1 * factors.y,
            self.x2 * factors.x,
            self.y2 * factors.y,
        )
    }
}

/// One detected banana region. Immutable once produced by a detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionBox {
    coordinates: BoundingBox,
    confidence: f32,
    class_index: usize,
}

impl DetectionBox {
    pub fn new(coordinates: BoundingBox, confidence: f32, class_index: usize) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RipenessError::validation(
                "confidence",
                format!("{confidence} is outside [0, 1]"),
            ));
        }
        Ok(Self {
            coordinates,
            confidence,
            class_index,
        })
    }

    pub const fn coordinates(&self) -> &BoundingBox {
        &self.coordinates
    }

    pub const fn confidence(&self) -> f32 {
        self.confidence
    }

    pub const fn class_index(&self) -> usize {
        self.class_index
    }

    pub fn rescale(&self, factors: ScaleFactors) -> Result<Self> {
        Ok(Self {
            coordinates: self.coordinates.rescale(factors)?,
            ..*self
        })
    }
}

/// Wire shape: `{ "box": [x1, y1, x2, y2], "score": f, "class_id": n }`.
impl Serialize for DetectionBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DetectionBox", 3)?;
        state.serialize_field("box", &self.coordinates.corners())?;
        state.serialize_field("score", &self.confidence)?;
        state.serialize_field("class_id", &self.class_index)?;
        state.end()
    }
}
