use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::class_mapping::{ClassMapping, UNKNOWN_LABEL};
use crate::detection::DetectionBox;
use crate::shelf_life::shelf_life_for;

/// Per-label detection counts, kept in the order each label was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCounts {
    entries: Vec<(String, usize)>,
}

impl LabelCounts {
    fn increment(&mut self, label: &str) {
        match self.entries.iter_mut().find(|(known, _)| known == label) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((label.to_string(), 1)),
        }
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(known, _)| known == label)
            .map(|(_, count)| *count)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
    }

    /// Label with the highest count. Ties go to the label seen first, because the fold only
    /// replaces the current best on a strictly greater count.
    pub fn dominant(&self) -> Option<&str> {
        self.entries
            .iter()
            .fold(None, |best: Option<(&str, usize)>, (label, count)| match best {
                Some((_, best_count)) if *count <= best_count => best,
                _ => Some((label.as_str(), *count)),
            })
            .map(|(label, _)| label)
    }
}

impl Serialize for LabelCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

/// Ripeness statistics for the detections of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipenessTally {
    counts: LabelCounts,
}

impl RipenessTally {
    /// Resolve each detection's class through `mapping` and count labels. Unmapped class
    /// indices are counted as `"Unknown"`.
    pub fn from_detections(detections: &[DetectionBox], mapping: &ClassMapping) -> Self {
        let mut counts = LabelCounts::default();
        for detection in detections {
            counts.increment(mapping.resolve(detection.class_index()));
        }
        Self { counts }
    }

    pub const fn counts(&self) -> &LabelCounts {
        &self.counts
    }

    pub fn into_counts(self) -> LabelCounts {
        self.counts
    }

    pub fn dominant(&self) -> Option<&str> {
        self.counts.dominant()
    }

    /// Shelf life of the dominant label; `"Unknown"` with no detections.
    pub fn shelf_life(&self) -> &'static str {
        self.dominant().map_or(UNKNOWN_LABEL, shelf_life_for)
    }
}
