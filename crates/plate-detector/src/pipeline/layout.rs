//! Output tensor layout descriptor.
//!
//! Detector exports disagree on how the output tensor is arranged. A model
//! ships with an explicit [`OutputLayout`]; every field also has an `Auto`
//! setting that guesses from the data. The guesses are best-effort only.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Anchor counts produced by common YOLO heads (320..1280 input sizes).
pub const KNOWN_ANCHOR_COUNTS: [usize; 5] = [2100, 6300, 8400, 25200, 33600];

/// Index of the confidence (or objectness) value within a detection
pub const CONFIDENCE_INDEX: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Auto,
    /// `[detections, values]`
    DetectionsMajor,
    /// `[values, detections]`
    ValuesMajor,
}

impl Orientation {
    /// Resolve from the shape of a squeezed 2-D output `[rows, cols]`.
    ///
    /// `Auto` takes a known anchor count as the detection axis and never reads
    /// an axis shorter than five as the value axis. `None` means the shape
    /// alone does not decide; the decoder then looks at the values.
    pub fn resolve(self, rows: usize, cols: usize) -> Option<Orientation> {
        match self {
            Orientation::Auto => {
                if KNOWN_ANCHOR_COUNTS.contains(&cols) {
                    return Some(Orientation::ValuesMajor);
                }
                if KNOWN_ANCHOR_COUNTS.contains(&rows) {
                    return Some(Orientation::DetectionsMajor);
                }
                let fits_values = |len: usize| len > CONFIDENCE_INDEX;
                match (fits_values(rows), fits_values(cols)) {
                    (true, false) => Some(Orientation::ValuesMajor),
                    (false, true) => Some(Orientation::DetectionsMajor),
                    _ => None,
                }
            }
            fixed => Some(fixed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxEncoding {
    #[default]
    Auto,
    /// `x1, y1, x2, y2`
    Corners,
    /// `cx, cy, w, h`
    CenterSize,
}

impl BoxEncoding {
    /// Resolve for geometry already scaled to model pixels.
    ///
    /// `Auto` prefers corner form whenever the (non-strict) ordering holds and
    /// every value lies inside the model input. A zero-width corner box then
    /// stays degenerate and is dropped rather than reread as centre/size.
    pub fn resolve(self, geometry: &[f32; 4], input_size: f32) -> BoxEncoding {
        match self {
            BoxEncoding::Auto => {
                let [x1, y1, x2, y2] = *geometry;
                let in_bounds = geometry.iter().all(|v| (0.0..=input_size).contains(v));
                if x1 <= x2 && y1 <= y2 && in_bounds {
                    BoxEncoding::Corners
                } else {
                    BoxEncoding::CenterSize
                }
            }
            fixed => fixed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateUnits {
    #[default]
    Auto,
    /// Fractions of the input edge
    Normalized,
    /// Model input pixels
    Pixels,
}

impl CoordinateUnits {
    /// `Auto`: any magnitude above 1.0 means pixels.
    pub fn resolve(self, geometry: &[f32; 4]) -> CoordinateUnits {
        match self {
            CoordinateUnits::Auto => {
                if geometry.iter().any(|v| v.abs() > 1.0) {
                    CoordinateUnits::Pixels
                } else {
                    CoordinateUnits::Normalized
                }
            }
            fixed => fixed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMode {
    /// `Single` up to six values, `ObjectnessTimesClass` beyond
    #[default]
    Auto,
    /// Value 4 is the score; a sixth value is a class id
    Single,
    /// Value 4 is objectness, values 5.. are class scores
    ObjectnessTimesClass,
}

impl ConfidenceMode {
    pub fn resolve(self, num_values: usize) -> ConfidenceMode {
        match self {
            ConfidenceMode::Auto if num_values > 6 => ConfidenceMode::ObjectnessTimesClass,
            ConfidenceMode::Auto => ConfidenceMode::Single,
            fixed => fixed,
        }
    }

    /// Score for one detection. Callers guarantee at least five values.
    pub fn score(self, values: &ArrayView1<'_, f32>) -> f32 {
        let objectness = values[CONFIDENCE_INDEX];
        match self.resolve(values.len()) {
            ConfidenceMode::ObjectnessTimesClass if values.len() > CONFIDENCE_INDEX + 1 => {
                let best_class = values
                    .iter()
                    .skip(CONFIDENCE_INDEX + 1)
                    .copied()
                    .fold(f32::NEG_INFINITY, f32::max);
                objectness * best_class
            }
            _ => objectness,
        }
    }
}

fn default_output_name() -> String {
    "output0".to_string()
}

/// How to read the detector's output tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    #[serde(default)]
    pub orientation: Orientation,

    #[serde(default)]
    pub box_encoding: BoxEncoding,

    #[serde(default)]
    pub units: CoordinateUnits,

    #[serde(default)]
    pub confidence: ConfidenceMode,

    /// Name of the session output holding detections
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            orientation: Orientation::Auto,
            box_encoding: BoxEncoding::Auto,
            units: CoordinateUnits::Auto,
            confidence: ConfidenceMode::Auto,
            output_name: default_output_name(),
        }
    }
}

impl OutputLayout {
    /// Layout of an end-to-end export: `[1, N, 6]` rows of
    /// `x1, y1, x2, y2, score, class` in model pixels.
    pub fn end_to_end() -> Self {
        Self {
            orientation: Orientation::DetectionsMajor,
            box_encoding: BoxEncoding::Corners,
            units: CoordinateUnits::Pixels,
            confidence: ConfidenceMode::Single,
            ..Self::default()
        }
    }

    /// Layout of a raw single-class head: `[1, 5, anchors]` of
    /// `cx, cy, w, h, score` in model pixels.
    pub fn raw_head() -> Self {
        Self {
            orientation: Orientation::ValuesMajor,
            box_encoding: BoxEncoding::CenterSize,
            units: CoordinateUnits::Pixels,
            confidence: ConfidenceMode::Single,
            ..Self::default()
        }
    }

    pub fn is_fully_auto(&self) -> bool {
        self.orientation == Orientation::Auto
            && self.box_encoding == BoxEncoding::Auto
            && self.units == CoordinateUnits::Auto
            && self.confidence == ConfidenceMode::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_orientation_known_anchor_count() {
        let auto = Orientation::Auto;
        assert_eq!(auto.resolve(5, 8400), Some(Orientation::ValuesMajor));
        assert_eq!(auto.resolve(8400, 6), Some(Orientation::DetectionsMajor));
        // Anchor count on the column axis wins even if rows are larger.
        assert_eq!(auto.resolve(25200, 8400), Some(Orientation::ValuesMajor));
    }

    #[test]
    fn test_orientation_short_axis_is_never_values() {
        let auto = Orientation::Auto;
        assert_eq!(auto.resolve(1, 6), Some(Orientation::DetectionsMajor));
        assert_eq!(auto.resolve(3, 6), Some(Orientation::DetectionsMajor));
        assert_eq!(auto.resolve(4, 85), Some(Orientation::DetectionsMajor));
        assert_eq!(auto.resolve(6, 1), Some(Orientation::ValuesMajor));
        assert_eq!(auto.resolve(6, 3), Some(Orientation::ValuesMajor));
    }

    #[test]
    fn test_orientation_ambiguous_shapes_are_undecided() {
        let auto = Orientation::Auto;
        assert_eq!(auto.resolve(6, 6), None);
        assert_eq!(auto.resolve(5, 6), None);
        assert_eq!(auto.resolve(300, 6), None);
        assert_eq!(auto.resolve(3, 4), None);
    }

    #[test]
    fn test_orientation_fixed_is_kept() {
        assert_eq!(
            Orientation::ValuesMajor.resolve(1, 6),
            Some(Orientation::ValuesMajor)
        );
        assert_eq!(
            Orientation::DetectionsMajor.resolve(6, 8400),
            Some(Orientation::DetectionsMajor)
        );
    }

    #[test]
    fn test_box_encoding_prefers_corners() {
        let corners = [256.0, 256.0, 384.0, 384.0];
        assert_eq!(BoxEncoding::Auto.resolve(&corners, 640.0), BoxEncoding::Corners);

        // x2 < x1 can only be a width
        let center = [320.0, 320.0, 100.0, 40.0];
        assert_eq!(BoxEncoding::Auto.resolve(&center, 640.0), BoxEncoding::CenterSize);

        // out of model bounds
        let wide = [100.0, 100.0, 700.0, 200.0];
        assert_eq!(BoxEncoding::Auto.resolve(&wide, 640.0), BoxEncoding::CenterSize);

        let flat = [100.0, 100.0, 100.0, 150.0];
        assert_eq!(BoxEncoding::Auto.resolve(&flat, 640.0), BoxEncoding::Corners);
    }

    #[test]
    fn test_units() {
        assert_eq!(
            CoordinateUnits::Auto.resolve(&[0.4, 0.4, 0.6, 0.6]),
            CoordinateUnits::Normalized
        );
        assert_eq!(
            CoordinateUnits::Auto.resolve(&[0.4, 0.4, 1.5, 0.6]),
            CoordinateUnits::Pixels
        );
        assert_eq!(
            CoordinateUnits::Normalized.resolve(&[10.0, 10.0, 20.0, 20.0]),
            CoordinateUnits::Normalized
        );
    }

    #[test]
    fn test_confidence_single_and_class_id() {
        let values = arr1(&[1.0, 2.0, 3.0, 4.0, 0.8, 3.0]);
        assert_eq!(ConfidenceMode::Auto.score(&values.view()), 0.8);
    }

    #[test]
    fn test_confidence_objectness_times_class() {
        let values = arr1(&[1.0, 2.0, 3.0, 4.0, 0.5, 0.2, 0.9, 0.1]);
        assert!((ConfidenceMode::Auto.score(&values.view()) - 0.45).abs() < 1e-6);

        let single_class = arr1(&[1.0, 2.0, 3.0, 4.0, 0.5, 0.6]);
        let score = ConfidenceMode::ObjectnessTimesClass.score(&single_class.view());
        assert!((score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_layout_deserialize_defaults() {
        let layout: OutputLayout =
            serde_json::from_value(serde_json::json!({ "orientation": "values_major" })).unwrap();
        assert_eq!(layout.orientation, Orientation::ValuesMajor);
        assert_eq!(layout.box_encoding, BoxEncoding::Auto);
        assert_eq!(layout.output_name, "output0");
        assert!(!layout.is_fully_auto());
        assert!(OutputLayout::default().is_fully_auto());
    }
}
