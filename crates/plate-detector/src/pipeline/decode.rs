//! Raw output tensor decoding.
//!
//! Turns a detector output of shape `[1, N, V]` or `[1, V, N]` into
//! candidate boxes in original-image pixels, sorted by confidence and capped
//! before suppression.

use super::layout::{BoxEncoding, CoordinateUnits, Orientation, OutputLayout, CONFIDENCE_INDEX};
use super::mapping::LetterboxTransform;
use super::{BoundingBox, Candidate, RawDetection};
use crate::error::{DetectorError, Result};
use crate::model::RawOutput;
use ndarray::{ArrayView1, ArrayView2};

/// Candidates below this confidence are discarded before thresholding and
/// NMS, independent of the caller's threshold. It bounds the candidate set
/// on noisy heads; callers asking for a lower threshold still get the floor.
pub const CANDIDATE_CONFIDENCE_FLOOR: f32 = 0.01;

/// Most candidates handed to suppression
pub const MAX_CANDIDATES: usize = 100;

/// Decodes detector output according to an [`OutputLayout`]
#[derive(Debug, Clone)]
pub struct OutputDecoder {
    layout: OutputLayout,
    input_size: u32,
    max_candidates: usize,
}

impl OutputDecoder {
    pub fn new(layout: OutputLayout, input_size: u32) -> Self {
        Self {
            layout,
            input_size,
            max_candidates: MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Decode every well-formed detection in model pixel space.
    ///
    /// Non-finite values and degenerate boxes are skipped silently.
    pub fn decode_raw(&self, raw: &RawOutput) -> Result<Vec<RawDetection>> {
        let view = raw.view2()?;
        let (rows, cols) = view.dim();
        let orientation = match self.layout.orientation.resolve(rows, cols) {
            Some(orientation) => orientation,
            None => self.infer_orientation(&view),
        };
        let values_major = orientation == Orientation::ValuesMajor;
        let (num_values, num_detections) = if values_major {
            (rows, cols)
        } else {
            (cols, rows)
        };

        if num_values <= CONFIDENCE_INDEX {
            return Err(DetectorError::decode(format!(
                "need at least {} values per detection, output shape {:?} gives {}",
                CONFIDENCE_INDEX + 1,
                raw.shape,
                num_values
            )));
        }

        let mut detections = Vec::new();
        let mut skipped = 0usize;
        for i in 0..num_detections {
            let values = if values_major {
                view.column(i)
            } else {
                view.row(i)
            };
            match self.decode_one(&values) {
                Some(detection) => detections.push(detection),
                None => skipped += 1,
            }
        }

        tracing::trace!(
            ?orientation,
            num_values,
            num_detections,
            decoded = detections.len(),
            skipped,
            "decoded raw output"
        );
        Ok(detections)
    }

    /// Pick the reading whose plausible detections carry more total
    /// confidence. Ties read as detections-major.
    fn infer_orientation(&self, view: &ArrayView2<'_, f32>) -> Orientation {
        let detections_major = self.plausible_confidence(view.rows());
        let values_major = self.plausible_confidence(view.columns());
        let orientation = if values_major > detections_major {
            Orientation::ValuesMajor
        } else {
            Orientation::DetectionsMajor
        };
        tracing::debug!(
            detections_major,
            values_major,
            ?orientation,
            "output orientation inferred from values"
        );
        orientation
    }

    /// Summed confidence of the lanes that decode to a valid box with an
    /// in-range score when read as detections
    fn plausible_confidence<'a>(
        &self,
        lanes: impl IntoIterator<Item = ArrayView1<'a, f32>>,
    ) -> f32 {
        lanes
            .into_iter()
            .filter(|values| values.len() > CONFIDENCE_INDEX)
            .filter(|values| (0.0..=1.0).contains(&self.layout.confidence.score(values)))
            .filter_map(|values| self.decode_one(&values))
            .map(|d| d.confidence)
            .sum()
    }

    fn decode_one(&self, values: &ArrayView1<'_, f32>) -> Option<RawDetection> {
        let geometry = [values[0], values[1], values[2], values[3]];
        let confidence = self.layout.confidence.score(values);
        if !confidence.is_finite() || geometry.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let size = self.input_size as f32;
        let factor = match self.layout.units.resolve(&geometry) {
            CoordinateUnits::Normalized => size,
            _ => 1.0,
        };
        let g = geometry.map(|v| v * factor);

        let bbox = match self.layout.box_encoding.resolve(&g, size) {
            BoxEncoding::CenterSize => BoundingBox::from_center(g[0], g[1], g[2], g[3]),
            _ => BoundingBox::new(g[0], g[1], g[2], g[3]),
        };
        if !bbox.is_valid() {
            return None;
        }

        Some(RawDetection {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Decode, map into `original_width x original_height`, drop candidates
    /// under [`CANDIDATE_CONFIDENCE_FLOOR`], sort by descending confidence
    /// and cap.
    pub fn decode(
        &self,
        raw: &RawOutput,
        transform: &LetterboxTransform,
        original_width: u32,
        original_height: u32,
    ) -> Result<Vec<Candidate>> {
        let mut candidates: Vec<Candidate> = self
            .decode_raw(raw)?
            .into_iter()
            .filter(|d| d.confidence >= CANDIDATE_CONFIDENCE_FLOOR)
            .filter_map(|d| {
                transform
                    .map_box(&d.bbox, original_width, original_height)
                    .map(|bbox| Candidate {
                        bbox,
                        score: d.confidence,
                    })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(self.max_candidates);
        Ok(candidates)
    }
}
