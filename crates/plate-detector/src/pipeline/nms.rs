use super::Candidate;
use common::plates::Detection;

/// IoU above which a lower-scored box is treated as a duplicate
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Greedy non-maximum suppression.
///
/// Keeps candidates with `score >= score_threshold`, then repeatedly accepts
/// the best remaining box and drops every box whose IoU with it exceeds
/// `iou_threshold`. Output is ordered by descending score.
pub fn suppress(candidates: &[Candidate], iou_threshold: f32, score_threshold: f32) -> Vec<Detection> {
    let mut remaining: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.score >= score_threshold && c.bbox.is_valid())
        .collect();
    remaining.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep = Vec::new();

    while !remaining.is_empty() {
        let current = remaining.remove(0);
        remaining.retain(|other| current.bbox.iou(&other.bbox) <= iou_threshold);
        keep.push(current.to_detection());
    }

    keep
}
