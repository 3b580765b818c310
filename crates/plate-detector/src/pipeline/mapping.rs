use super::preprocess::PreprocessResult;
use super::BoundingBox;

/// Inverse of the letterbox applied during preprocessing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl LetterboxTransform {
    pub fn new(scale_x: f32, scale_y: f32, offset_x: f32, offset_y: f32) -> Self {
        Self {
            scale_x,
            scale_y,
            offset_x,
            offset_y,
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 1.0, 0.0, 0.0)
    }

    /// Model pixel to original pixel, unclamped
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x) * self.scale_x,
            (y - self.offset_y) * self.scale_y,
        )
    }

    /// Original pixel to model pixel
    pub fn to_model(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x / self.scale_x + self.offset_x,
            y / self.scale_y + self.offset_y,
        )
    }

    /// Map a model-space box into `[0, width] x [0, height]`.
    ///
    /// Returns `None` when the clamped box has no area.
    pub fn map_box(&self, bbox: &BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
        let (x1, y1) = self.to_original(bbox.x1, bbox.y1);
        let (x2, y2) = self.to_original(bbox.x2, bbox.y2);
        let (w, h) = (width as f32, height as f32);

        let mapped = BoundingBox::new(
            x1.clamp(0.0, w),
            y1.clamp(0.0, h),
            x2.clamp(0.0, w),
            y2.clamp(0.0, h),
        );
        mapped.is_valid().then_some(mapped)
    }
}

impl From<&PreprocessResult> for LetterboxTransform {
    fn from(result: &PreprocessResult) -> Self {
        Self::new(result.scale_x, result.scale_y, result.offset_x, result.offset_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_keeps_coordinates() {
        let t = LetterboxTransform::identity();
        let b = BoundingBox::new(12.5, 40.0, 300.0, 420.25);
        assert_eq!(t.map_box(&b, 640, 640), Some(b));
    }

    #[test]
    fn test_removes_padding_and_scale() {
        // 1280x720 letterboxed into 640: scale 2, 140 px bands
        let t = LetterboxTransform::new(2.0, 2.0, 0.0, 140.0);
        let b = BoundingBox::new(100.0, 200.0, 300.0, 260.0);
        let mapped = t.map_box(&b, 1280, 720).unwrap();
        assert_eq!(mapped, BoundingBox::new(200.0, 120.0, 600.0, 240.0));
    }

    #[test]
    fn test_clamps_to_image_bounds() {
        let t = LetterboxTransform::new(2.0, 2.0, 0.0, 140.0);
        let b = BoundingBox::new(-10.0, 100.0, 700.0, 520.0);
        let mapped = t.map_box(&b, 1280, 720).unwrap();
        assert_eq!(mapped, BoundingBox::new(0.0, 0.0, 1280.0, 720.0));
    }

    #[test]
    fn test_box_inside_padding_is_dropped() {
        let t = LetterboxTransform::new(2.0, 2.0, 0.0, 140.0);
        let b = BoundingBox::new(10.0, 10.0, 60.0, 100.0);
        assert_eq!(t.map_box(&b, 1280, 720), None);
    }

    #[test]
    fn test_forward_then_inverse() {
        let t = LetterboxTransform::new(1.875, 1.875, 80.0, 0.0);
        let (mx, my) = t.to_model(150.0, 333.0);
        let (x, y) = t.to_original(mx, my);
        assert!((x - 150.0).abs() < 1e-3);
        assert!((y - 333.0).abs() < 1e-3);
    }
}
