use crate::error::{DetectorError, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgba, RgbaImage};
use ndarray::Array4;

/// Neutral gray used for letterbox padding
pub const LETTERBOX_FILL: [u8; 3] = [114, 114, 114];

/// Letterboxed input tensor plus what is needed to undo the transform
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// `1 x 3 x S x S`, RGB planes, values in [0, 1]
    pub tensor: Array4<f32>,
    /// Original width over drawn (unpadded) width
    pub scale_x: f32,
    /// Original height over drawn (unpadded) height
    pub scale_y: f32,
    /// Horizontal padding in model pixels
    pub offset_x: f32,
    /// Vertical padding in model pixels
    pub offset_y: f32,
    pub target_size: u32,
}

impl PreprocessResult {
    /// Flattened channel-major buffer
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.tensor.as_slice()
    }
}

/// Letterbox `image` into a `target_size` square and convert it to a
/// channel-first float tensor.
pub fn preprocess(image: &DynamicImage, target_size: u32) -> Result<PreprocessResult> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DetectorError::Preprocess(format!(
            "image has no pixels ({}x{})",
            width, height
        )));
    }
    if target_size == 0 {
        return Err(DetectorError::Preprocess("target size must be positive".to_string()));
    }

    let ratio = target_size as f32 / width.max(height) as f32;
    let drawn_w = ((width as f32 * ratio).round() as u32).clamp(1, target_size);
    let drawn_h = ((height as f32 * ratio).round() as u32).clamp(1, target_size);
    let offset_x = (target_size - drawn_w) / 2;
    let offset_y = (target_size - drawn_h) / 2;

    let rgba = image.to_rgba8();
    let resized = if (drawn_w, drawn_h) == (width, height) {
        rgba
    } else {
        image::imageops::resize(&rgba, drawn_w, drawn_h, FilterType::Triangle)
    };

    let [r, g, b] = LETTERBOX_FILL;
    let mut canvas = RgbaImage::from_pixel(target_size, target_size, Rgba([r, g, b, 255]));
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    Ok(PreprocessResult {
        tensor: to_chw_tensor(&canvas),
        scale_x: width as f32 / drawn_w as f32,
        scale_y: height as f32 / drawn_h as f32,
        offset_x: offset_x as f32,
        offset_y: offset_y as f32,
        target_size,
    })
}

/// Interleaved RGBA 0-255 to planar RGB 0.0-1.0 (NCHW, batch of one)
fn to_chw_tensor(canvas: &RgbaImage) -> Array4<f32> {
    let (width, height) = canvas.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    #[test]
    fn test_square_input_has_no_padding() {
        let result = preprocess(&solid(640, 640, [255, 0, 0]), 640).unwrap();
        assert_eq!(result.scale_x, 1.0);
        assert_eq!(result.scale_y, 1.0);
        assert_eq!(result.offset_x, 0.0);
        assert_eq!(result.offset_y, 0.0);
        assert_eq!(result.tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(result.tensor[[0, 0, 10, 10]], 1.0);
        assert_eq!(result.tensor[[0, 1, 10, 10]], 0.0);
    }

    #[test]
    fn test_landscape_is_padded_vertically() {
        let result = preprocess(&solid(1280, 720, [0, 0, 255]), 640).unwrap();
        assert_eq!(result.offset_x, 0.0);
        assert_eq!(result.offset_y, 140.0);
        assert_eq!(result.scale_x, 2.0);
        assert_eq!(result.scale_y, 2.0);

        let gray = LETTERBOX_FILL[0] as f32 / 255.0;
        // padding band
        assert!((result.tensor[[0, 0, 10, 320]] - gray).abs() < 1e-6);
        assert!((result.tensor[[0, 2, 630, 320]] - gray).abs() < 1e-6);
        // image content
        assert_eq!(result.tensor[[0, 2, 320, 320]], 1.0);
        assert_eq!(result.tensor[[0, 0, 320, 320]], 0.0);
    }

    #[test]
    fn test_portrait_is_padded_horizontally() {
        let result = preprocess(&solid(300, 600, [10, 20, 30]), 320).unwrap();
        assert_eq!(result.offset_x, 80.0);
        assert_eq!(result.offset_y, 0.0);
        assert!((result.scale_x - 300.0 / 160.0).abs() < 1e-6);
        assert!((result.scale_y - 600.0 / 320.0).abs() < 1e-6);
    }

    #[test]
    fn test_small_image_is_upscaled() {
        let result = preprocess(&solid(64, 32, [0, 0, 0]), 640).unwrap();
        assert_eq!(result.scale_x, 0.1);
        assert_eq!(result.offset_y, 160.0);
    }

    #[test]
    fn test_tensor_is_channel_major_and_contiguous() {
        let result = preprocess(&solid(8, 8, [255, 128, 0]), 8).unwrap();
        let flat = result.as_slice().unwrap();
        assert_eq!(flat.len(), 3 * 8 * 8);
        assert_eq!(flat[0], 1.0);
        assert!((flat[64] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(flat[128], 0.0);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            preprocess(&empty, 640),
            Err(DetectorError::Preprocess(_))
        ));
    }
}
