//! Snapshotting a live surface into an encoded image for upload.

use image::{codecs::jpeg::JpegEncoder, DynamicImage, RgbaImage};
use tracing::debug;

/// JPEG quality used for captured snapshots
pub const CAPTURE_JPEG_QUALITY: u8 = 90;

/// One decoded video frame, RGBA8 row-major
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A surface that can be snapshotted
#[derive(Debug, Clone)]
pub enum CaptureSource {
    Video(VideoFrame),
    Canvas(RgbaImage),
    /// Anything else; carries a description for logging
    Unsupported(String),
}

/// Encode the current contents of `source` as JPEG.
///
/// Returns `None` for unsupported sources, empty surfaces and frames whose
/// buffer does not match their dimensions.
pub fn capture_plate_image(source: &CaptureSource) -> Option<Vec<u8>> {
    let surface = match source {
        CaptureSource::Video(frame) => {
            let expected = frame.width as usize * frame.height as usize * 4;
            if frame.rgba.len() != expected {
                debug!(
                    expected,
                    actual = frame.rgba.len(),
                    "video frame buffer does not match its dimensions"
                );
                return None;
            }
            RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        }
        CaptureSource::Canvas(canvas) => Some(canvas.clone()),
        CaptureSource::Unsupported(kind) => {
            debug!(kind = %kind, "capture source not supported");
            None
        }
    }?;

    if surface.width() == 0 || surface.height() == 0 {
        return None;
    }

    let rgb = DynamicImage::ImageRgba8(surface).to_rgb8();
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, CAPTURE_JPEG_QUALITY);
    if let Err(e) = encoder.encode_image(&rgb) {
        debug!(error = %e, "failed to encode capture");
        return None;
    }
    Some(encoded)
}
