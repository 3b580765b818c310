//! Plate detection contracts shared by the detector service and its clients.
//!
//! All coordinates are expressed in original-image pixel space.

use serde::{Deserialize, Serialize};

/// A single detected license plate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Left edge in pixels
    pub x1: f32,

    /// Top edge in pixels
    pub y1: f32,

    /// Right edge in pixels
    pub x2: f32,

    /// Bottom edge in pixels
    pub y2: f32,

    /// Box width (x2 - x1)
    pub width: f32,

    /// Box height (y2 - y1)
    pub height: f32,

    /// Detection confidence in [0, 1]
    pub score: f32,
}

impl Detection {
    /// Build a detection from corner coordinates, deriving width and height.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            width: x2 - x1,
            height: y2 - y1,
            score,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Request body for detection and plate-check endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Base64 encoded image bytes (JPEG, PNG, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Addressable image location (http(s), data: or file URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Confidence threshold override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

/// Response to a detection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Detections ordered by descending score
    pub detections: Vec<Detection>,

    /// Threshold that was applied
    pub threshold: f32,

    /// Wall-clock processing time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

/// Response to a plate-check request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateCheckResponse {
    /// Whether at least one plate was found at the threshold
    pub has_plate: bool,

    /// Threshold that was applied
    pub threshold: f32,
}

/// Readiness information about the loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    /// Whether a session has been created
    pub loaded: bool,

    /// Execution backend in use, if loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_from_corners() {
        let det = Detection::from_corners(10.0, 20.0, 110.0, 70.0, 0.8);
        assert_eq!(det.width, 100.0);
        assert_eq!(det.height, 50.0);
        assert_eq!(det.area(), 5000.0);
    }

    #[test]
    fn test_detect_request_accepts_partial_body() {
        let request: DetectRequest =
            serde_json::from_value(serde_json::json!({ "url": "file:///tmp/car.png" }))
                .unwrap();
        assert!(request.image.is_none());
        assert_eq!(request.url.as_deref(), Some("file:///tmp/car.png"));
        assert!(request.threshold.is_none());
    }

    #[test]
    fn test_detection_serialization() {
        let det = Detection::from_corners(0.0, 0.0, 4.0, 2.0, 0.5);
        let json = serde_json::to_value(det).unwrap();
        assert_eq!(json["width"], 4.0);
        assert_eq!(json["score"], 0.5);
    }
}
