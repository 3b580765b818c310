pub mod api;
pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod state;

pub use capture::{capture_plate_image, CaptureSource, VideoFrame};
pub use config::{PlateDetectorConfig, ServiceConfig};
pub use detector::{PlateDetector, DEFAULT_ACCEPT_THRESHOLD, DEFAULT_DETECT_THRESHOLD};
pub use error::DetectorError;
pub use model::{ExecutionBackend, ModelLoader};
pub use source::ImageSource;
pub use state::PlateServiceState;
