use thiserror::Error;

/// Errors raised by the plate detection pipeline.
///
/// Fetch and backend errors are recoverable while candidates remain; the
/// loader only surfaces the aggregate `*Unavailable` variants.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("model fetch from {location} failed: {reason}")]
    ModelFetch { location: String, reason: String },

    #[error("no model candidate could be loaded: {}", attempts.join("; "))]
    ModelUnavailable { attempts: Vec<String> },

    #[error("backend {backend} failed to initialize: {reason}")]
    BackendInit { backend: String, reason: String },

    #[error("no execution backend could build a session: {}", attempts.join("; "))]
    BackendUnavailable { attempts: Vec<String> },

    #[error("unsupported image source: {0}")]
    UnsupportedSource(String),

    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("cannot decode model output: {0}")]
    Decode(String),
}

impl DetectorError {
    pub fn fetch(location: impl ToString, reason: impl ToString) -> Self {
        Self::ModelFetch {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn backend(backend: impl ToString, reason: impl ToString) -> Self {
        Self::BackendInit {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<ort::Error> for DetectorError {
    fn from(err: ort::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
