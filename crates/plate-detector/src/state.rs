use crate::detector::PlateDetector;
use crate::error::Result;
use common::plates::ModelStatus;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct PlateServiceState {
    inner: Arc<PlateServiceStateInner>,
}

struct PlateServiceStateInner {
    service_name: String,
    detector: PlateDetector,
}

impl PlateServiceState {
    pub fn new(detector: PlateDetector) -> Self {
        Self::with_service_name("plate-detector", detector)
    }

    pub fn with_service_name(service_name: impl Into<String>, detector: PlateDetector) -> Self {
        Self {
            inner: Arc::new(PlateServiceStateInner {
                service_name: service_name.into(),
                detector,
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub fn detector(&self) -> &PlateDetector {
        &self.inner.detector
    }

    pub fn is_ready(&self) -> bool {
        self.inner.detector.loader().is_loaded()
    }

    pub fn model_status(&self) -> ModelStatus {
        let loader = self.inner.detector.loader();
        ModelStatus {
            loaded: loader.is_loaded(),
            backend: loader.backend().map(|b| b.to_string()),
        }
    }

    /// Load the model ahead of the first request
    pub async fn preload(&self) -> Result<()> {
        match self.inner.detector.loader().load().await {
            Ok(session) => {
                info!(backend = %session.backend(), "model preloaded");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "model preload failed, will retry on first request");
                Err(e)
            }
        }
    }
}
