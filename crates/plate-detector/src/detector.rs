//! Public detection entry points.

use crate::config::PlateDetectorConfig;
use crate::error::Result;
use crate::model::ModelLoader;
use crate::pipeline::decode::OutputDecoder;
use crate::pipeline::mapping::LetterboxTransform;
use crate::pipeline::nms;
use crate::pipeline::preprocess::preprocess;
use crate::source::ImageSource;
use common::plates::Detection;
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{
    PLATE_DETECTIONS_EMITTED, PLATE_DETECTION_REQUESTS, PLATE_INFERENCE_TIME,
    PLATE_PIPELINE_TIME,
};
use tracing::{debug, warn};

/// Default score threshold for [`PlateDetector::detect_plate`]
pub const DEFAULT_DETECT_THRESHOLD: f32 = 0.1;

/// Default score threshold for [`PlateDetector::has_plate`]. Higher than the
/// detection default since it gates acceptance of an upload.
pub const DEFAULT_ACCEPT_THRESHOLD: f32 = 0.25;

/// License plate detector over a shared, lazily loaded model
#[derive(Clone)]
pub struct PlateDetector {
    loader: Arc<ModelLoader>,
    decoder: OutputDecoder,
    input_size: u32,
    iou_threshold: f32,
    http: reqwest::Client,
}

impl PlateDetector {
    pub fn new(loader: Arc<ModelLoader>, config: &PlateDetectorConfig) -> Self {
        let decoder = OutputDecoder::new(config.output_layout.clone(), config.input_size)
            .with_max_candidates(config.max_candidates);
        Self {
            loader,
            decoder,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            http: reqwest::Client::new(),
        }
    }

    /// Detector with an ONNX Runtime loader built from `config`
    pub fn from_config(config: &PlateDetectorConfig) -> Self {
        Self::new(Arc::new(ModelLoader::from_config(config)), config)
    }

    /// Client used to fetch `http(s)` image sources
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    /// Detect plates, surfacing any failure along the way.
    ///
    /// Detections are in original-image pixels, sorted by descending score.
    pub async fn try_detect_plate(
        &self,
        source: impl Into<ImageSource>,
        threshold: f32,
    ) -> Result<Vec<Detection>> {
        let result = match source.into().resolve(&self.http).await {
            Ok(image) => self.try_detect_image(&image, threshold).await,
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(detections) if detections.is_empty() => "empty",
            Ok(_) => "found",
            Err(_) => "error",
        };
        PLATE_DETECTION_REQUESTS.with_label_values(&[outcome]).inc();
        if let Ok(detections) = &result {
            PLATE_DETECTIONS_EMITTED.inc_by(detections.len() as u64);
        }
        result
    }

    /// Run the pipeline on an already decoded image
    pub async fn try_detect_image(
        &self,
        image: &DynamicImage,
        threshold: f32,
    ) -> Result<Vec<Detection>> {
        let session = self.loader.load().await?;
        let (width, height) = image.dimensions();

        let stage = Instant::now();
        let prepared = preprocess(image, self.input_size)?;
        let transform = LetterboxTransform::from(&prepared);
        observe_stage("preprocess", stage);

        let stage = Instant::now();
        let raw = session.run(prepared.tensor).await?;
        PLATE_INFERENCE_TIME
            .with_label_values(&[session.backend().as_str()])
            .observe(stage.elapsed().as_secs_f64());

        let stage = Instant::now();
        let candidates = self.decoder.decode(&raw, &transform, width, height)?;
        observe_stage("decode", stage);

        let stage = Instant::now();
        let detections = nms::suppress(&candidates, self.iou_threshold, threshold);
        observe_stage("nms", stage);

        debug!(
            width,
            height,
            candidates = candidates.len(),
            detections = detections.len(),
            threshold,
            "plate detection finished"
        );
        Ok(detections)
    }

    /// Detect plates; any internal failure yields an empty list.
    ///
    /// An empty result does not distinguish "no plate" from "pipeline
    /// failed". Use [`PlateDetector::try_detect_plate`] to tell them apart.
    pub async fn detect_plate(
        &self,
        source: impl Into<ImageSource>,
        threshold: f32,
    ) -> Vec<Detection> {
        match self.try_detect_plate(source, threshold).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!(error = %e, "plate detection failed, reporting no plate");
                Vec::new()
            }
        }
    }

    /// Whether at least one plate scores at or above `threshold`
    pub async fn has_plate(&self, source: impl Into<ImageSource>, threshold: f32) -> bool {
        !self.detect_plate(source, threshold).await.is_empty()
    }
}

fn observe_stage(stage: &str, started: Instant) {
    PLATE_PIPELINE_TIME
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64());
}
