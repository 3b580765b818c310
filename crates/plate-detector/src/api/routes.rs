use super::error::ApiError;
use crate::detector::{DEFAULT_ACCEPT_THRESHOLD, DEFAULT_DETECT_THRESHOLD};
use crate::source::ImageSource;
use crate::state::PlateServiceState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use base64::Engine;
use common::plates::{DetectRequest, DetectResponse, PlateCheckResponse};
use serde_json::json;
use std::time::Instant;

/// Turn a request body into an image source; exactly one of `image`/`url`.
fn image_source(request: &DetectRequest) -> Result<ImageSource, ApiError> {
    match (&request.image, &request.url) {
        (Some(image), None) => {
            let image = image.trim();
            if image.starts_with("data:") {
                return Ok(ImageSource::Url(image.to_string()));
            }
            base64::prelude::BASE64_STANDARD
                .decode(image)
                .map(ImageSource::Blob)
                .map_err(|e| ApiError::bad_request(format!("Invalid base64 image: {}", e)))
        }
        (None, Some(url)) => {
            // Local paths stay a library-only source
            let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
            match scheme.as_deref() {
                Some("http") | Some("https") => Ok(ImageSource::Url(url.clone())),
                _ => Err(ApiError::bad_request("'url' must be an http(s) URL")),
            }
        }
        (Some(_), Some(_)) => Err(ApiError::bad_request(
            "Provide either 'image' or 'url', not both",
        )),
        (None, None) => Err(ApiError::bad_request("One of 'image' or 'url' is required")),
    }
}

fn threshold(request: &DetectRequest, default: f32) -> Result<f32, ApiError> {
    match request.threshold {
        None => Ok(default),
        Some(t) if (0.0..=1.0).contains(&t) => Ok(t),
        Some(t) => Err(ApiError::bad_request(format!(
            "threshold must be within [0, 1], got {}",
            t
        ))),
    }
}

/// Detect license plates in an image
pub async fn detect(
    State(state): State<PlateServiceState>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    let source = image_source(&request)?;
    let threshold = threshold(&request, DEFAULT_DETECT_THRESHOLD)?;

    let start = Instant::now();
    let detections = state.detector().detect_plate(source, threshold).await;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        detections = detections.len(),
        threshold,
        processing_time_ms,
        "Processed detection request"
    );

    Ok(Json(DetectResponse {
        detections,
        threshold,
        processing_time_ms: Some(processing_time_ms),
    }))
}

/// Check whether an image contains at least one plate
pub async fn check(
    State(state): State<PlateServiceState>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<PlateCheckResponse>, ApiError> {
    let source = image_source(&request)?;
    let threshold = threshold(&request, DEFAULT_ACCEPT_THRESHOLD)?;

    let has_plate = state.detector().has_plate(source, threshold).await;
    Ok(Json(PlateCheckResponse {
        has_plate,
        threshold,
    }))
}

/// Health check endpoint
pub async fn healthz(State(state): State<PlateServiceState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": state.service_name()
        })),
    )
}

/// Readiness check endpoint; ready once the model is loaded
pub async fn readyz(State(state): State<PlateServiceState>) -> impl IntoResponse {
    let model = state.model_status();
    let status = if model.loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let label = if model.loaded { "ready" } else { "not ready" };

    (
        status,
        Json(json!({
            "status": label,
            "model": model
        })),
    )
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> Result<String, ApiError> {
    telemetry::metrics::encode_metrics().map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        ApiError::internal("Failed to encode metrics")
    })
}
