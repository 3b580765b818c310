//! Model resolution and session caching.
//!
//! Candidate locations are tried in order until one yields a genuine binary
//! payload; the payload is then offered to each backend in order. The first
//! session built is cached for the lifetime of the loader, and concurrent
//! callers share a single in-flight load.

use super::{ExecutionBackend, OrtSessionFactory, SessionFactory, SessionHandle};
use crate::config::PlateDetectorConfig;
use crate::error::{DetectorError, Result};
use reqwest::header::CONTENT_TYPE;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use telemetry::metrics::{PLATE_MODEL_FETCH_ATTEMPTS, PLATE_MODEL_LOADED, PLATE_MODEL_LOADS};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

/// Content types that indicate an error page rather than model weights
const MARKUP_CONTENT_TYPES: [&str; 4] = [
    "text/html",
    "application/xhtml+xml",
    "text/xml",
    "application/xml",
];

/// Leading bytes of markup documents
const MARKUP_SIGNATURES: [&[u8]; 4] = [b"<!", b"<?xml", b"<html", b"<HTML"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Where a model binary may be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation {
    Url(Url),
    File(PathBuf),
}

impl ModelLocation {
    /// Parse a configured location. `http(s)` and `file` URLs are recognised;
    /// anything else is a filesystem path.
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => ModelLocation::Url(url),
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => ModelLocation::File(path),
                Err(()) => ModelLocation::File(PathBuf::from(url.path())),
            },
            _ => ModelLocation::File(PathBuf::from(raw)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ModelLocation::Url(_) => "url",
            ModelLocation::File(_) => "file",
        }
    }
}

impl fmt::Display for ModelLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelLocation::Url(url) => write!(f, "{}", url),
            ModelLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Ordered, de-duplicated candidate list for a configuration.
///
/// Order: origin-absolute URL, path under the static asset root, file
/// resolved against the asset base URL, then explicit extras. Without any of
/// these the model file is read relative to the working directory.
pub fn candidate_locations(config: &PlateDetectorConfig) -> Vec<ModelLocation> {
    let relative = config.model_file.trim_start_matches('/');
    let mut candidates = Vec::new();

    if let Some(origin) = &config.asset_origin {
        match origin.join(&format!("/{}", relative)) {
            Ok(url) => candidates.push(ModelLocation::Url(url)),
            Err(e) => warn!(origin = %origin, error = %e, "cannot build origin model URL"),
        }
    }
    if let Some(dir) = &config.asset_dir {
        candidates.push(ModelLocation::File(dir.join(relative)));
    }
    if let Some(base) = &config.asset_base_url {
        match base.join(relative) {
            Ok(url) => candidates.push(ModelLocation::Url(url)),
            Err(e) => warn!(base = %base, error = %e, "cannot resolve model against asset base"),
        }
    }
    candidates.extend(config.extra_candidates.iter().map(|c| ModelLocation::parse(c)));

    if candidates.is_empty() {
        candidates.push(ModelLocation::File(PathBuf::from(&config.model_file)));
    }

    let mut unique: Vec<ModelLocation> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

pub fn is_markup_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    MARKUP_CONTENT_TYPES.contains(&mime.as_str())
}

/// Whether a payload starts like an HTML/XML document
pub fn looks_like_markup(payload: &[u8]) -> bool {
    let body = payload.strip_prefix(UTF8_BOM).unwrap_or(payload);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let body = &body[start..];
    MARKUP_SIGNATURES.iter().any(|sig| body.starts_with(sig))
}

/// Reject payloads that cannot be model weights
pub fn validate_payload(payload: &[u8]) -> std::result::Result<(), String> {
    if payload.is_empty() {
        return Err("empty payload".to_string());
    }
    if looks_like_markup(payload) {
        return Err("payload is markup, not a model binary".to_string());
    }
    Ok(())
}

/// Lazily loads and caches the detection model session
pub struct ModelLoader {
    candidates: Vec<ModelLocation>,
    backends: Vec<ExecutionBackend>,
    /// `None` for loaders seeded with a session
    factory: Option<Arc<dyn SessionFactory>>,
    http: reqwest::Client,
    session: OnceCell<SessionHandle>,
}

impl ModelLoader {
    pub fn new(
        candidates: Vec<ModelLocation>,
        backends: Vec<ExecutionBackend>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            candidates,
            backends,
            factory: Some(factory),
            http: reqwest::Client::new(),
            session: OnceCell::new(),
        }
    }

    /// Loader backed by ONNX Runtime
    pub fn from_config(config: &PlateDetectorConfig) -> Self {
        let factory = OrtSessionFactory::new(
            config.device_id,
            config.intra_threads,
            config.output_layout.output_name.clone(),
        );
        Self::new(
            candidate_locations(config),
            config.backends.clone(),
            Arc::new(factory),
        )
    }

    /// Loader seeded with an existing session; `load` never fetches.
    pub fn from_session(session: SessionHandle) -> Self {
        Self {
            candidates: Vec::new(),
            backends: vec![session.backend()],
            factory: None,
            http: reqwest::Client::new(),
            session: OnceCell::new_with(Some(session)),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn candidates(&self) -> &[ModelLocation] {
        &self.candidates
    }

    pub fn backends(&self) -> &[ExecutionBackend] {
        &self.backends
    }

    pub fn is_loaded(&self) -> bool {
        self.session.initialized()
    }

    /// Backend of the cached session, if any
    pub fn backend(&self) -> Option<ExecutionBackend> {
        self.session.get().map(|s| s.backend())
    }

    /// Return the cached session, loading it on first use.
    ///
    /// Callers arriving while a load is in flight wait for that load. A failed
    /// load is not cached; the next call starts over.
    pub async fn load(&self) -> Result<SessionHandle> {
        self.session
            .get_or_try_init(|| self.load_uncached())
            .await
            .cloned()
    }

    async fn load_uncached(&self) -> Result<SessionHandle> {
        let (location, payload) = self.fetch_first_valid().await?;
        let session = self.create_session(&payload).await?;

        PLATE_MODEL_LOADED.set(1);
        info!(
            location = %location,
            backend = %session.backend(),
            bytes = payload.len(),
            "plate detection model loaded"
        );
        Ok(session)
    }

    async fn fetch_first_valid(&self) -> Result<(&ModelLocation, Vec<u8>)> {
        let mut attempts = Vec::new();

        for location in &self.candidates {
            match self.fetch(location).await {
                Ok(payload) => {
                    PLATE_MODEL_FETCH_ATTEMPTS
                        .with_label_values(&[location.kind(), "success"])
                        .inc();
                    return Ok((location, payload));
                }
                Err(e) => {
                    PLATE_MODEL_FETCH_ATTEMPTS
                        .with_label_values(&[location.kind(), "rejected"])
                        .inc();
                    warn!(location = %location, error = %e, "model candidate rejected");
                    attempts.push(e.to_string());
                }
            }
        }

        if attempts.is_empty() {
            attempts.push("no candidate locations configured".to_string());
        }
        Err(DetectorError::ModelUnavailable { attempts })
    }

    /// Fetch and validate one candidate
    pub async fn fetch(&self, location: &ModelLocation) -> Result<Vec<u8>> {
        debug!(location = %location, "fetching model candidate");
        let payload = match location {
            ModelLocation::Url(url) => self.fetch_url(url).await?,
            ModelLocation::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| DetectorError::fetch(location, e))?,
        };

        validate_payload(&payload).map_err(|reason| DetectorError::fetch(location, reason))?;
        Ok(payload)
    }

    async fn fetch_url(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DetectorError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::fetch(url, format!("HTTP status {}", status)));
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if is_markup_content_type(content_type) {
                return Err(DetectorError::fetch(
                    url,
                    format!("content type {} is markup", content_type),
                ));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DetectorError::fetch(url, e))?;
        Ok(body.to_vec())
    }

    async fn create_session(&self, payload: &[u8]) -> Result<SessionHandle> {
        let Some(factory) = &self.factory else {
            return Err(DetectorError::BackendUnavailable {
                attempts: vec!["no session factory configured".to_string()],
            });
        };
        let mut attempts = Vec::new();

        for &backend in &self.backends {
            match factory.create(payload, backend).await {
                Ok(session) => {
                    PLATE_MODEL_LOADS
                        .with_label_values(&[backend.as_str(), "success"])
                        .inc();
                    return Ok(session);
                }
                Err(e) => {
                    PLATE_MODEL_LOADS
                        .with_label_values(&[backend.as_str(), "failure"])
                        .inc();
                    warn!(backend = %backend, error = %e, "backend failed, trying next");
                    attempts.push(e.to_string());
                }
            }
        }

        if attempts.is_empty() {
            attempts.push("no execution backends configured".to_string());
        }
        Err(DetectorError::BackendUnavailable { attempts })
    }
}
