use crate::model::ExecutionBackend;
use crate::pipeline::layout::OutputLayout;
use crate::pipeline::nms::DEFAULT_IOU_THRESHOLD;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Detection pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateDetectorConfig {
    /// Model path relative to the static asset root
    #[serde(default = "default_model_file")]
    pub model_file: String,

    /// Origin serving static assets (e.g. `http://localhost:3000`)
    #[serde(default)]
    pub asset_origin: Option<Url>,

    /// Static asset root on the local filesystem
    #[serde(default)]
    pub asset_dir: Option<PathBuf>,

    /// Base URL the model file is resolved against
    #[serde(default)]
    pub asset_base_url: Option<Url>,

    /// Extra candidate locations tried after the derived ones
    #[serde(default)]
    pub extra_candidates: Vec<String>,

    /// Execution backends in order of preference
    #[serde(default = "ExecutionBackend::default_order")]
    pub backends: Vec<ExecutionBackend>,

    /// GPU device ID
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Model input edge length
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// IoU threshold for NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum candidates passed to NMS
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Output tensor layout
    #[serde(default)]
    pub output_layout: OutputLayout,
}

fn default_model_file() -> String {
    "models/license_plate_detector.onnx".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_input_size() -> u32 {
    640
}

fn default_iou_threshold() -> f32 {
    DEFAULT_IOU_THRESHOLD
}

fn default_max_candidates() -> usize {
    crate::pipeline::decode::MAX_CANDIDATES
}

impl Default for PlateDetectorConfig {
    fn default() -> Self {
        Self {
            model_file: default_model_file(),
            asset_origin: None,
            asset_dir: None,
            asset_base_url: None,
            extra_candidates: Vec::new(),
            backends: ExecutionBackend::default_order(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            input_size: default_input_size(),
            iou_threshold: default_iou_threshold(),
            max_candidates: default_max_candidates(),
            output_layout: OutputLayout::default(),
        }
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {}: {}", name, e)),
        _ => Ok(None),
    }
}

fn parse_url_var(name: &str) -> Result<Option<Url>> {
    env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(|s| Url::parse(s.trim()).with_context(|| format!("Invalid {}", name)))
        .transpose()
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl PlateDetectorConfig {
    /// Defaults overridden by `PLATE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(model_file) = env::var("PLATE_MODEL_FILE") {
            if !model_file.trim().is_empty() {
                config.model_file = model_file.trim().to_string();
            }
        }
        if let Some(origin) = parse_url_var("PLATE_ASSET_ORIGIN")? {
            config.asset_origin = Some(origin);
        }
        if let Some(base) = parse_url_var("PLATE_ASSET_BASE_URL")? {
            config.asset_base_url = Some(base);
        }
        if let Ok(dir) = env::var("PLATE_ASSET_DIR") {
            if !dir.trim().is_empty() {
                config.asset_dir = Some(PathBuf::from(dir.trim()));
            }
        }
        if let Ok(raw) = env::var("PLATE_MODEL_CANDIDATES") {
            config.extra_candidates = split_list(&raw).map(str::to_string).collect();
        }
        if let Ok(raw) = env::var("PLATE_BACKENDS") {
            let backends = split_list(&raw)
                .map(|b| b.parse::<ExecutionBackend>().map_err(|e| anyhow!(e)))
                .collect::<Result<Vec<_>>>()
                .context("Invalid PLATE_BACKENDS")?;
            if !backends.is_empty() {
                config.backends = backends;
            }
        }
        if let Some(device_id) = parse_var("PLATE_DEVICE_ID")? {
            config.device_id = device_id;
        }
        if let Some(threads) = parse_var("PLATE_INTRA_THREADS")? {
            config.intra_threads = threads;
        }
        if let Some(size) = parse_var("PLATE_INPUT_SIZE")? {
            config.input_size = size;
        }
        if let Some(iou) = parse_var("PLATE_IOU_THRESHOLD")? {
            config.iou_threshold = iou;
        }
        if let Some(max) = parse_var("PLATE_MAX_CANDIDATES")? {
            config.max_candidates = max;
        }
        if let Ok(raw) = env::var("PLATE_OUTPUT_LAYOUT") {
            if !raw.trim().is_empty() {
                config.output_layout =
                    serde_json::from_str(&raw).context("Invalid PLATE_OUTPUT_LAYOUT")?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(anyhow!("input_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(anyhow!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.backends.is_empty() {
            return Err(anyhow!("at least one execution backend is required"));
        }
        if self.max_candidates == 0 {
            return Err(anyhow!("max_candidates must be positive"));
        }
        Ok(())
    }
}

/// HTTP service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Load the model at startup instead of on first request
    pub preload_model: bool,

    pub detector: PlateDetectorConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("PLATE_SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());
        let preload_model = parse_var("PLATE_PRELOAD_MODEL")?.unwrap_or(true);

        Ok(Self {
            bind_addr,
            preload_model,
            detector: PlateDetectorConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PlateDetectorConfig::default();
        assert_eq!(config.input_size, 640);
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.max_candidates, 100);
        assert_eq!(
            config.backends,
            vec![ExecutionBackend::Cuda, ExecutionBackend::Cpu]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: PlateDetectorConfig = serde_json::from_value(serde_json::json!({
            "asset_origin": "http://localhost:3000",
            "backends": ["cpu"],
            "output_layout": { "orientation": "values_major" }
        }))
        .unwrap();

        assert_eq!(
            config.asset_origin.as_ref().map(Url::as_str),
            Some("http://localhost:3000/")
        );
        assert_eq!(config.backends, vec![ExecutionBackend::Cpu]);
        assert_eq!(config.model_file, "models/license_plate_detector.onnx");
        assert_eq!(config.input_size, 640);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PlateDetectorConfig {
            iou_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PlateDetectorConfig {
            backends: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_list() {
        let items: Vec<&str> = split_list(" cuda, ,cpu ").collect();
        assert_eq!(items, vec!["cuda", "cpu"]);
    }
}
