pub mod loader;
pub mod ort_session;

use crate::error::{DetectorError, Result};
use async_trait::async_trait;
use ndarray::{Array4, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use loader::{ModelLoader, ModelLocation};
pub use ort_session::{OrtSession, OrtSessionFactory};

/// Compute backend a session can be created on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExecutionBackend {
    TensorRt,
    Cuda,
    Cpu,
}

impl ExecutionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionBackend::TensorRt => "tensorrt",
            ExecutionBackend::Cuda => "cuda",
            ExecutionBackend::Cpu => "cpu",
        }
    }

    pub fn is_gpu(&self) -> bool {
        !matches!(self, ExecutionBackend::Cpu)
    }

    /// GPU first, CPU fallback
    pub fn default_order() -> Vec<ExecutionBackend> {
        vec![ExecutionBackend::Cuda, ExecutionBackend::Cpu]
    }
}

impl fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tensorrt" | "trt" => Ok(ExecutionBackend::TensorRt),
            "cuda" | "gpu" => Ok(ExecutionBackend::Cuda),
            "cpu" => Ok(ExecutionBackend::Cpu),
            other => Err(format!("unknown execution backend '{}'", other)),
        }
    }
}

impl TryFrom<String> for ExecutionBackend {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExecutionBackend> for String {
    fn from(backend: ExecutionBackend) -> Self {
        backend.as_str().to_string()
    }
}

/// Raw output tensor of a session, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl RawOutput {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(DetectorError::decode(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// View with leading unit (batch) dimensions squeezed away
    pub fn view2(&self) -> Result<ArrayView2<'_, f32>> {
        let mut dims = self.shape.as_slice();
        while dims.len() > 2 && dims[0] == 1 {
            dims = &dims[1..];
        }

        match dims {
            [rows, cols] => ArrayView2::from_shape((*rows, *cols), &self.data)
                .map_err(|e| DetectorError::decode(e.to_string())),
            _ => Err(DetectorError::decode(format!(
                "expected a 2-D detection tensor, got shape {:?}",
                self.shape
            ))),
        }
    }
}

/// A ready-to-run model session
#[async_trait]
pub trait InferenceSession: Send + Sync {
    /// Backend the session was created on
    fn backend(&self) -> ExecutionBackend;

    /// Run one letterboxed `1 x 3 x S x S` tensor through the model
    async fn run(&self, input: Array4<f32>) -> Result<RawOutput>;
}

/// Shared, reference-counted session
pub type SessionHandle = Arc<dyn InferenceSession>;

/// Builds sessions from model bytes on a given backend
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, model: &[u8], backend: ExecutionBackend) -> Result<SessionHandle>;
}
