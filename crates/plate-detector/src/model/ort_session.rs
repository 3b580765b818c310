//! ONNX Runtime implementation of the session traits
use super::{ExecutionBackend, InferenceSession, RawOutput, SessionFactory, SessionHandle};
use crate::error::{DetectorError, Result};
use async_trait::async_trait;
use ndarray::Array4;
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::sync::{Arc, Mutex};

/// Creates ORT sessions from in-memory model bytes
#[derive(Debug, Clone)]
pub struct OrtSessionFactory {
    device_id: i32,
    intra_threads: usize,
    output_name: String,
}

impl OrtSessionFactory {
    pub fn new(device_id: i32, intra_threads: usize, output_name: impl Into<String>) -> Self {
        Self {
            device_id,
            intra_threads,
            output_name: output_name.into(),
        }
    }

    fn provider(&self, backend: ExecutionBackend) -> ExecutionProviderDispatch {
        // GPU providers error out instead of silently registering nothing.
        match backend {
            ExecutionBackend::TensorRt => TensorRTExecutionProvider::default()
                .with_device_id(self.device_id)
                .build()
                .error_on_failure(),
            ExecutionBackend::Cuda => CUDAExecutionProvider::default()
                .with_device_id(self.device_id)
                .build()
                .error_on_failure(),
            ExecutionBackend::Cpu => CPUExecutionProvider::default().build(),
        }
    }
}

#[async_trait]
impl SessionFactory for OrtSessionFactory {
    async fn create(&self, model: &[u8], backend: ExecutionBackend) -> Result<SessionHandle> {
        let build = || -> ort::Result<Session> {
            Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(self.intra_threads)?
                .with_execution_providers([self.provider(backend)])?
                .commit_from_memory(model)
        };

        let session = build().map_err(|e| DetectorError::backend(backend, e))?;

        tracing::info!(
            backend = %backend,
            device_id = self.device_id,
            intra_threads = self.intra_threads,
            "created ONNX Runtime session"
        );

        Ok(Arc::new(OrtSession {
            session: Arc::new(Mutex::new(session)),
            backend,
            output_name: self.output_name.clone(),
        }))
    }
}

/// ORT session. `Session::run` needs `&mut`, hence the mutex.
pub struct OrtSession {
    session: Arc<Mutex<Session>>,
    backend: ExecutionBackend,
    output_name: String,
}

#[async_trait]
impl InferenceSession for OrtSession {
    fn backend(&self) -> ExecutionBackend {
        self.backend
    }

    async fn run(&self, input: Array4<f32>) -> Result<RawOutput> {
        let output_name = self.output_name.clone();
        run_locked_blocking(Arc::clone(&self.session), move |session| {
            run_session(session, input, &output_name)
        })
        .await
    }
}

/// Run `f` on the blocking pool with `shared` locked, keeping inference off
/// the async workers.
async fn run_locked_blocking<T, R, F>(shared: Arc<Mutex<T>>, f: F) -> Result<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(&mut T) -> Result<R> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = shared
            .lock()
            .map_err(|e| DetectorError::inference(format!("Failed to lock session: {}", e)))?;
        f(&mut guard)
    })
    .await
    .map_err(|e| DetectorError::inference(format!("Inference task failed: {}", e)))?
}

fn run_session(session: &mut Session, input: Array4<f32>, output_name: &str) -> Result<RawOutput> {
    let input_tensor = Tensor::from_array(input)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let output_value = outputs
        .get(output_name)
        .or_else(|| outputs.get("output0"))
        .or_else(|| outputs.get("output"))
        .ok_or_else(|| {
            DetectorError::inference(format!(
                "No output tensor found (tried: {}, output0, output)",
                output_name
            ))
        })?;
    let (shape, data) = output_value.try_extract_tensor::<f32>()?;

    let shape_usize: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    RawOutput::new(shape_usize, data.to_vec())
}
