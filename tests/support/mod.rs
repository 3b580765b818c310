//! Fakes shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use ndarray::Array4;
use plate_detector::error::{DetectorError, Result};
use plate_detector::model::{
    ExecutionBackend, InferenceSession, RawOutput, SessionFactory, SessionHandle,
};
use plate_detector::{ModelLoader, PlateDetector, PlateDetectorConfig};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Session returning a fixed output tensor
pub struct FakeSession {
    pub backend: ExecutionBackend,
    pub output: RawOutput,
    pub runs: AtomicUsize,
}

impl FakeSession {
    pub fn new(output: RawOutput) -> Self {
        Self {
            backend: ExecutionBackend::Cpu,
            output,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceSession for FakeSession {
    fn backend(&self) -> ExecutionBackend {
        self.backend
    }

    async fn run(&self, input: Array4<f32>) -> Result<RawOutput> {
        assert_eq!(input.dim(), (1, 3, 640, 640));
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Session whose every run fails
pub struct FailingSession;

#[async_trait]
impl InferenceSession for FailingSession {
    fn backend(&self) -> ExecutionBackend {
        ExecutionBackend::Cuda
    }

    async fn run(&self, _input: Array4<f32>) -> Result<RawOutput> {
        Err(DetectorError::inference("device lost"))
    }
}

/// Factory counting builds; backends listed in `failing` refuse to build
pub struct CountingFactory {
    pub created: AtomicUsize,
    pub attempts: Mutex<Vec<ExecutionBackend>>,
    pub payloads: Mutex<Vec<Vec<u8>>>,
    pub failing: Mutex<Vec<ExecutionBackend>>,
    pub delay: Duration,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(backends: &[ExecutionBackend]) -> Self {
        let factory = Self::new();
        *factory.failing.lock().unwrap() = backends.to_vec();
        factory
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for CountingFactory {
    async fn create(&self, model: &[u8], backend: ExecutionBackend) -> Result<SessionHandle> {
        self.attempts.lock().unwrap().push(backend);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.lock().unwrap().contains(&backend) {
            return Err(DetectorError::backend(backend, "provider not available"));
        }

        self.payloads.lock().unwrap().push(model.to_vec());
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut session = FakeSession::new(empty_output());
        session.backend = backend;
        Ok(Arc::new(session))
    }
}

/// Bytes that pass payload validation
pub const MODEL_BYTES: &[u8] = &[0x08, 0x07, 0x12, 0x04, b'o', b'n', b'n', b'x'];

pub fn empty_output() -> RawOutput {
    RawOutput::new(vec![1, 7, 6], vec![0.0; 42]).unwrap()
}

/// `[1, rows, 6]` output from detection rows
pub fn rows_output(rows: &[[f32; 6]]) -> RawOutput {
    let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
    RawOutput::new(vec![1, rows.len(), 6], data).unwrap()
}

/// Same values with the last two axes swapped
pub fn transposed(raw: &RawOutput) -> RawOutput {
    let (n, v) = (raw.shape[1], raw.shape[2]);
    let mut data = vec![0.0; n * v];
    for i in 0..n {
        for j in 0..v {
            data[j * n + i] = raw.data[i * v + j];
        }
    }
    RawOutput::new(vec![1, v, n], data).unwrap()
}

pub fn detector_with_output(output: RawOutput) -> (PlateDetector, Arc<FakeSession>) {
    let session = Arc::new(FakeSession::new(output));
    let loader = ModelLoader::from_session(session.clone());
    let detector = PlateDetector::new(Arc::new(loader), &PlateDetectorConfig::default());
    (detector, session)
}

pub fn blank_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    blank_image(width, height)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}
