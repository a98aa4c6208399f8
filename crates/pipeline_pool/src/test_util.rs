//! Scriptable backends shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{LoadProgressSink, PipelineBackend, PipelineFactory};
use crate::config::{PoolConfig, TaskKind};
use crate::error::{PoolError, Result};
use crate::message::{LoadProgress, ProgressEvent, SerializedTensor};

pub(crate) fn test_config() -> PoolConfig {
    PoolConfig::feature_extraction("test/model")
}

/// Deterministic echo backend: the result tensor encodes the input, so a
/// test can check that every caller got the answer to its own question.
#[derive(Default)]
pub(crate) struct EchoBackend {
    progress_steps: usize,
    delay_ms: u64,
    /// Per-input delay overrides, for ordering tests.
    delays: HashMap<String, u64>,
    fail_on: Option<String>,
}

impl EchoBackend {
    pub(crate) fn with_progress_steps(mut self, steps: usize) -> Self {
        self.progress_steps = steps;
        self
    }

    pub(crate) fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub(crate) fn with_input_delay(mut self, input: &str, ms: u64) -> Self {
        self.delays.insert(input.to_string(), ms);
        self
    }

    pub(crate) fn failing_on(mut self, input: &str) -> Self {
        self.fail_on = Some(input.to_string());
        self
    }

    /// The tensor [`run`](PipelineBackend::run) produces for `input`.
    pub(crate) fn expected(input: &str) -> SerializedTensor {
        let sum: u32 = input.bytes().map(u32::from).sum();
        SerializedTensor::vector(vec![input.len() as f32, sum as f32])
    }
}

#[async_trait]
impl PipelineBackend for EchoBackend {
    async fn init(&mut self, _config: &PoolConfig, progress: &LoadProgressSink) -> Result<()> {
        for step in 0..self.progress_steps {
            let mut p = LoadProgress::for_file("progress", "model.onnx");
            p.progress = Some((step + 1) as f32 / self.progress_steps as f32 * 100.0);
            let _ = progress.send(p);
        }
        Ok(())
    }

    async fn run(&mut self, input: &str) -> Result<SerializedTensor> {
        if self.fail_on.as_deref() == Some(input) {
            return Err(PoolError::Backend(format!("refusing input {input:?}")));
        }
        let delay = self.delays.get(input).copied().unwrap_or(self.delay_ms);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(Self::expected(input))
    }
}

/// Backend whose init always fails.
pub(crate) struct FailingInitBackend {
    message: String,
}

impl FailingInitBackend {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl PipelineBackend for FailingInitBackend {
    async fn init(&mut self, _config: &PoolConfig, _progress: &LoadProgressSink) -> Result<()> {
        Err(PoolError::Backend(self.message.clone()))
    }

    async fn run(&mut self, _input: &str) -> Result<SerializedTensor> {
        Err(PoolError::Backend("never initialized".to_string()))
    }
}

/// Factory handing out a scripted backend per worker index, in creation
/// order.
pub(crate) struct ScriptedFactory {
    make: Box<dyn Fn(usize) -> Box<dyn PipelineBackend> + Send + Sync>,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub(crate) fn new(
        make: impl Fn(usize) -> Box<dyn PipelineBackend> + Send + Sync + 'static,
    ) -> Self {
        Self {
            make: Box::new(make),
            created: AtomicUsize::new(0),
        }
    }

    pub(crate) fn echo() -> Self {
        Self::new(|_| Box::new(EchoBackend::default()))
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl PipelineFactory for ScriptedFactory {
    fn create(&self, _config: &PoolConfig) -> Result<Box<dyn PipelineBackend>> {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        Ok((self.make)(index))
    }
}

/// Factory that rejects a task kind up front, before anything is spawned.
pub(crate) struct TaskBoundFactory {
    supported: TaskKind,
    inner: ScriptedFactory,
}

impl TaskBoundFactory {
    pub(crate) fn new(supported: TaskKind) -> Self {
        Self {
            supported,
            inner: ScriptedFactory::echo(),
        }
    }
}

impl PipelineFactory for TaskBoundFactory {
    fn create(&self, config: &PoolConfig) -> Result<Box<dyn PipelineBackend>> {
        if config.task != self.supported {
            return Err(PoolError::InvalidConfig(format!(
                "task {} is not supported",
                config.task
            )));
        }
        self.inner.create(config)
    }
}

/// Drain whatever progress events are already buffered.
pub(crate) fn collect_progress(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

/// Shared completion log for ordering assertions.
pub(crate) type CompletionLog = Arc<std::sync::Mutex<Vec<String>>>;

/// Backend that records every input it finishes, with per-input delays.
pub(crate) struct RecordingBackend {
    inner: EchoBackend,
    log: CompletionLog,
}

impl RecordingBackend {
    pub(crate) fn new(log: CompletionLog, delays: &[(&str, u64)]) -> Self {
        let mut inner = EchoBackend::default();
        for (input, ms) in delays {
            inner = inner.with_input_delay(input, *ms);
        }
        Self { inner, log }
    }
}

#[async_trait]
impl PipelineBackend for RecordingBackend {
    async fn init(&mut self, config: &PoolConfig, progress: &LoadProgressSink) -> Result<()> {
        self.inner.init(config, progress).await
    }

    async fn run(&mut self, input: &str) -> Result<SerializedTensor> {
        let tensor = self.inner.run(input).await?;
        self.log.lock().unwrap().push(input.to_string());
        Ok(tensor)
    }
}
