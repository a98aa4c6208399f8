use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::message::{LoadProgress, SerializedTensor};

/// Channel end a backend pushes loading progress into during `init`. The
/// worker actor forwards everything sent here to the host before the
/// terminal `Ready`/`Error` message goes out.
pub type LoadProgressSink = mpsc::UnboundedSender<LoadProgress>;

/// One stateful computation session, hosted by exactly one worker.
///
/// This is the seam the pool does not look behind: `init` loads whatever the
/// session needs (streaming progress as it goes) and returns ready-or-error;
/// `run` executes one unit of work against the loaded session. A backend is
/// owned by its worker task and never shared, so implementations need no
/// internal locking.
#[async_trait]
pub trait PipelineBackend: Send + 'static {
    async fn init(&mut self, config: &PoolConfig, progress: &LoadProgressSink) -> Result<()>;

    async fn run(&mut self, input: &str) -> Result<SerializedTensor>;
}

/// Produces one fresh [`PipelineBackend`] per worker, so sessions are never
/// shared between execution contexts. `create` runs before any worker is
/// spawned and is the place to reject configurations the backend cannot
/// serve.
pub trait PipelineFactory: Send + Sync {
    fn create(&self, config: &PoolConfig) -> Result<Box<dyn PipelineBackend>>;
}
