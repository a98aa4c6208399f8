//! Actor-based pool of inference pipeline workers.
//!
//! A [`PipelinePool`] owns a fixed set of isolated workers, each hosting one
//! long-lived [`PipelineBackend`] session. The host talks to a worker only
//! through messages: an `Init` starts the load handshake (progress events,
//! then ready-or-error), `Run` requests are correlated back to their callers
//! by per-worker request ids, and [`dispatch`] spreads an input sequence
//! across the pool in contiguous chunks, returning results in input order.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod multiplex;
pub mod pool;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_util;

pub use backend::{LoadProgressSink, PipelineBackend, PipelineFactory};
pub use config::{PipelineOptions, PoolConfig, Pooling, TaskKind};
pub use dispatch::{ContiguousChunks, Partitioner, dispatch, dispatch_with};
pub use error::{PoolError, Result};
pub use message::{
    ElementType, HostMessage, LoadProgress, ProgressEvent, ProgressSink, SerializedTensor,
    TensorData, WorkerMessage,
};
pub use pool::PipelinePool;
pub use worker::{WorkerHandle, WorkerState};
