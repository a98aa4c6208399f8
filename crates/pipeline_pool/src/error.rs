use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PoolError>;

/// Error taxonomy of the pool layer.
///
/// `EmptyPool` and `InvalidConfig` are caller preconditions, rejected before
/// any worker is spawned or any message is sent. `Init` collapses a pool
/// under construction (all-or-nothing). `Protocol` is an integrity fault,
/// never a recoverable runtime condition. `Destroyed` is what a request
/// pending at teardown resolves to, and what issuing against a torn-down
/// pool returns — requests are never left unresolved.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("pool requested with zero workers")]
    EmptyPool,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("worker {worker} failed to initialize: {message}")]
    Init { worker: Uuid, message: String },

    #[error("protocol violation: worker {worker} sent a result for unknown request id {id}")]
    Protocol { worker: Uuid, id: u64 },

    #[error("pipeline pool destroyed")]
    Destroyed,

    #[error("pipeline execution failed: {0}")]
    Backend(String),
}

impl PoolError {
    /// Faults that indicate a broken host/worker invariant rather than an
    /// expected runtime condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::Protocol { .. })
    }
}
