use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::PoolError;
use crate::message::SerializedTensor;

type Waiter = oneshot::Sender<Result<SerializedTensor, PoolError>>;

/// Per-worker table of in-flight requests.
///
/// Request ids are assigned monotonically and scoped to this table: two
/// workers may be carrying the same numeric id at the same time without
/// collision, because correlation is always (worker, id). Each entry is a
/// single-use waiter, resolved at most once; entries are removed as they
/// resolve, so an id can only be consumed one time. Completion order is
/// unconstrained — every entry is tracked independently.
///
/// The table is touched from exactly two places: the issuing call
/// (`register`) and the router task that owns this worker's event channel
/// (`resolve`, `fail_all`). DashMap covers that two-party access.
#[derive(Debug)]
pub struct RequestTable {
    worker: Uuid,
    next_id: AtomicU64,
    pending: DashMap<u64, Waiter>,
}

impl RequestTable {
    pub fn new(worker: Uuid) -> Self {
        Self {
            worker,
            next_id: AtomicU64::new(0),
            pending: DashMap::new(),
        }
    }

    pub fn worker(&self) -> Uuid {
        self.worker
    }

    /// Allocate the next request id and register its waiter.
    pub fn register(&self) -> (u64, oneshot::Receiver<Result<SerializedTensor, PoolError>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Resolve the waiter registered under `id`. An unknown id is a protocol
    /// violation — the worker answered a request it was never given, or the
    /// response was already consumed — and is returned as a fatal error, not
    /// swallowed.
    pub fn resolve(
        &self,
        id: u64,
        result: Result<SerializedTensor, PoolError>,
    ) -> Result<(), PoolError> {
        match self.pending.remove(&id) {
            Some((_, waiter)) => {
                // The caller may have stopped waiting; that is its business.
                let _ = waiter.send(result);
                Ok(())
            }
            None => Err(PoolError::Protocol {
                worker: self.worker,
                id,
            }),
        }
    }

    /// Drop a registration that never made it onto the wire.
    pub fn discard(&self, id: u64) {
        self.pending.remove(&id);
    }

    /// Resolve every pending request with an error produced by `make`. Used
    /// at teardown (`Destroyed`) and when a worker dies with requests in
    /// flight — waiters are failed, never left hanging.
    pub fn fail_all(&self, make: impl Fn() -> PoolError) {
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.send(Err(make()));
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
