use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::try_join_all;
use tracing::debug;

use crate::error::PoolError;
use crate::message::{ProgressEvent, ProgressSink, SerializedTensor};
use crate::pool::PipelinePool;

/// How an input sequence is split across workers. The contract: the returned
/// ranges are contiguous, non-overlapping, in ascending order, and their
/// union is exactly `0..len`; at most `parts` ranges come back and range `i`
/// is handled by worker `i`.
pub trait Partitioner: Send + Sync {
    fn partition(&self, len: usize, parts: usize) -> Vec<Range<usize>>;
}

/// Static contiguous chunking with chunk size `ceil(len / parts)`.
///
/// Simple and predictable, but it never rebalances: a fast worker can sit
/// idle while a slow one still has items queued. Swapping in a smarter
/// policy is a matter of implementing [`Partitioner`]; nothing in the pool
/// or multiplexer changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContiguousChunks;

impl Partitioner for ContiguousChunks {
    fn partition(&self, len: usize, parts: usize) -> Vec<Range<usize>> {
        if parts == 0 || len == 0 {
            return Vec::new();
        }
        let chunk = len.div_ceil(parts);
        (0..parts)
            .map(|i| (i * chunk).min(len)..((i + 1) * chunk).min(len))
            .filter(|range| !range.is_empty())
            .collect()
    }
}

/// Distribute `items` across the pool and collect the results in input
/// order.
pub async fn dispatch(
    pool: &PipelinePool,
    items: &[String],
    progress: Option<&ProgressSink>,
) -> Result<Vec<SerializedTensor>, PoolError> {
    dispatch_with(pool, items, &ContiguousChunks, progress).await
}

/// [`dispatch`] with an explicit partitioning policy.
///
/// Each worker processes its chunk sequentially while the chunks run
/// concurrently with each other. After every completed item — in true
/// completion order, whichever worker it came from — the sink receives an
/// `Item` event. The aggregate fails as soon as any chunk fails; there is no
/// partial success. Results are concatenated by ascending worker index,
/// which for contiguous chunks is exactly the input order, regardless of
/// which worker finished first.
pub async fn dispatch_with(
    pool: &PipelinePool,
    items: &[String],
    partitioner: &dyn Partitioner,
    progress: Option<&ProgressSink>,
) -> Result<Vec<SerializedTensor>, PoolError> {
    if !pool.is_usable() {
        return Err(PoolError::Destroyed);
    }
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let ranges = partitioner.partition(total, pool.size());
    debug!(items = total, workers = pool.size(), chunks = ranges.len(), "dispatching");

    let completed = AtomicUsize::new(0);
    let completed = &completed;
    let batches = try_join_all(ranges.into_iter().enumerate().map(|(slot, range)| {
        let worker = &pool.workers()[slot];
        async move {
            let mut batch = Vec::with_capacity(range.len());
            for item in &items[range] {
                let tensor = worker.run(item.as_str()).await?;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(sink) = progress {
                    let _ = sink.send(ProgressEvent::Item {
                        completed: done,
                        total,
                    });
                }
                batch.push(tensor);
            }
            Ok::<_, PoolError>(batch)
        }
    }))
    .await?;

    let mut out = Vec::with_capacity(total);
    for batch in batches {
        out.extend(batch);
    }
    Ok(out)
}
