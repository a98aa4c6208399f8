//! Document embedding over the worker pool: section the document, open a
//! pool, dispatch, collect ordered vectors.

use anyhow::{Context, bail};
use pipeline_pool::{PipelinePool, PoolConfig, ProgressSink, dispatch};
use serde::Serialize;
use tracing::info;

use crate::backend::HashingPipelineFactory;
use crate::markdown::to_sections;

/// One embedded section: the vector, flat, in document order.
#[derive(Debug, Clone, Serialize)]
pub struct Embedding {
    pub section: usize,
    pub vector: Vec<f32>,
}

/// Embed every section of `document` across a pool of `workers` workers.
///
/// Preconditions are rejected before any worker is spawned: a document with
/// no sections is an error, as is a zero-size pool (rejected by the pool
/// itself). The pool lives for exactly one dispatch; the returned embeddings
/// are in section order no matter which worker finished first.
pub async fn embed_document(
    document: &str,
    config: PoolConfig,
    workers: usize,
    progress: Option<ProgressSink>,
) -> anyhow::Result<Vec<Embedding>> {
    let sections = to_sections(document);
    if sections.is_empty() {
        bail!("document has no sections to embed");
    }
    info!(sections = sections.len(), "total sections");

    let factory = HashingPipelineFactory;
    let mut pool = PipelinePool::open(config, workers, &factory, progress.clone())
        .await
        .context("unable to open pipeline pool")?;

    let items: Vec<String> = sections.into_iter().map(|s| s.content).collect();
    let result = dispatch(&pool, &items, progress.as_ref()).await;
    pool.shutdown().await;

    let tensors = result.context("embedding dispatch failed")?;
    info!(embeddings = tensors.len(), "all embeddings generated");

    Ok(tensors
        .into_iter()
        .enumerate()
        .map(|(section, tensor)| Embedding {
            section,
            vector: tensor.to_f32_vec(),
        })
        .collect())
}
