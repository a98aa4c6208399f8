//! tensorpool: document embedding over a pool of pipeline workers.
//!
//! The concurrency core lives in the `pipeline_pool` crate; this crate is
//! the deterministic rim around it — markdown sectioning, the reference
//! hashing backend, CLI plumbing, logging and schema emission.

pub mod backend;
pub mod config;
pub mod embedder;
pub mod logger;
pub mod markdown;
pub mod schema;

pub use backend::{HashingPipeline, HashingPipelineFactory};
pub use embedder::{Embedding, embed_document};
pub use markdown::{Section, Sectioner, to_sections};
