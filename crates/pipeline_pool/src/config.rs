use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::PoolError;

/// Identity key of a pool: task kind, model identifier and option set.
/// Immutable once a pool has been opened from it; any change means
/// destroying the pool and opening a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub task: TaskKind,
    pub model: String,
    #[serde(default)]
    pub options: PipelineOptions,
}

impl PoolConfig {
    pub fn new(task: TaskKind, model: impl Into<String>) -> Self {
        Self {
            task,
            model: model.into(),
            options: PipelineOptions::default(),
        }
    }

    /// Feature-extraction config for `model` with default options.
    pub fn feature_extraction(model: impl Into<String>) -> Self {
        Self::new(TaskKind::FeatureExtraction, model)
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Reject configurations no worker should ever be spawned for.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.model.trim().is_empty() {
            return Err(PoolError::InvalidConfig(
                "model identifier is empty".to_string(),
            ));
        }
        if self.options.dims == 0 {
            return Err(PoolError::InvalidConfig(
                "embedding dimension must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The kind of computation every worker in a pool hosts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    EnumString,
    AsRefStr,
    Display,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    #[default]
    FeatureExtraction,
    SentenceSimilarity,
    TextClassification,
}

/// How token-level features are collapsed into one vector.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    EnumString,
    AsRefStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    None,
    #[default]
    Mean,
    Cls,
}

/// Options carried inside `Init`. Anything non-transferable (the progress
/// sink in particular) travels out-of-band and is never part of this
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineOptions {
    /// Model revision to load.
    pub revision: String,
    /// Prefer the quantized weights when the runtime offers both.
    pub quantized: bool,
    pub pooling: Pooling,
    /// L2-normalize the pooled vector.
    pub normalize: bool,
    /// Output embedding width.
    pub dims: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            revision: "main".to_string(),
            quantized: true,
            pooling: Pooling::Mean,
            normalize: true,
            dims: 384,
        }
    }
}
