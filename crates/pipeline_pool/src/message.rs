use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::config::PoolConfig;

/// Message sent from the host to one execution context. The protocol is
/// closed: these two variants and the four [`WorkerMessage`] variants are the
/// entire host/worker contract.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Configure the worker and begin loading its pipeline session.
    Init { config: PoolConfig },
    /// Execute one unit of work. `id` is unique within the receiving worker.
    Run { id: u64, input: String },
}

/// Message sent from an execution context back to the host.
///
/// `Ready` and `Error` are terminal handshake messages: a worker emits zero
/// or more `Progress` messages and then exactly one of the two. After
/// `Ready`, the only traffic is `Result` (or a terminal `Error` when the
/// session fails unrecoverably mid-run).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    Progress(LoadProgress),
    Ready,
    Error { message: String },
    Result { id: u64, tensor: SerializedTensor },
}

/// Non-terminal loading progress reported by a pipeline session while it
/// initializes, shaped after the progress events model runtimes emit per
/// downloaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadProgress {
    /// Coarse phase: "initiate", "download", "progress", "done".
    pub status: String,
    /// Artifact this event refers to, e.g. "tokenizer.json".
    pub file: Option<String>,
    /// Completion of the current artifact, 0.0..=100.0.
    pub progress: Option<f32>,
    pub loaded: Option<u64>,
    pub total: Option<u64>,
    pub at: DateTime<Utc>,
    /// Runtime-specific extras the host forwards without interpreting.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl LoadProgress {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            file: None,
            progress: None,
            loaded: None,
            total: None,
            at: Utc::now(),
            extra: HashMap::new(),
        }
    }

    pub fn for_file(status: impl Into<String>, file: impl Into<String>) -> Self {
        let mut p = Self::new(status);
        p.file = Some(file.into());
        p
    }
}

/// Element type of a serialized tensor buffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, EnumString, AsRefStr, Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    F32,
    F64,
}

/// Flat numeric buffer of a tensor, tagged by element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "dtype", content = "data", rename_all = "lowercase")]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fixed-shape numeric tensor in its serialized form: element type, flat
/// buffer, dimensions. This is what crosses the worker boundary and what
/// callers reconstruct results from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SerializedTensor {
    #[serde(flatten)]
    pub data: TensorData,
    pub dims: Vec<usize>,
}

impl SerializedTensor {
    /// Single f32 vector with shape `[1, len]`, the shape a pooled
    /// single-input pipeline call produces.
    pub fn vector(data: Vec<f32>) -> Self {
        let dims = vec![1, data.len()];
        Self {
            data: TensorData::F32(data),
            dims,
        }
    }

    pub fn dtype(&self) -> ElementType {
        match self.data {
            TensorData::F32(_) => ElementType::F32,
            TensorData::F64(_) => ElementType::F64,
        }
    }

    /// Number of elements the dims describe.
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// True when the flat buffer length matches the shape.
    pub fn shape_consistent(&self) -> bool {
        self.data.len() == self.element_count()
    }

    /// Flat f32 view of the buffer, widening-free for F32 and lossy for F64.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match &self.data {
            TensorData::F32(v) => v.clone(),
            TensorData::F64(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }
}

/// Event streamed to the external progress sink while a pool loads and while
/// a dispatch runs. `Item` events arrive in true completion order, which is
/// not input order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// A worker reported pipeline-loading progress.
    Load { worker: Uuid, progress: LoadProgress },
    /// One work item finished; `completed` of `total` are done.
    Item { completed: usize, total: usize },
}

impl ProgressEvent {
    /// Fraction of the dispatch that is complete, 0.0..=1.0, for `Item`
    /// events.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ProgressEvent::Item { completed, total } if *total > 0 => {
                Some(*completed as f64 / *total as f64)
            }
            _ => None,
        }
    }
}

/// Channel end the pool pushes [`ProgressEvent`]s into. Unbounded on
/// purpose: progress is tiny and flow control past host memory is a
/// non-goal.
pub type ProgressSink = tokio::sync::mpsc::UnboundedSender<ProgressEvent>;
