//! Reference embedding backend.
//!
//! `HashingPipeline` is a deterministic, dependency-free stand-in for a real
//! model runtime: token and character-trigram features are hashed into a
//! fixed-width vector, pooled, and optionally L2-normalized. It exists so
//! the pool runs end-to-end out of the box; a real runtime plugs in through
//! [`PipelineFactory`] without touching anything else.

use async_trait::async_trait;
use pipeline_pool::{
    LoadProgress, LoadProgressSink, PipelineBackend, PipelineFactory, PoolConfig, PoolError,
    Pooling, SerializedTensor, TaskKind,
};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET ^ seed;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

pub struct HashingPipeline {
    dims: usize,
    pooling: Pooling,
    normalize: bool,
    /// Derived from model + revision so distinct models embed differently.
    salt: u64,
}

impl HashingPipeline {
    pub fn new() -> Self {
        Self {
            dims: 0,
            pooling: Pooling::Mean,
            normalize: true,
            salt: 0,
        }
    }

    fn fold_token(&self, token: &str, acc: &mut [f32]) {
        let bytes = token.as_bytes();
        self.fold_feature(fnv1a(self.salt, bytes), acc);
        for gram in bytes.windows(3) {
            self.fold_feature(fnv1a(self.salt.rotate_left(17), gram), acc);
        }
    }

    fn fold_feature(&self, hash: u64, acc: &mut [f32]) {
        let bucket = (hash % self.dims as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        acc[bucket] += sign;
    }
}

impl Default for HashingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineBackend for HashingPipeline {
    async fn init(
        &mut self,
        config: &PoolConfig,
        progress: &LoadProgressSink,
    ) -> Result<(), PoolError> {
        self.dims = config.options.dims;
        self.pooling = config.options.pooling;
        self.normalize = config.options.normalize;
        self.salt = fnv1a(
            0,
            format!("{}@{}", config.model, config.options.revision).as_bytes(),
        );

        let weights = if config.options.quantized {
            "model_quantized.onnx"
        } else {
            "model.onnx"
        };
        for file in ["tokenizer.json", "config.json", weights] {
            let _ = progress.send(LoadProgress::for_file("initiate", file));
            let mut done = LoadProgress::for_file("done", file);
            done.progress = Some(100.0);
            let _ = progress.send(done);
        }
        Ok(())
    }

    async fn run(&mut self, input: &str) -> Result<SerializedTensor, PoolError> {
        if self.dims == 0 {
            return Err(PoolError::Backend(
                "pipeline used before init".to_string(),
            ));
        }
        let mut acc = vec![0f32; self.dims];
        let mut tokens = 0usize;

        for token in input
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            match self.pooling {
                Pooling::Cls if tokens > 0 => {}
                _ => self.fold_token(&token, &mut acc),
            }
            tokens += 1;
        }

        if self.pooling == Pooling::Mean && tokens > 0 {
            let inv = 1.0 / tokens as f32;
            for x in acc.iter_mut() {
                *x *= inv;
            }
        }

        if self.normalize {
            let norm = acc.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in acc.iter_mut() {
                    *x /= norm;
                }
            }
        }

        Ok(SerializedTensor::vector(acc))
    }
}

/// Hands every worker its own [`HashingPipeline`] session.
pub struct HashingPipelineFactory;

impl PipelineFactory for HashingPipelineFactory {
    fn create(&self, config: &PoolConfig) -> Result<Box<dyn PipelineBackend>, PoolError> {
        match config.task {
            TaskKind::FeatureExtraction | TaskKind::SentenceSimilarity => {
                Ok(Box::new(HashingPipeline::new()))
            }
            other => Err(PoolError::InvalidConfig(format!(
                "task {other} is not supported by the hashing pipeline"
            ))),
        }
    }
}
