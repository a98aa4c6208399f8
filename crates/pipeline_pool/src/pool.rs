use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::PipelineFactory;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::message::ProgressSink;
use crate::worker::{HandshakeEvent, WorkerHandle, spawn_worker};

/// A fixed-size pool of execution contexts for one [`PoolConfig`].
///
/// [`open`](PipelinePool::open) resolves only once every worker has finished
/// its init→ready handshake, so a `PipelinePool` value is usable by
/// construction — partial readiness is never observable. Teardown is
/// all-at-once and idempotent; pending requests are resolved with
/// [`PoolError::Destroyed`] rather than abandoned, and anything issued
/// afterwards fails the same way. There is no live reconfiguration: a
/// different config means destroying this pool and opening a new one.
pub struct PipelinePool {
    config: PoolConfig,
    workers: Vec<WorkerHandle>,
    destroyed: bool,
}

impl PipelinePool {
    /// Spawn `size` workers, send each an `Init`, and wait for all of them
    /// to report ready.
    ///
    /// Construction is all-or-nothing: the first worker to report an init
    /// error terminates every worker already spawned and the whole call
    /// fails with [`PoolError::Init`]. Configuration problems are rejected
    /// before anything is spawned.
    pub async fn open(
        config: PoolConfig,
        size: usize,
        factory: &dyn PipelineFactory,
        progress: Option<ProgressSink>,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::EmptyPool);
        }
        config.validate()?;

        // Create every session up front so a factory rejection happens
        // before a single worker exists.
        let mut backends = Vec::with_capacity(size);
        for _ in 0..size {
            backends.push(factory.create(&config)?);
        }

        let (handshake_tx, mut handshake_rx) = mpsc::unbounded_channel::<HandshakeEvent>();
        let mut workers = Vec::with_capacity(size);
        for backend in backends {
            let handle = spawn_worker(backend, progress.clone(), handshake_tx.clone());
            handle.init(config.clone()).await?;
            workers.push(handle);
        }
        drop(handshake_tx);
        debug!(
            workers = size,
            model = %config.model,
            task = %config.task,
            "pool spawned, waiting for readiness"
        );

        let mut ready = 0usize;
        while ready < size {
            match handshake_rx.recv().await {
                Some(HandshakeEvent {
                    worker,
                    outcome: Ok(()),
                }) => {
                    ready += 1;
                    debug!(%worker, ready, total = size, "worker handshake complete");
                }
                Some(HandshakeEvent {
                    worker,
                    outcome: Err(message),
                }) => {
                    error!(%worker, %message, "worker failed to initialize, destroying pool");
                    Self::teardown(&mut workers).await;
                    return Err(PoolError::Init { worker, message });
                }
                None => {
                    // Every router exited before reporting: a worker task
                    // died without a terminal message.
                    error!("worker terminated during initialization, destroying pool");
                    Self::teardown(&mut workers).await;
                    return Err(PoolError::Init {
                        worker: Uuid::nil(),
                        message: "worker terminated during initialization".to_string(),
                    });
                }
            }
        }

        info!(workers = size, model = %config.model, "pipeline pool ready");
        Ok(Self {
            config,
            workers,
            destroyed: false,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// The pool's call handles. Only valid while the pool is usable; after
    /// [`shutdown`](PipelinePool::shutdown) every handle rejects work.
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn is_usable(&self) -> bool {
        !self.destroyed
    }

    /// Destroy the pool: terminate every worker unconditionally, in-flight
    /// requests included. Each of those requests is resolved with
    /// [`PoolError::Destroyed`] before this returns. Destroying an
    /// already-destroyed pool is a no-op.
    pub async fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        Self::teardown(&mut self.workers).await;
        info!(workers = self.workers.len(), "pipeline pool destroyed");
    }

    async fn teardown(workers: &mut [WorkerHandle]) {
        for worker in workers.iter() {
            worker.terminate();
        }
        for worker in workers.iter_mut() {
            worker.join_router().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskKind;
    use crate::message::ProgressEvent;
    use crate::test_util::{
        EchoBackend, FailingInitBackend, ScriptedFactory, TaskBoundFactory, test_config,
    };
    use crate::worker::WorkerState;

    #[tokio::test]
    async fn test_open_rejects_zero_workers() {
        let factory = ScriptedFactory::echo();
        let err = PipelinePool::open(test_config(), 0, &factory, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::EmptyPool));
        // Nothing was spawned, nothing was created.
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config_before_spawning() {
        let factory = ScriptedFactory::echo();
        let err = PipelinePool::open(
            PoolConfig::feature_extraction(""),
            4,
            &factory,
            None,
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_factory_rejection_prevents_all_spawning() {
        let factory = TaskBoundFactory::new(TaskKind::FeatureExtraction);
        let config = PoolConfig::new(TaskKind::TextClassification, "test/model");
        let err = PipelinePool::open(config, 4, &factory, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_pool_ready_once_all_workers_ready() {
        let factory = ScriptedFactory::echo();
        let pool = PipelinePool::open(test_config(), 3, &factory, None)
            .await
            .unwrap();
        assert_eq!(pool.size(), 3);
        assert!(pool.is_usable());
        for worker in pool.workers() {
            assert_eq!(worker.state(), WorkerState::Ready);
        }
        assert_eq!(factory.created(), 3);
    }

    #[tokio::test]
    async fn test_all_or_nothing_on_init_failure() {
        // Worker 1 of 3 fails its handshake; the pool never becomes usable.
        let factory = ScriptedFactory::new(|index| {
            if index == 1 {
                Box::new(FailingInitBackend::new("corrupt weights"))
            } else {
                Box::new(EchoBackend::default().with_delay_ms(0))
            }
        });
        let err = PipelinePool::open(test_config(), 3, &factory, None)
            .await
            .err()
            .unwrap();
        match err {
            PoolError::Init { message, .. } => {
                assert!(message.contains("corrupt weights"), "message: {message}");
            }
            other => panic!("expected init failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_progress_is_forwarded() {
        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();
        let factory =
            ScriptedFactory::new(|_| Box::new(EchoBackend::default().with_progress_steps(2)));
        let pool = PipelinePool::open(test_config(), 2, &factory, Some(progress_tx))
            .await
            .unwrap();

        let mut load_events = 0;
        while let Ok(ev) = progress_rx.try_recv() {
            if matches!(ev, ProgressEvent::Load { .. }) {
                load_events += 1;
            }
        }
        assert_eq!(load_events, 4); // 2 workers x 2 steps

        drop(pool);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_rejects_later_work() {
        let factory = ScriptedFactory::echo();
        let mut pool = PipelinePool::open(test_config(), 2, &factory, None)
            .await
            .unwrap();

        pool.shutdown().await;
        assert!(!pool.is_usable());

        // Second teardown: no-op, no panic.
        pool.shutdown().await;
        assert!(!pool.is_usable());

        // Handles survive but refuse work, predictably.
        let err = pool.workers()[0].run("late").await.unwrap_err();
        assert!(matches!(err, PoolError::Destroyed));
    }

    #[tokio::test]
    async fn test_teardown_resolves_in_flight_requests() {
        let factory = ScriptedFactory::new(|_| Box::new(EchoBackend::default().with_delay_ms(5_000)));
        let pool = PipelinePool::open(test_config(), 1, &factory, None)
            .await
            .unwrap();

        let handle = &pool.workers()[0];
        let (result, ()) = tokio::join!(handle.run("stuck"), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            // What shutdown does to each worker, without needing &mut pool
            // while the request future still borrows it.
            handle.terminate();
        });
        assert!(matches!(result, Err(PoolError::Destroyed)));
    }

    #[tokio::test]
    async fn test_same_request_ids_in_two_workers_do_not_collide() {
        let factory = ScriptedFactory::echo();
        let pool = PipelinePool::open(test_config(), 2, &factory, None)
            .await
            .unwrap();

        // Both workers assign id 0 to their first request; answers must not
        // cross.
        let (a, b) = tokio::join!(
            pool.workers()[0].run("alpha"),
            pool.workers()[1].run("beta"),
        );
        assert_eq!(a.unwrap(), EchoBackend::expected("alpha"));
        assert_eq!(b.unwrap(), EchoBackend::expected("beta"));
    }
}
