use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backend::PipelineBackend;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::message::{
    HostMessage, LoadProgress, ProgressEvent, ProgressSink, SerializedTensor, WorkerMessage,
};
use crate::multiplex::RequestTable;

const CMD_CHANNEL_CAPACITY: usize = 32;

/// Lifecycle of an execution context. Legal transitions are
/// spawned → initializing → ready and spawned → initializing →
/// terminated; ready → terminated only through pool teardown or an
/// unrecoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Spawned = 0,
    Initializing = 1,
    Ready = 2,
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Spawned,
            1 => WorkerState::Initializing,
            2 => WorkerState::Ready,
            _ => WorkerState::Terminated,
        }
    }
}

/// Terminal handshake outcome a worker's router reports to the supervisor:
/// `Ok` for Ready, `Err` with the failure description for Error.
#[derive(Debug)]
pub(crate) struct HandshakeEvent {
    pub worker: Uuid,
    pub outcome: Result<(), String>,
}

/// Host-side handle to one execution context.
///
/// The worker owns its session exclusively; the handle communicates with it
/// only through messages. Dropping the handle (or terminating it through the
/// pool) aborts the worker task; the router then fails every in-flight
/// request with [`PoolError::Destroyed`] rather than leaving waiters
/// hanging.
pub struct WorkerHandle {
    id: Uuid,
    cmd_tx: mpsc::Sender<HostMessage>,
    table: Arc<RequestTable>,
    state: Arc<AtomicU8>,
    worker_task: JoinHandle<()>,
    router_task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Issue one unit of work and wait for its correlated result.
    ///
    /// The request id is assigned monotonically and tracked in this worker's
    /// table, so several calls may be in flight at once and complete in any
    /// order. After teardown this fails immediately with `Destroyed`.
    pub async fn run(&self, input: impl Into<String>) -> Result<SerializedTensor, PoolError> {
        if self.state() == WorkerState::Terminated {
            return Err(PoolError::Destroyed);
        }
        let (id, rx) = self.table.register();
        let sent = self
            .cmd_tx
            .send(HostMessage::Run {
                id,
                input: input.into(),
            })
            .await;
        if sent.is_err() {
            self.table.discard(id);
            return Err(PoolError::Destroyed);
        }
        match rx.await {
            Ok(result) => result,
            // Router gone without resolving us: the worker was torn down
            // between send and resolve.
            Err(_) => Err(PoolError::Destroyed),
        }
    }

    /// Send the `Init` message that starts the handshake.
    pub(crate) async fn init(&self, config: PoolConfig) -> Result<(), PoolError> {
        self.cmd_tx
            .send(HostMessage::Init { config })
            .await
            .map_err(|_| PoolError::Destroyed)
    }

    /// Terminate unconditionally, in-flight work included. Idempotent.
    pub(crate) fn terminate(&self) {
        self.state
            .store(WorkerState::Terminated as u8, Ordering::SeqCst);
        self.worker_task.abort();
    }

    /// Wait for the router to finish draining; every pending request is
    /// resolved by the time this returns.
    pub(crate) async fn join_router(&mut self) {
        if let Some(task) = self.router_task.take() {
            let _ = task.await;
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.table.in_flight()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Spawn one execution context: the worker task that owns the backend
/// session and the host-side router task that forwards its events.
pub(crate) fn spawn_worker(
    backend: Box<dyn PipelineBackend>,
    progress: Option<ProgressSink>,
    handshake_tx: mpsc::UnboundedSender<HandshakeEvent>,
) -> WorkerHandle {
    let id = Uuid::new_v4();
    let state = Arc::new(AtomicU8::new(WorkerState::Spawned as u8));
    let table = Arc::new(RequestTable::new(id));

    let (cmd_tx, cmd_rx) = mpsc::channel::<HostMessage>(CMD_CHANNEL_CAPACITY);
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let worker_task = tokio::spawn(worker_loop(id, backend, cmd_rx, evt_tx, state.clone()));
    let router_task = tokio::spawn(router_loop(
        id,
        evt_rx,
        table.clone(),
        progress,
        handshake_tx,
        state.clone(),
    ));

    WorkerHandle {
        id,
        cmd_tx,
        table,
        state,
        worker_task,
        router_task: Some(router_task),
    }
}

/// The execution context itself: exclusive owner of one backend session,
/// fed by the command channel, speaking back only through `evt_tx`. Message
/// order on each channel is preserved; a terminal `Error` ends the loop.
async fn worker_loop(
    id: Uuid,
    mut backend: Box<dyn PipelineBackend>,
    mut cmd_rx: mpsc::Receiver<HostMessage>,
    evt_tx: mpsc::UnboundedSender<WorkerMessage>,
    state: Arc<AtomicU8>,
) {
    let mut initialized = false;

    while let Some(msg) = cmd_rx.recv().await {
        match msg {
            HostMessage::Init { config } => {
                if initialized {
                    let _ = evt_tx.send(WorkerMessage::Error {
                        message: "init received twice".to_string(),
                    });
                    break;
                }
                state.store(WorkerState::Initializing as u8, Ordering::SeqCst);

                // Loading progress is forwarded while init runs; the
                // forwarder is drained before the terminal message so
                // Progress never trails Ready/Error.
                let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<LoadProgress>();
                let forward_tx = evt_tx.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(p) = progress_rx.recv().await {
                        if forward_tx.send(WorkerMessage::Progress(p)).is_err() {
                            break;
                        }
                    }
                });

                let outcome = backend.init(&config, &progress_tx).await;
                drop(progress_tx);
                let _ = forwarder.await;

                match outcome {
                    Ok(()) => {
                        initialized = true;
                        let _ = evt_tx.send(WorkerMessage::Ready);
                    }
                    Err(e) => {
                        let _ = evt_tx.send(WorkerMessage::Error {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
            HostMessage::Run { id: request, input } => {
                if !initialized {
                    let _ = evt_tx.send(WorkerMessage::Error {
                        message: "run received before init completed".to_string(),
                    });
                    break;
                }
                match backend.run(&input).await {
                    Ok(tensor) => {
                        let _ = evt_tx.send(WorkerMessage::Result {
                            id: request,
                            tensor,
                        });
                    }
                    // A failed run is unrecoverable for this session: there
                    // is no per-request retry, so the context goes terminal.
                    Err(e) => {
                        let _ = evt_tx.send(WorkerMessage::Error {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }
    debug!(worker = %id, "worker loop ended");
}

/// Host-side router for one worker: forwards Progress to the external sink,
/// reports the terminal handshake message to the supervisor and resolves
/// Results through the request table. Runs until the worker's event channel
/// closes, then fails whatever is still pending so no waiter is abandoned.
async fn router_loop(
    id: Uuid,
    mut evt_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    table: Arc<RequestTable>,
    progress: Option<ProgressSink>,
    handshake_tx: mpsc::UnboundedSender<HandshakeEvent>,
    state: Arc<AtomicU8>,
) {
    while let Some(msg) = evt_rx.recv().await {
        match msg {
            WorkerMessage::Progress(p) => {
                if let Some(sink) = &progress {
                    let _ = sink.send(ProgressEvent::Load {
                        worker: id,
                        progress: p,
                    });
                }
            }
            WorkerMessage::Ready => {
                state.store(WorkerState::Ready as u8, Ordering::SeqCst);
                debug!(worker = %id, "worker ready");
                let _ = handshake_tx.send(HandshakeEvent {
                    worker: id,
                    outcome: Ok(()),
                });
            }
            WorkerMessage::Error { message } => {
                warn!(worker = %id, %message, "worker reported terminal error");
                state.store(WorkerState::Terminated as u8, Ordering::SeqCst);
                // During the handshake this fails pool construction; after
                // it, the supervisor is no longer listening and the send is
                // a no-op.
                let _ = handshake_tx.send(HandshakeEvent {
                    worker: id,
                    outcome: Err(message.clone()),
                });
                table.fail_all(|| PoolError::Backend(message.clone()));
                break;
            }
            WorkerMessage::Result { id: request, tensor } => {
                if let Err(violation) = table.resolve(request, Ok(tensor)) {
                    // Integrity fault on the host/worker contract. Loud and
                    // terminal: everything pending on this worker fails and
                    // routing stops.
                    error!(
                        worker = %id,
                        request,
                        "protocol violation: result for unknown request id"
                    );
                    state.store(WorkerState::Terminated as u8, Ordering::SeqCst);
                    table.fail_all(|| violation.clone());
                    break;
                }
            }
        }
    }

    // Event channel closed: the worker is gone. Resolve leftovers instead of
    // abandoning them.
    state.store(WorkerState::Terminated as u8, Ordering::SeqCst);
    table.fail_all(|| PoolError::Destroyed);
}
