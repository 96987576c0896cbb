// Per-protocol task executors
// Member changes for one protocol run one at a time, in submission order,
// while different protocols never wait on each other

use std::{
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, warn};

use batata_consistency::{ConsistencyError, ProtocolKind, Result};

type Task = BoxFuture<'static, Result<()>>;

/// Single-worker executor running submitted tasks strictly in order
pub struct SerialExecutor {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SerialExecutor {
    /// Create the executor and spawn its worker on the current runtime
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(Self::run(name.clone(), receiver, pending.clone()));

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            pending,
        }
    }

    async fn run(name: String, mut receiver: mpsc::UnboundedReceiver<Task>, pending: Arc<AtomicUsize>) {
        debug!(executor = %name, "Executor worker started");

        while let Some(task) = receiver.recv().await {
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            let remaining = pending.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
            gauge!("protocol_executor_pending", "executor" => name.clone()).set(remaining as f64);

            match outcome {
                Ok(Ok(())) => {
                    counter!("protocol_member_change_total", "executor" => name.clone()).increment(1);
                }
                Ok(Err(e)) => {
                    error!(executor = %name, error = %e, "Task failed");
                    counter!("protocol_member_change_errors_total", "executor" => name.clone())
                        .increment(1);
                }
                Err(_) => {
                    error!(executor = %name, "Task panicked");
                    counter!("protocol_member_change_errors_total", "executor" => name.clone())
                        .increment(1);
                }
            }
        }

        debug!(executor = %name, "Executor worker stopped");
    }

    /// Queue a task behind every previously submitted one
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(ConsistencyError::ExecutorClosed(self.name.clone()));
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        sender.send(task.boxed()).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            ConsistencyError::ExecutorClosed(self.name.clone())
        })
    }

    /// Tasks submitted but not finished yet
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting tasks and let queued ones drain.
    ///
    /// Returns `false` when the queue did not drain within `drain_timeout`;
    /// the worker is then aborted and the remaining tasks are dropped.
    pub async fn shutdown(&self, drain_timeout: Duration) -> bool {
        drop(self.sender.lock().take());
        let Some(mut worker) = self.worker.lock().take() else {
            return true;
        };

        match tokio::time::timeout(drain_timeout, &mut worker).await {
            Ok(_) => true,
            Err(_) => {
                worker.abort();
                warn!(
                    executor = %self.name,
                    dropped = self.pending(),
                    "Executor did not drain in {:?}, dropping queued tasks",
                    drain_timeout
                );
                false
            }
        }
    }
}

/// One serial executor per protocol kind
#[derive(Debug)]
pub struct ProtocolExecutor {
    executors: HashMap<ProtocolKind, SerialExecutor>,
}

impl ProtocolExecutor {
    pub fn new(kinds: impl IntoIterator<Item = ProtocolKind>) -> Self {
        let executors = kinds
            .into_iter()
            .map(|kind| (kind, SerialExecutor::new(format!("protocol-{}", kind.as_str().to_lowercase()))))
            .collect();
        Self { executors }
    }

    /// Queue a member change for one protocol kind
    pub fn member_change<F>(&self, kind: ProtocolKind, task: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.executors
            .get(&kind)
            .ok_or(ConsistencyError::NotInitialized(kind))?
            .submit(task)
    }

    pub fn pending(&self, kind: ProtocolKind) -> usize {
        self.executors.get(&kind).map_or(0, SerialExecutor::pending)
    }

    pub fn kinds(&self) -> Vec<ProtocolKind> {
        let mut kinds: Vec<ProtocolKind> = self.executors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Shut every executor down concurrently.
    ///
    /// Returns the kinds whose queue had to be dropped.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Vec<ProtocolKind> {
        let results = futures::future::join_all(self.executors.iter().map(|(kind, executor)| async move {
            (*kind, executor.shutdown(drain_timeout).await)
        }))
        .await;

        let mut timed_out: Vec<ProtocolKind> = results
            .into_iter()
            .filter_map(|(kind, drained)| (!drained).then_some(kind))
            .collect();
        timed_out.sort();
        timed_out
    }
}
