//! Worker transport
//!
//! The coordinator hands each worker a [`WorkerStart`]: its name, the
//! encoded [`WorkerMessage`](crate::protocol::WorkerMessage) and a one-shot
//! [`ReplyPort`]. How the worker gets started is up to a [`WorkerSpawner`];
//! [`ThreadSpawner`] starts one OS thread per worker.
//!
//! A worker that ends without replying drops its port, which the coordinator
//! observes as a closed channel.

use crate::config::{CancellationPolicy, DistributedConfig};
use multitask_core::{PipelineError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

/// Code a spawner runs as the worker's program
pub type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Starts workers
pub trait WorkerSpawner: Send + Sync {
    /// Start a worker named `name` running `body`
    ///
    /// Returns once the worker has been started, not when it finishes.
    fn spawn(&self, name: &str, body: WorkerBody) -> Result<()>;
}

/// One OS thread per worker
#[derive(Debug, Clone, Default)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DistributedConfig) -> Self {
        Self {
            stack_size: config.worker_stack_size,
        }
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, body: WorkerBody) -> Result<()> {
        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        builder
            .spawn(body)
            .map(|_detached| ())
            .map_err(|e| PipelineError::WorkerSpawn(format!("{}: {}", name, e)))
    }
}

/// Worker's end of the one-shot reply channel
pub struct ReplyPort {
    sender: oneshot::Sender<String>,
}

impl ReplyPort {
    /// Create a port and the receiver the coordinator awaits
    pub fn channel() -> (Self, oneshot::Receiver<String>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Send the encoded reply, consuming the port
    ///
    /// Fails when the coordinator stopped listening, which happens after a
    /// sibling element failed first.
    pub fn send(self, reply: String) -> Result<()> {
        self.sender.send(reply).map_err(|_| {
            PipelineError::Cancelled("Coordinator is no longer waiting for this reply".to_string())
        })
    }
}

impl fmt::Debug for ReplyPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyPort")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Shared flag telling workers of one ParallelMap stage to stand down
///
/// A flag built for [`CancellationPolicy::None`] ignores [`cancel`](Self::cancel),
/// so workers always run their element.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    enabled: bool,
}

impl CancelFlag {
    pub fn for_policy(policy: CancellationPolicy) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            enabled: policy == CancellationPolicy::BestEffort,
        }
    }

    pub fn cancel(&self) {
        if self.enabled {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Everything a worker receives at start-up
#[derive(Debug)]
pub struct WorkerStart {
    /// Worker name, also the thread name under [`ThreadSpawner`]
    pub name: String,
    /// Encoded worker message
    pub payload: String,
    pub reply: ReplyPort,
    pub cancel: CancelFlag,
}
