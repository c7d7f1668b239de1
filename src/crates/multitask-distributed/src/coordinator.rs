//! Coordinator side of the distributed engine
//!
//! [`WorkerFanOut`] plugs into the interpreter as its fan-out: every element
//! of a ParallelMap stage becomes one worker, started through the configured
//! [`WorkerSpawner`] with a [`WorkerMessage`] addressing that stage. The
//! coordinator then waits on the worker's reply port.

use crate::config::DistributedConfig;
use crate::protocol::{Reply, WorkerMessage};
use crate::transport::{CancelFlag, ReplyPort, WorkerSpawner, WorkerStart};
use async_trait::async_trait;
use multitask_core::{ElementDispatch, FanOut, ParallelMap, PipelineError, Result, StagePath};
use std::fmt;
use std::sync::Arc;

/// Runs the worker program for one start-up
pub type Launch = Arc<dyn Fn(WorkerStart) + Send + Sync>;

/// Fan-out that starts one worker per element
pub struct WorkerFanOut {
    config: DistributedConfig,
    spawner: Arc<dyn WorkerSpawner>,
    launch: Launch,
}

impl WorkerFanOut {
    pub fn new(config: DistributedConfig, spawner: Arc<dyn WorkerSpawner>, launch: Launch) -> Self {
        Self {
            config,
            spawner,
            launch,
        }
    }
}

impl fmt::Debug for WorkerFanOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerFanOut")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FanOut for WorkerFanOut {
    fn dispatcher(&self, path: &StagePath, stage: &ParallelMap) -> Arc<dyn ElementDispatch> {
        tracing::debug!(
            path = %path,
            capability = stage.capability(),
            cancellation = %self.config.cancellation,
            "Fanning out to workers"
        );

        Arc::new(WorkerDispatch {
            path: path.clone(),
            name_prefix: self.config.worker_name_prefix.clone(),
            cancel: CancelFlag::for_policy(self.config.cancellation),
            spawner: Arc::clone(&self.spawner),
            launch: Arc::clone(&self.launch),
        })
    }
}

/// Starts and awaits the workers of one ParallelMap stage
struct WorkerDispatch {
    path: StagePath,
    name_prefix: String,
    cancel: CancelFlag,
    spawner: Arc<dyn WorkerSpawner>,
    launch: Launch,
}

impl WorkerDispatch {
    async fn start_and_wait(&self, name: &str, element: serde_json::Value) -> Result<serde_json::Value> {
        let payload = WorkerMessage::new(self.path.clone(), element).encode()?;
        let (reply, receiver) = ReplyPort::channel();
        let start = WorkerStart {
            name: name.to_string(),
            payload,
            reply,
            cancel: self.cancel.clone(),
        };

        let launch = Arc::clone(&self.launch);
        tracing::debug!(worker = %name, path = %self.path, "Spawning worker");
        self.spawner.spawn(name, Box::new(move || launch(start)))?;

        match receiver.await {
            Ok(encoded) => Reply::decode(&encoded)?.into_result(),
            Err(_) => Err(PipelineError::WorkerExited(format!(
                "{} terminated without replying",
                name
            ))),
        }
    }
}

#[async_trait]
impl ElementDispatch for WorkerDispatch {
    async fn dispatch(&self, position: usize, element: serde_json::Value) -> Result<serde_json::Value> {
        let name = format!("{}-{}", self.name_prefix, position);
        let outcome = self.start_and_wait(&name, element).await;

        if let Err(e) = &outcome {
            tracing::warn!(
                worker = %name,
                path = %self.path,
                category = %e.category(),
                error = %e,
                "Worker failed"
            );
            self.cancel.cancel();
        }

        outcome
    }
}
