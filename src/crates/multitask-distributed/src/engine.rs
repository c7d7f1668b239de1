//! Distributed engine entry points
//!
//! The same program runs in two roles. As [`Role::Coordinator`] it builds the
//! pipeline from its [`EntryPoint`] and drives the interpreter, starting one
//! worker per ParallelMap element. As [`Role::Worker`] it builds the same
//! pipeline from the same entry point, runs exactly one element and replies.
//!
//! Workers never receive closures or pipelines from the coordinator: both
//! sides derive the pipeline by calling the entry point, and only the
//! [`WorkerMessage`](crate::protocol::WorkerMessage) crosses over.

use crate::config::DistributedConfig;
use crate::coordinator::{Launch, WorkerFanOut};
use crate::protocol::Reply;
use crate::transport::{ThreadSpawner, WorkerSpawner, WorkerStart};
use crate::worker;
use multitask_core::{execute, Pipeline, PipelineError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Function both roles call to build the pipeline
pub type EntryPoint<T> = fn() -> Pipeline<T>;

/// Which side of the protocol this invocation plays
#[derive(Debug)]
pub enum Role {
    /// Drive the run and collect the result
    Coordinator,
    /// Execute one element and reply
    Worker(WorkerStart),
}

/// Engine starting one worker per ParallelMap element
pub struct DistributedExecutor<T> {
    entry: EntryPoint<T>,
    config: DistributedConfig,
    spawner: Option<Arc<dyn WorkerSpawner>>,
}

impl<T: 'static> DistributedExecutor<T> {
    pub fn new(entry: EntryPoint<T>) -> Self {
        Self {
            entry,
            config: DistributedConfig::default(),
            spawner: None,
        }
    }

    /// Set engine configuration
    pub fn with_config(mut self, config: DistributedConfig) -> Self {
        self.config = config;
        self
    }

    /// Start workers with `spawner` instead of one thread each
    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn config(&self) -> &DistributedConfig {
        &self.config
    }

    /// Play `role`
    ///
    /// Returns `Some(result)` as coordinator. As worker, returns `None` once
    /// the reply has been handed to the reply port.
    pub async fn run(&self, role: Role) -> Result<Option<T>> {
        match role {
            Role::Coordinator => self.coordinate().await.map(Some),
            Role::Worker(start) => {
                let pipeline = (self.entry)().into_erased();
                worker::serve(&pipeline, start).await?;
                Ok(None)
            }
        }
    }

    async fn coordinate(&self) -> Result<T> {
        self.config.validate()?;

        let pipeline = (self.entry)().into_erased();
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "pipeline_run",
            run_id = %run_id,
            engine = "distributed",
            stages = pipeline.len()
        );

        let spawner = match &self.spawner {
            Some(spawner) => Arc::clone(spawner),
            None => Arc::new(ThreadSpawner::from_config(&self.config)),
        };
        let entry = self.entry;
        let launch: Launch = Arc::new(move |start: WorkerStart| worker_main(entry, start));
        let fan_out = WorkerFanOut::new(self.config.clone(), spawner, launch);

        async move {
            tracing::info!(worker_prefix = %self.config.worker_name_prefix, "Starting pipeline run");
            match execute(pipeline, &fan_out).await {
                Ok(value) => {
                    tracing::info!(result_type = value.type_name(), "Pipeline run completed");
                    value.downcast::<T>()
                }
                Err(e) => {
                    tracing::error!(error = %e, category = %e.category(), "Pipeline run failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl<T> fmt::Debug for DistributedExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedExecutor")
            .field("output", &std::any::type_name::<T>())
            .field("config", &self.config)
            .field("custom_spawner", &self.spawner.is_some())
            .finish()
    }
}

/// Program a freshly started worker runs
///
/// Builds the worker's own single-threaded runtime and plays the worker role
/// on it. If the runtime cannot be built the failure is replied directly.
pub fn worker_main<T: 'static>(entry: EntryPoint<T>, start: WorkerStart) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let error = PipelineError::WorkerSpawn(format!(
                "{} could not build its runtime: {}",
                start.name, e
            ));
            tracing::error!(worker = %start.name, error = %error, "Worker start-up failed");
            match Reply::failure(&error).encode() {
                Ok(encoded) => {
                    if let Err(e) = start.reply.send(encoded) {
                        tracing::debug!(error = %e, "Start-up failure went unheard");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode start-up failure"),
            }
            return;
        }
    };

    let name = start.name.clone();
    if let Err(e) = runtime.block_on(run_distributed(entry, Role::Worker(start))) {
        tracing::debug!(worker = %name, error = %e, "Worker reply was not delivered");
    }
}

/// Play `role` for the pipeline built by `entry`, with default configuration
///
/// # Example
///
/// ```rust,no_run
/// use multitask_core::{of, Pipeline, VecTraversal};
/// use multitask_distributed::{run_distributed, Role};
///
/// fn pipeline() -> Pipeline<Vec<i64>> {
///     of(vec![1i64, 2, 3]).par_map(VecTraversal, |n: i64| n * n)
/// }
///
/// # #[tokio::main]
/// # async fn main() -> multitask_core::Result<()> {
/// let squares = run_distributed(pipeline, Role::Coordinator).await?;
/// assert_eq!(squares, Some(vec![1, 4, 9]));
/// # Ok(())
/// # }
/// ```
pub async fn run_distributed<T: 'static>(entry: EntryPoint<T>, role: Role) -> Result<Option<T>> {
    DistributedExecutor::new(entry).run(role).await
}
