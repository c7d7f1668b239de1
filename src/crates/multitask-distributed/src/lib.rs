//! # multitask-distributed - One Worker per Element
//!
//! Runs [`multitask_core`] pipelines with true OS-level parallelism: every
//! element of every ParallelMap stage executes in a freshly started worker.
//!
//! ## How a worker finds its stage
//!
//! Workers share no memory with the coordinator beyond a one-shot exchange.
//! Both sides build the pipeline by calling the same [`EntryPoint`]; the
//! coordinator then sends each worker a [`WorkerMessage`] holding the
//! element and the [`StagePath`](multitask_core::StagePath) of its stage:
//! the index of every Apply stage entered on the way down, then the index of
//! the ParallelMap stage itself. The worker follows the path, runs the
//! element function and sends back a [`Reply`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multitask_core::{of, Pipeline, VecTraversal};
//! use multitask_distributed::{DistributedConfig, DistributedExecutor, Role};
//!
//! fn pipeline() -> Pipeline<Vec<u64>> {
//!     of(vec![1u64, 2, 3]).par_map(VecTraversal, |n: u64| n * 2)
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> multitask_core::Result<()> {
//! let executor = DistributedExecutor::new(pipeline)
//!     .with_config(DistributedConfig::from_env()?);
//!
//! let doubled = executor.run(Role::Coordinator).await?;
//! assert_eq!(doubled, Some(vec![2, 4, 6]));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod protocol;
pub mod transport;
pub mod worker;

pub use config::{CancellationPolicy, DistributedConfig};
pub use coordinator::WorkerFanOut;
pub use engine::{run_distributed, worker_main, DistributedExecutor, EntryPoint, Role};
pub use protocol::{ErrorDescription, FailureKind, Reply, WorkerMessage};
pub use transport::{CancelFlag, ReplyPort, ThreadSpawner, WorkerBody, WorkerSpawner, WorkerStart};
