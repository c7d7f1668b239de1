//! # multitask-core - Composable Pipelines with Parallel Fan-Out
//!
//! Build a pipeline once, as a plain value, then hand it to an engine to run.
//!
//! ## Overview
//!
//! A pipeline is an initial value followed by an ordered list of stages:
//!
//! - **Transform** - a pure function of the running value
//! - **Apply** - a nested pipeline that yields a function, which is then
//!   applied to the running value
//! - **ParallelMap** - a per-element function applied across a container,
//!   with each element free to run somewhere else
//!
//! ## Core Concepts
//!
//! ### 1. Pipeline Algebra
//!
//! [`of`] starts a pipeline; [`Pipeline::map`], [`Pipeline::ap`] and
//! [`Pipeline::par_map`] each return a new pipeline with one more stage.
//! Building a pipeline never runs anything.
//!
//! ### 2. Stepping Interpreter
//!
//! [`interpreter::step`] performs one transition of an explicit
//! [`ControlState`]. Nested Apply stages push frames onto a heap-allocated
//! stack instead of recursing, and [`trampoline`](trampoline::trampoline)
//! drives the transitions in a flat loop, so neither long pipelines nor deep
//! nesting grow the call stack.
//!
//! ### 3. Engines
//!
//! The interpreter is engine-agnostic; an engine only supplies a
//! [`FanOut`] deciding where ParallelMap elements run.
//! [`SingleThreadExecutor`] runs them as concurrent futures in the calling
//! task. The `multitask-distributed` crate starts one worker per element.
//!
//! ### 4. Traversable Capabilities
//!
//! ParallelMap stages are built with a [`Traversable`] capability describing
//! the container shape, e.g. [`VecTraversal`] or [`OptionTraversal`].
//!
//! ## Quick Start
//!
//! ```rust
//! use multitask_core::{of, run_single_thread, VecTraversal};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> multitask_core::Result<()> {
//! let pipeline = of(vec![1i64, 2, 3])
//!     .map_each(VecTraversal, |n: i64| n + 1)
//!     .par_map(VecTraversal, |n: i64| n + 1)
//!     .map_each(VecTraversal, |n: i64| n + 1);
//!
//! assert_eq!(run_single_thread(pipeline).await?, vec![4, 5, 6]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Apply
//!
//! ```rust
//! use multitask_core::{of, run_single_thread};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> multitask_core::Result<()> {
//! let functions = of("hello".to_string()).map(|prefix| move |n: i64| format!("{}: {}", prefix, n));
//! let pipeline = of(1i64).map(|n| n + 1).ap(functions);
//!
//! assert_eq!(run_single_thread(pipeline).await?, "hello: 2");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod interpreter;
pub mod pipeline;
pub mod stage;
pub mod state;
pub mod trampoline;
pub mod traversable;
pub mod value;

pub use error::{ErrorCategory, PipelineError, Result};
pub use executor::{run_single_thread, SingleThreadExecutor};
pub use interpreter::{execute, step, FanOut};
pub use pipeline::{of, ErasedPipeline, Pipeline};
pub use stage::{ElementDispatch, ParallelMap, Stage, StageKind};
pub use state::{ControlState, Frame, Pointer, StagePath};
pub use trampoline::Step;
pub use traversable::{OptionTraversal, Traversable, VecTraversal};
pub use value::Value;
