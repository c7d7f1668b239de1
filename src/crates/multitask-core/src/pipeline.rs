//! Pipeline algebra
//!
//! Pipelines are built once, synchronously, from four combinators:
//!
//! | Combinator | Appends |
//! |------------|---------|
//! | [`of`] | nothing; sets the initial value |
//! | [`Pipeline::map`] | a [`Transform`](crate::Stage::Transform) |
//! | [`Pipeline::ap`] | an [`Apply`](crate::Stage::Apply) carrying a function pipeline |
//! | [`Pipeline::par_map`] | a [`ParallelMap`](crate::Stage::ParallelMap) |
//!
//! Every combinator consumes its receiver and returns a new pipeline; none
//! of them executes anything. Clones share their stage list, and appending
//! to a shared list copies it first, so a pipeline value never changes
//! under anyone holding it.
//!
//! # Example
//!
//! ```rust
//! use multitask_core::{of, VecTraversal};
//!
//! let pipeline = of(vec![1i64, 2, 3])
//!     .map_each(VecTraversal, |n: i64| n + 1)
//!     .par_map(VecTraversal, |n: i64| n + 1)
//!     .map_each(VecTraversal, |n: i64| n + 1);
//!
//! assert_eq!(pipeline.len(), 3);
//! ```

use crate::error::PipelineError;
use crate::stage::{ParallelMap, Stage, StageKind};
use crate::traversable::Traversable;
use crate::value::Value;
use futures::future;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Produces a fresh initial value for each run
pub type Seed = Arc<dyn Fn() -> Value + Send + Sync>;

/// Untyped pipeline: an initial value and an ordered list of stages
///
/// This is what the interpreter walks. Most callers build a typed
/// [`Pipeline`] instead and never touch this directly.
#[derive(Clone)]
pub struct ErasedPipeline {
    seed: Seed,
    initial_type: &'static str,
    stages: Arc<Vec<Stage>>,
}

impl ErasedPipeline {
    /// Create a pipeline with no stages
    pub fn new<T>(initial: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            seed: Arc::new(move || Value::new(initial.clone())),
            initial_type: any::type_name::<T>(),
            stages: Arc::new(Vec::new()),
        }
    }

    /// Return this pipeline with `stage` appended
    pub fn with_stage(mut self, stage: Stage) -> Self {
        Arc::make_mut(&mut self.stages).push(stage);
        self
    }

    /// A fresh copy of the initial value
    pub fn initial_value(&self) -> Value {
        (self.seed)()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Move the stages out if no clone shares them
    pub(crate) fn take_unshared_stages(&mut self) -> Vec<Stage> {
        Arc::get_mut(&mut self.stages)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

// Apply stages own whole pipelines, so the derived drop would recurse once
// per nesting level. Nested stage lists are flattened into a worklist instead.
impl Drop for ErasedPipeline {
    fn drop(&mut self) {
        let mut pending = self.take_unshared_stages();
        while let Some(stage) = pending.pop() {
            if let Stage::Apply(mut apply) = stage {
                pending.append(&mut apply.inner_mut().take_unshared_stages());
            }
        }
    }
}

impl fmt::Debug for ErasedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedPipeline")
            .field("initial", &self.initial_type)
            .field("stages", &self.stages)
            .finish()
    }
}

/// A pipeline yielding a `T` when run
pub struct Pipeline<T> {
    erased: ErasedPipeline,
    _output: PhantomData<fn() -> T>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _output: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("output", &any::type_name::<T>())
            .field("stages", &self.erased.stages)
            .finish()
    }
}

/// Start a pipeline whose running value is `initial`
pub fn of<T>(initial: T) -> Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    Pipeline::from_erased(ErasedPipeline::new(initial))
}

impl<T> Pipeline<T> {
    /// Wrap an erased pipeline, asserting that it yields a `T`
    ///
    /// Nothing checks the assertion up front; a wrong `T` surfaces as a
    /// [`PipelineError::TypeMismatch`] when the run finishes.
    pub fn from_erased(erased: ErasedPipeline) -> Self {
        Self {
            erased,
            _output: PhantomData,
        }
    }

    pub fn erased(&self) -> &ErasedPipeline {
        &self.erased
    }

    pub fn into_erased(self) -> ErasedPipeline {
        self.erased
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.erased.len()
    }

    pub fn is_empty(&self) -> bool {
        self.erased.is_empty()
    }

    /// Kinds of the top-level stages, in order
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.erased.stages().iter().map(Stage::kind).collect()
    }

    fn then<U>(self, stage: Stage) -> Pipeline<U> {
        Pipeline::from_erased(self.erased.with_stage(stage))
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Append a pure transformation of the running value
    pub fn map<U, F>(self, f: F) -> Pipeline<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.then(Stage::transform(move |value: Value| {
            Ok(Value::new(f(value.downcast::<T>()?)))
        }))
    }

    /// Append a transformation that may fail
    ///
    /// An `Err` ends the run with the error's `Display` text.
    pub fn try_map<U, E, F>(self, f: F) -> Pipeline<U>
    where
        U: Send + 'static,
        E: fmt::Display,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        self.then(Stage::transform(move |value: Value| {
            f(value.downcast::<T>()?)
                .map(Value::new)
                .map_err(PipelineError::raised)
        }))
    }

    /// Append an Apply stage: run `functions` to get a function, then apply
    /// it to this pipeline's running value
    ///
    /// ```rust
    /// use multitask_core::of;
    ///
    /// let greeting = of(1i64)
    ///     .map(|n| n + 1)
    ///     .ap(of("hello".to_string()).map(|prefix| move |n: i64| format!("{}: {}", prefix, n)));
    /// assert_eq!(greeting.len(), 2);
    /// ```
    pub fn ap<F, B>(self, functions: Pipeline<F>) -> Pipeline<B>
    where
        F: Fn(T) -> B + Send + 'static,
        B: Send + 'static,
    {
        self.then(Stage::apply(functions.into_erased(), |function: Value, argument: Value| {
            let function = function.downcast::<F>()?;
            let argument = argument.downcast::<T>()?;
            Ok(Value::new(function(argument)))
        }))
    }

    /// Append an in-process element-wise map over a container
    pub fn map_each<C, A, B, F>(self, capability: C, f: F) -> Pipeline<<C as Traversable<A, B>>::Target>
    where
        C: Traversable<A, B, Source = T>,
        A: Send + 'static,
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        self.map(move |container: T| Traversable::<A, B>::map(&capability, container, &f))
    }

    /// Append a ParallelMap stage with an infallible element function
    pub fn par_map<C, A, B, F>(self, capability: C, f: F) -> Pipeline<<C as Traversable<A, B>>::Target>
    where
        C: Traversable<A, B, Source = T>,
        A: Serialize + DeserializeOwned + Send + 'static,
        B: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        self.try_par_map(capability, move |element: A| Ok::<B, Infallible>(f(element)))
    }

    /// Append a ParallelMap stage whose element function may fail
    ///
    /// One failing element fails the whole stage.
    pub fn try_par_map<C, A, B, E, F>(self, capability: C, f: F) -> Pipeline<<C as Traversable<A, B>>::Target>
    where
        C: Traversable<A, B, Source = T>,
        A: Serialize + DeserializeOwned + Send + 'static,
        B: Serialize + DeserializeOwned + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(A) -> Result<B, E> + Send + Sync + 'static,
    {
        self.par_map_async(capability, move |element: A| future::ready(f(element)))
    }

    /// Append a ParallelMap stage whose element function is deferred
    pub fn par_map_async<C, A, B, E, F, Fut>(self, capability: C, f: F) -> Pipeline<<C as Traversable<A, B>>::Target>
    where
        C: Traversable<A, B, Source = T>,
        A: Serialize + DeserializeOwned + Send + 'static,
        B: Serialize + DeserializeOwned + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<B, E>> + Send + 'static,
    {
        self.then(Stage::ParallelMap(ParallelMap::new(capability, f)))
    }
}
