//! Stage variants and their erased function shapes
//!
//! A pipeline is a list of [`Stage`]s. Each variant wraps the caller's
//! function behind an erased signature over [`Value`] so that stages with
//! different input and output types can sit in one list:
//!
//! - [`Transform`] - pure `Value -> Value`
//! - [`Apply`] - a nested pipeline yielding a function, plus the glue that
//!   applies that function to the running value
//! - [`ParallelMap`] - a traversable capability and a per-element function
//!   whose elements cross a serialization boundary as JSON
//!
//! [`Stage::kind`] is the exhaustive discriminator the interpreter matches on.

use crate::error::{PipelineError, Result};
use crate::pipeline::ErasedPipeline;
use crate::traversable::Traversable;
use crate::value::Value;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Erased transform function
pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Erased apply glue: `(function, argument) -> result`
pub type ApplyFn = Arc<dyn Fn(Value, Value) -> Result<Value> + Send + Sync>;

/// Erased per-element function of a ParallelMap stage
pub type ElementFn =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync>;

type TraverseFn =
    Arc<dyn Fn(Value, Arc<dyn ElementDispatch>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Discriminant of a [`Stage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Transform,
    Apply,
    ParallelMap,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Transform => write!(f, "Transform"),
            StageKind::Apply => write!(f, "Apply"),
            StageKind::ParallelMap => write!(f, "ParallelMap"),
        }
    }
}

/// One unit of pipeline behavior
#[derive(Clone)]
pub enum Stage {
    Transform(Transform),
    Apply(Apply),
    ParallelMap(ParallelMap),
}

impl Stage {
    /// Build a [`Transform`] stage from an erased function
    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Stage::Transform(Transform::new(f))
    }

    /// Build an [`Apply`] stage from a nested pipeline and erased glue
    pub fn apply<F>(inner: ErasedPipeline, apply: F) -> Self
    where
        F: Fn(Value, Value) -> Result<Value> + Send + Sync + 'static,
    {
        Stage::Apply(Apply::new(inner, apply))
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Transform(_) => StageKind::Transform,
            Stage::Apply(_) => StageKind::Apply,
            Stage::ParallelMap(_) => StageKind::ParallelMap,
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Transform(t) => t.fmt(f),
            Stage::Apply(a) => a.fmt(f),
            Stage::ParallelMap(p) => p.fmt(f),
        }
    }
}

/// Pure running-value transformation
#[derive(Clone)]
pub struct Transform {
    f: TransformFn,
}

impl Transform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub fn call(&self, value: Value) -> Result<Value> {
        (self.f)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("f", &"<function>").finish()
    }
}

/// Nested pipeline whose result is a function applied to the running value
#[derive(Clone)]
pub struct Apply {
    inner: ErasedPipeline,
    apply: ApplyFn,
}

impl Apply {
    pub fn new<F>(inner: ErasedPipeline, apply: F) -> Self
    where
        F: Fn(Value, Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            inner,
            apply: Arc::new(apply),
        }
    }

    /// The pipeline producing the function
    pub fn inner(&self) -> &ErasedPipeline {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut ErasedPipeline {
        &mut self.inner
    }

    /// Apply the nested pipeline's result to the running value
    pub fn call(&self, function: Value, argument: Value) -> Result<Value> {
        (self.apply)(function, argument)
    }
}

impl fmt::Debug for Apply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Apply")
            .field("inner_stages", &self.inner.len())
            .finish_non_exhaustive()
    }
}

/// Executes one ParallelMap element somewhere and returns its output
///
/// Engines decide where: in the caller's task, or in a freshly started
/// worker. `position` is the element's index within the container.
#[async_trait]
pub trait ElementDispatch: Send + Sync {
    async fn dispatch(&self, position: usize, element: serde_json::Value) -> Result<serde_json::Value>;
}

/// Per-element function applied across a container
#[derive(Clone)]
pub struct ParallelMap {
    capability: &'static str,
    traverse: TraverseFn,
    element: ElementFn,
}

impl ParallelMap {
    /// Build from a capability and a deferred, fallible element function
    ///
    /// Elements are encoded to JSON before dispatch and outputs decoded
    /// after, so `A` and `B` must round-trip through `serde_json`.
    pub fn new<C, A, B, F, Fut, E>(capability: C, f: F) -> Self
    where
        C: Traversable<A, B>,
        A: Serialize + DeserializeOwned + Send + 'static,
        B: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<B, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let element: ElementFn = Arc::new(move |input: serde_json::Value| {
            match serde_json::from_value::<A>(input) {
                Ok(decoded) => {
                    let pending = f(decoded);
                    async move {
                        let output = pending.await.map_err(PipelineError::raised)?;
                        Ok::<serde_json::Value, PipelineError>(serde_json::to_value(output)?)
                    }
                    .boxed()
                }
                Err(e) => future::ready(Err::<serde_json::Value, PipelineError>(e.into())).boxed(),
            }
        });

        let name = Traversable::<A, B>::name(&capability);
        let capability = Arc::new(capability);
        let traverse: TraverseFn = Arc::new(move |container: Value, dispatch: Arc<dyn ElementDispatch>| {
            let capability = Arc::clone(&capability);
            async move {
                let source = container.downcast::<<C as Traversable<A, B>>::Source>()?;
                let mut position = 0usize;
                let target = Traversable::<A, B>::traverse(&*capability, source, |element: A| {
                    let dispatch = Arc::clone(&dispatch);
                    let at = position;
                    position += 1;
                    async move {
                        let input = serde_json::to_value(element)?;
                        let output = dispatch.dispatch(at, input).await?;
                        Ok::<B, PipelineError>(serde_json::from_value(output)?)
                    }
                })
                .await?;
                Ok::<Value, PipelineError>(Value::new(target))
            }
            .boxed()
        });

        Self {
            capability: name,
            traverse,
            element,
        }
    }

    /// Name of the container shape this stage fans out over
    pub fn capability(&self) -> &'static str {
        self.capability
    }

    /// Fan the container out through `dispatch` and gather the results
    pub async fn run(&self, container: Value, dispatch: Arc<dyn ElementDispatch>) -> Result<Value> {
        (self.traverse)(container, dispatch).await
    }

    /// Run the element function on one encoded element, in the calling task
    pub async fn call_element(&self, element: serde_json::Value) -> Result<serde_json::Value> {
        (self.element)(element).await
    }
}

impl fmt::Debug for ParallelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelMap")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversable::VecTraversal;
    use serde_json::json;
    use std::convert::Infallible;

    struct Inline(ParallelMap);

    #[async_trait]
    impl ElementDispatch for Inline {
        async fn dispatch(&self, _position: usize, element: serde_json::Value) -> Result<serde_json::Value> {
            self.0.call_element(element).await
        }
    }

    fn add_one() -> ParallelMap {
        ParallelMap::new(VecTraversal, |n: i64| async move { Ok::<i64, Infallible>(n + 1) })
    }

    #[test]
    fn test_stage_kind_is_exhaustive() {
        let transform = Stage::transform(Ok);
        let apply = Stage::apply(ErasedPipeline::new(()), |f, _| Ok(f));
        let par = Stage::ParallelMap(add_one());

        assert_eq!(transform.kind(), StageKind::Transform);
        assert_eq!(apply.kind(), StageKind::Apply);
        assert_eq!(par.kind(), StageKind::ParallelMap);
        assert_eq!(StageKind::ParallelMap.to_string(), "ParallelMap");
    }

    #[tokio::test]
    async fn test_call_element_round_trips_json() {
        let stage = add_one();
        assert_eq!(stage.call_element(json!(41)).await.unwrap(), json!(42));
        assert_eq!(stage.capability(), "vec");
    }

    #[tokio::test]
    async fn test_call_element_rejects_wrong_shape() {
        let err = add_one().call_element(json!("not a number")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_run_dispatches_every_element() {
        let stage = add_one();
        let dispatch: Arc<dyn ElementDispatch> = Arc::new(Inline(stage.clone()));
        let output = stage.run(Value::new(vec![1i64, 2, 3]), dispatch).await.unwrap();
        assert_eq!(output.downcast::<Vec<i64>>().unwrap(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_run_rejects_wrong_container() {
        let stage = add_one();
        let dispatch: Arc<dyn ElementDispatch> = Arc::new(Inline(stage.clone()));
        let err = stage.run(Value::new("oops"), dispatch).await.unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_apply_calls_glue() {
        let apply = Apply::new(ErasedPipeline::new(0i64), |function, argument| {
            let f = function.downcast::<fn(i64) -> i64>()?;
            Ok(Value::new(f(argument.downcast::<i64>()?)))
        });
        let double: fn(i64) -> i64 = |n| n * 2;
        let result = apply.call(Value::new(double), Value::new(21i64)).unwrap();
        assert_eq!(result.downcast::<i64>().unwrap(), 42);
    }
}
