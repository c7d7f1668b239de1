//! Traversable capabilities
//!
//! A capability describes one container shape: how to map it element by
//! element, and how to fan its elements out to concurrently running futures
//! and gather the results back into the same shape. ParallelMap stages are
//! built with a capability, which is what lets the interpreter stay ignorant
//! of container types.
//!
//! Both operations preserve shape: the output has exactly as many elements
//! as the input, each at the position of the element it came from.
//!
//! # Example
//!
//! ```rust
//! use multitask_core::{Traversable, VecTraversal};
//!
//! let doubled = Traversable::<i64, i64>::map(&VecTraversal, vec![1, 2, 3], |n| n * 2);
//! assert_eq!(doubled, vec![2, 4, 6]);
//! ```

use futures::future::{self, BoxFuture, FutureExt};
use std::future::Future;

/// Element-wise map and fan-out/fan-in over one container shape
///
/// `A` is the element type going in, `B` the element type coming out;
/// `Source` and `Target` are the container holding each.
pub trait Traversable<A, B>: Send + Sync + 'static {
    /// Container of input elements (`C<A>`)
    type Source: Send + 'static;
    /// Container of output elements (`C<B>`)
    type Target: Send + 'static;

    /// Short name of the container shape, used in logs
    fn name(&self) -> &'static str;

    /// Apply `f` to every element in place of the element
    fn map<F>(&self, source: Self::Source, f: F) -> Self::Target
    where
        F: FnMut(A) -> B;

    /// Start one future per element and gather their outputs
    ///
    /// The first element error fails the whole traversal; outputs of the
    /// remaining elements are discarded.
    fn traverse<F, Fut, E>(&self, source: Self::Source, f: F) -> BoxFuture<'static, Result<Self::Target, E>>
    where
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<B, E>> + Send + 'static,
        B: Send + 'static,
        E: Send + 'static;
}

/// Capability for `Vec<A>`
#[derive(Debug, Clone, Copy, Default)]
pub struct VecTraversal;

impl<A, B> Traversable<A, B> for VecTraversal
where
    A: Send + 'static,
    B: Send + 'static,
{
    type Source = Vec<A>;
    type Target = Vec<B>;

    fn name(&self) -> &'static str {
        "vec"
    }

    fn map<F>(&self, source: Vec<A>, f: F) -> Vec<B>
    where
        F: FnMut(A) -> B,
    {
        source.into_iter().map(f).collect()
    }

    fn traverse<F, Fut, E>(&self, source: Vec<A>, f: F) -> BoxFuture<'static, Result<Vec<B>, E>>
    where
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<B, E>> + Send + 'static,
        B: Send + 'static,
        E: Send + 'static,
    {
        let pending: Vec<Fut> = source.into_iter().map(f).collect();
        future::try_join_all(pending).boxed()
    }
}

/// Capability for `Option<A>`: zero or one element
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionTraversal;

impl<A, B> Traversable<A, B> for OptionTraversal
where
    A: Send + 'static,
    B: Send + 'static,
{
    type Source = Option<A>;
    type Target = Option<B>;

    fn name(&self) -> &'static str {
        "option"
    }

    fn map<F>(&self, source: Option<A>, f: F) -> Option<B>
    where
        F: FnMut(A) -> B,
    {
        source.map(f)
    }

    fn traverse<F, Fut, E>(&self, source: Option<A>, mut f: F) -> BoxFuture<'static, Result<Option<B>, E>>
    where
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<B, E>> + Send + 'static,
        B: Send + 'static,
        E: Send + 'static,
    {
        match source {
            Some(element) => f(element).map(|result| result.map(Some)).boxed(),
            None => future::ready(Ok(None)).boxed(),
        }
    }
}
