//! Stack-safe driver for asynchronous step functions
//!
//! [`trampoline`] keeps calling a step function in a flat loop until it
//! reports [`Step::Done`]. Each call is awaited before the next begins, and
//! no call nests inside another, so the number of steps is bounded only by
//! time, not by stack depth.

use std::future::Future;

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<S, R> {
    /// Keep going from this state
    Continue(S),
    /// Finished with this result
    Done(R),
}

/// Drive `step` from `initial` until it yields a result
///
/// The first error returned by `step` ends the loop.
///
/// # Example
///
/// ```rust
/// use multitask_core::trampoline::{trampoline, Step};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sum = trampoline((0u64, 0u64), |(i, acc)| async move {
///     if i == 10 {
///         Ok::<_, ()>(Step::Done(acc))
///     } else {
///         Ok(Step::Continue((i + 1, acc + i)))
///     }
/// })
/// .await;
/// assert_eq!(sum, Ok(45));
/// # }
/// ```
pub async fn trampoline<S, R, E, F, Fut>(initial: S, mut step: F) -> Result<R, E>
where
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<Step<S, R>, E>>,
{
    let mut state = initial;
    loop {
        match step(state).await? {
            Step::Continue(next) => state = next,
            Step::Done(result) => return Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_million_steps_do_not_grow_the_stack() {
        let count = trampoline(0u64, |n| async move {
            if n == 1_000_000 {
                Ok::<_, String>(Step::Done(n))
            } else {
                Ok(Step::Continue(n + 1))
            }
        })
        .await
        .unwrap();
        assert_eq!(count, 1_000_000);
    }

    #[tokio::test]
    async fn test_error_stops_the_loop() {
        let mut calls = 0;
        let result: Result<(), String> = trampoline(0u32, |n| {
            calls += 1;
            async move {
                if n == 3 {
                    Err(format!("stopped at {}", n))
                } else {
                    Ok(Step::Continue(n + 1))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), "stopped at 3");
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_immediate_done() {
        let result = trampoline((), |_| async { Ok::<Step<(), &str>, ()>(Step::Done("done")) }).await;
        assert_eq!(result, Ok("done"));
    }
}
