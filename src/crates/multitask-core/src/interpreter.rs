//! Stepping interpreter shared by every engine.
//!
//! [`step`] performs exactly one transition of a [`ControlState`]. The rules,
//! checked in order:
//!
//! 1. The current pipeline has no stage at the pointer: finish the run if no
//!    frame is suspended, otherwise resume the innermost suspended frame and
//!    park the finished pointer as its pending child.
//! 2. Transform: apply it and advance.
//! 3. ParallelMap: fan the container out through the engine's [`FanOut`],
//!    wait for every element and advance.
//! 4. Apply with no pending child: suspend the current frame and start the
//!    stage's inner pipeline.
//! 5. Apply with a pending child: apply the child's function to the running
//!    value and advance within the enclosing pipeline.
//!
//! [`execute`] drives those transitions with the [`trampoline`] until the run
//! yields a value.

use crate::error::Result;
use crate::pipeline::ErasedPipeline;
use crate::stage::{ElementDispatch, ParallelMap, Stage};
use crate::state::{ControlState, Frame, Pointer, StagePath};
use crate::trampoline::{trampoline, Step};
use crate::value::Value;
use std::sync::Arc;

/// Engine seam deciding where ParallelMap elements execute
pub trait FanOut: Send + Sync {
    /// Dispatcher for the elements of `stage`, reachable from the root at `path`
    fn dispatcher(&self, path: &StagePath, stage: &ParallelMap) -> Arc<dyn ElementDispatch>;
}

/// Perform one transition of `state`
pub async fn step<F>(state: ControlState, fan_out: &F) -> Result<Step<ControlState, Value>>
where
    F: FanOut + ?Sized,
{
    let ControlState {
        mut parent_frames,
        current,
        pending_child,
    } = state;

    if current.is_finished() {
        return Ok(match parent_frames.pop() {
            None => Step::Done(current.pointer.value),
            Some(parent) => {
                tracing::debug!(
                    depth = parent_frames.len(),
                    resume_at = parent.pointer.index,
                    "Nested pipeline finished"
                );
                Step::Continue(ControlState {
                    parent_frames,
                    current: parent,
                    pending_child: Some(current.pointer),
                })
            }
        });
    }

    let Frame {
        pointer: Pointer { index, value },
        pipeline,
    } = current;
    let stage = pipeline.stages()[index].clone();
    let kind = stage.kind();

    tracing::debug!(
        index = index,
        kind = %kind,
        depth = parent_frames.len(),
        "Executing stage"
    );

    let advanced = |value: Value| Frame {
        pointer: Pointer::new(index + 1, value),
        pipeline: pipeline.clone(),
    };

    let next = match stage {
        Stage::Transform(transform) => {
            let value = transform.call(value).map_err(|e| e.at_stage(kind, index))?;
            ControlState {
                current: advanced(value),
                parent_frames,
                pending_child: None,
            }
        }
        Stage::ParallelMap(parallel) => {
            let path = StagePath::through(&parent_frames, index);
            let dispatch = fan_out.dispatcher(&path, &parallel);
            let value = parallel.run(value, dispatch).await.map_err(|e| {
                tracing::warn!(path = %path, error = %e, "ParallelMap stage failed");
                e.at_stage(kind, index)
            })?;
            ControlState {
                current: advanced(value),
                parent_frames,
                pending_child: None,
            }
        }
        Stage::Apply(apply) => match pending_child {
            None => {
                let inner = apply.inner().clone();
                parent_frames.push(Frame {
                    pointer: Pointer::new(index, value),
                    pipeline: pipeline.clone(),
                });
                ControlState {
                    parent_frames,
                    current: Frame::start(inner),
                    pending_child: None,
                }
            }
            Some(child) => {
                let value = apply
                    .call(child.value, value)
                    .map_err(|e| e.at_stage(kind, index))?;
                // Resume in the pipeline owning this Apply, not the finished inner one.
                ControlState {
                    current: advanced(value),
                    parent_frames,
                    pending_child: None,
                }
            }
        },
    };

    Ok(Step::Continue(next))
}

/// Run `pipeline` to completion, fanning ParallelMap stages out via `fan_out`
pub async fn execute<F>(pipeline: ErasedPipeline, fan_out: &F) -> Result<Value>
where
    F: FanOut + ?Sized,
{
    trampoline(ControlState::new(pipeline), |state| step(state, fan_out)).await
}
