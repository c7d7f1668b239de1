//! Worker side of the distributed engine
//!
//! A worker starts with nothing but its [`WorkerStart`]. It re-derives the
//! pipeline from the entry point, follows the message's path down through
//! Apply stages to one ParallelMap stage, runs that stage's element function
//! on the message's value and replies exactly once.

use crate::protocol::{Reply, WorkerMessage};
use crate::transport::WorkerStart;
use multitask_core::{ErasedPipeline, ParallelMap, PipelineError, Result, Stage, StagePath};

/// Find the ParallelMap stage `path` addresses within `pipeline`
///
/// Every index but the last must land on an Apply stage, whose inner
/// pipeline the next index addresses; the last must land on a ParallelMap
/// stage. Anything else is a protocol error.
pub fn resolve<'a>(pipeline: &'a ErasedPipeline, path: &StagePath) -> Result<&'a ParallelMap> {
    let (last, hops) = path
        .indices()
        .split_last()
        .ok_or_else(|| PipelineError::Protocol("Worker path is empty".to_string()))?;

    let mut current = pipeline;
    for (hop, &index) in hops.iter().enumerate() {
        current = match current.stage(index) {
            Some(Stage::Apply(apply)) => apply.inner(),
            Some(other) => {
                return Err(PipelineError::Protocol(format!(
                    "Hop {} of path {} is a {} stage; only Apply stages can be entered",
                    hop,
                    path,
                    other.kind()
                )))
            }
            None => return Err(out_of_range(path, hop, index, current)),
        };
    }

    match current.stage(*last) {
        Some(Stage::ParallelMap(stage)) => Ok(stage),
        Some(other) => Err(PipelineError::Protocol(format!(
            "Cannot execute {} stage at {} in a worker",
            other.kind(),
            path
        ))),
        None => Err(out_of_range(path, hops.len(), *last, current)),
    }
}

fn out_of_range(path: &StagePath, hop: usize, index: usize, pipeline: &ErasedPipeline) -> PipelineError {
    PipelineError::Protocol(format!(
        "Hop {} of path {} points at stage {} of a pipeline with {} stages",
        hop,
        path,
        index,
        pipeline.len()
    ))
}

/// Execute the element a worker message describes
pub async fn execute_message(pipeline: &ErasedPipeline, message: WorkerMessage) -> Result<serde_json::Value> {
    let stage = resolve(pipeline, &message.path)?;
    stage.call_element(message.value).await
}

/// Serve one worker start-up: run the element and send the reply
///
/// Errors returned here concern the reply itself; element failures are
/// delivered to the coordinator inside the reply.
pub async fn serve(pipeline: &ErasedPipeline, start: WorkerStart) -> Result<()> {
    let WorkerStart {
        name,
        payload,
        reply,
        cancel,
    } = start;

    let outcome = if cancel.is_cancelled() {
        Err(PipelineError::Cancelled(format!(
            "{} skipped its element after a sibling failed",
            name
        )))
    } else {
        match WorkerMessage::decode(&payload) {
            Ok(message) => {
                tracing::debug!(worker = %name, path = %message.path, "Executing element");
                execute_message(pipeline, message).await
            }
            Err(e) => Err(e),
        }
    };

    if let Err(e) = &outcome {
        tracing::warn!(worker = %name, error = %e, "Element failed");
        cancel.cancel();
    }

    reply.send(Reply::from_result(&outcome).encode()?)
}
