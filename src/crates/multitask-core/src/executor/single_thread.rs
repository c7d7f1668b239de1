//! In-process engine.
//!
//! Every ParallelMap element runs as a future in the caller's task; the
//! capability's traversal awaits them concurrently and gathers outputs in
//! input order. There is no OS-level parallelism here, only interleaving at
//! await points.
//!
//! Elements still cross the JSON boundary each way, exactly as they would
//! when sent to a worker, so a pipeline that runs here also runs on the
//! distributed engine.

use crate::error::Result;
use crate::interpreter::{self, FanOut};
use crate::pipeline::{ErasedPipeline, Pipeline};
use crate::stage::{ElementDispatch, ParallelMap};
use crate::state::StagePath;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Reference engine running everything in the calling task
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleThreadExecutor;

impl SingleThreadExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run a typed pipeline to completion
    pub async fn run<T: 'static>(&self, pipeline: Pipeline<T>) -> Result<T> {
        self.run_erased(pipeline.into_erased()).await?.downcast::<T>()
    }

    /// Run an erased pipeline to completion
    pub async fn run_erased(&self, pipeline: ErasedPipeline) -> Result<Value> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "pipeline_run",
            run_id = %run_id,
            engine = "single_thread",
            stages = pipeline.len()
        );

        async move {
            tracing::info!("Starting pipeline run");
            match interpreter::execute(pipeline, self).await {
                Ok(value) => {
                    tracing::info!(result_type = value.type_name(), "Pipeline run completed");
                    Ok(value)
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

impl FanOut for SingleThreadExecutor {
    fn dispatcher(&self, path: &StagePath, stage: &ParallelMap) -> Arc<dyn ElementDispatch> {
        tracing::debug!(path = %path, capability = stage.capability(), "Fanning out in-process");
        Arc::new(LocalDispatch {
            stage: stage.clone(),
        })
    }
}

struct LocalDispatch {
    stage: ParallelMap,
}

#[async_trait]
impl ElementDispatch for LocalDispatch {
    async fn dispatch(&self, _position: usize, element: serde_json::Value) -> Result<serde_json::Value> {
        self.stage.call_element(element).await
    }
}

/// Run `pipeline` on a [`SingleThreadExecutor`]
pub async fn run_single_thread<T: 'static>(pipeline: Pipeline<T>) -> Result<T> {
    SingleThreadExecutor::new().run(pipeline).await
}
