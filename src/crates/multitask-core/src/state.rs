//! Interpreter control state
//!
//! The interpreter never recurses. Descending into an Apply stage pushes a
//! [`Frame`] onto [`ControlState::parent_frames`]; finishing a nested
//! pipeline pops it back and parks the finished [`Pointer`] in
//! [`ControlState::pending_child`] until the owning Apply stage consumes it.

use crate::pipeline::ErasedPipeline;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position within one pipeline plus the running value at that position
#[derive(Debug)]
pub struct Pointer {
    /// Index of the next stage to execute
    pub index: usize,
    pub value: Value,
}

impl Pointer {
    pub fn new(index: usize, value: Value) -> Self {
        Self { index, value }
    }
}

/// A pointer paired with the pipeline it walks
#[derive(Debug)]
pub struct Frame {
    pub pointer: Pointer,
    pub pipeline: ErasedPipeline,
}

impl Frame {
    /// Frame positioned before the first stage of `pipeline`
    pub fn start(pipeline: ErasedPipeline) -> Self {
        let value = pipeline.initial_value();
        Self {
            pointer: Pointer::new(0, value),
            pipeline,
        }
    }

    /// Whether every stage of the pipeline has run
    pub fn is_finished(&self) -> bool {
        self.pointer.index >= self.pipeline.len()
    }
}

/// Heap-resident replacement for a call stack
#[derive(Debug)]
pub struct ControlState {
    /// Frames suspended on an Apply stage, root first
    pub parent_frames: Vec<Frame>,
    pub current: Frame,
    /// Finished pointer of a nested pipeline awaiting delivery to its Apply
    pub pending_child: Option<Pointer>,
}

impl ControlState {
    /// Initial state for a run of `pipeline`
    pub fn new(pipeline: ErasedPipeline) -> Self {
        Self {
            parent_frames: Vec::new(),
            current: Frame::start(pipeline),
            pending_child: None,
        }
    }

    /// Stage indices from the root pipeline down to the current stage
    pub fn path(&self) -> StagePath {
        StagePath::through(&self.parent_frames, self.current.pointer.index)
    }

    /// Number of Apply stages currently entered
    pub fn depth(&self) -> usize {
        self.parent_frames.len()
    }
}

/// Address of a stage, as indices into successively nested stage lists
///
/// Every index but the last names an Apply stage whose inner pipeline the
/// next index addresses. Serialized as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagePath(pub Vec<usize>);

impl StagePath {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// Path through `frames` ending at stage `index` of the innermost pipeline
    pub fn through(frames: &[Frame], index: usize) -> Self {
        let mut indices: Vec<usize> = frames.iter().map(|frame| frame.pointer.index).collect();
        indices.push(index);
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for StagePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for StagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", index)?;
        }
        write!(f, "]")
    }
}
