//! Error types for pipeline construction and execution
//!
//! Every failure a run can produce is a [`PipelineError`]. Errors are never
//! retried or recovered by the interpreter: the first error observed ends the
//! run and is handed back to the caller as-is.
//!
//! # Error Hierarchy
//!
//! ```text
//! PipelineError
//! ├── Stage            - A stage function failed (wraps the cause with stage context)
//! ├── Raised           - Error returned by a caller-supplied function
//! ├── TypeMismatch     - A running value did not have the expected type
//! ├── Protocol         - Worker path did not resolve to a ParallelMap stage
//! ├── WorkerSpawn      - A worker could not be started
//! ├── WorkerExited     - A worker terminated without replying
//! ├── MalformedReply   - A worker reply could not be decoded
//! ├── Cancelled        - A worker skipped its element after a sibling failed
//! ├── Serialization    - JSON encoding/decoding of an element failed
//! ├── Configuration    - Invalid engine configuration
//! └── Io               - I/O failure (configuration files)
//! ```
//!
//! # Categories
//!
//! [`PipelineError::category`] folds the variants into the three kinds of
//! failure a run distinguishes, plus configuration problems that happen
//! before a run starts:
//!
//! ```rust
//! use multitask_core::error::{ErrorCategory, PipelineError};
//!
//! let err = PipelineError::Protocol("path [0, 3] ends on a Transform stage".to_string());
//! assert_eq!(err.category(), ErrorCategory::Protocol);
//! ```

use crate::stage::StageKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed while being applied to the running value
    ///
    /// Wraps the underlying cause with the kind and index of the stage that
    /// raised it. Only application errors are wrapped; protocol and
    /// transport errors surface unwrapped.
    #[error("{kind} stage {index} failed: {source}")]
    Stage {
        /// Kind of the failing stage
        kind: StageKind,
        /// Index of the stage within its own pipeline
        index: usize,
        /// Underlying cause
        #[source]
        source: Box<PipelineError>,
    },

    /// Error returned by a caller-supplied stage or element function
    #[error("{0}")]
    Raised(String),

    /// The running value did not have the type a stage expected
    ///
    /// Only reachable through the erased stage constructors; the typed
    /// [`Pipeline`](crate::Pipeline) API rules it out at compile time.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the stage asked for
        expected: &'static str,
        /// Type the running value actually held
        found: &'static str,
    },

    /// Worker re-entry path did not resolve to a ParallelMap stage
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A worker could not be started
    #[error("Failed to start worker: {0}")]
    WorkerSpawn(String),

    /// A worker terminated without sending its reply
    #[error("Worker exited abnormally: {0}")]
    WorkerExited(String),

    /// A worker reply or start-up message could not be decoded
    #[error("Malformed worker message: {0}")]
    MalformedReply(String),

    /// A worker skipped its element because a sibling already failed
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`PipelineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A stage function failed during execution
    Stage,
    /// Malformed worker path or mismatched pipeline definitions
    Protocol,
    /// Worker start-up, termination or messaging failure
    Transport,
    /// Invalid configuration, raised before any run starts
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Stage => write!(f, "stage"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Transport => write!(f, "transport"),
            ErrorCategory::Configuration => write!(f, "configuration"),
        }
    }
}

impl PipelineError {
    /// Create an error from a caller-supplied function's failure
    pub fn raised(error: impl fmt::Display) -> Self {
        Self::Raised(error.to_string())
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Stage { source, .. } => source.category(),
            PipelineError::Raised(_)
            | PipelineError::TypeMismatch { .. }
            | PipelineError::Serialization(_) => ErrorCategory::Stage,
            PipelineError::Protocol(_) => ErrorCategory::Protocol,
            PipelineError::WorkerSpawn(_)
            | PipelineError::WorkerExited(_)
            | PipelineError::MalformedReply(_)
            | PipelineError::Cancelled(_) => ErrorCategory::Transport,
            PipelineError::Configuration(_) | PipelineError::Io(_) => {
                ErrorCategory::Configuration
            }
        }
    }

    /// Attach stage context to an application error
    ///
    /// Protocol, transport and already-wrapped errors pass through unchanged
    /// so the outermost context is always the stage that actually failed.
    pub fn at_stage(self, kind: StageKind, index: usize) -> Self {
        match self {
            PipelineError::Raised(_)
            | PipelineError::TypeMismatch { .. }
            | PipelineError::Serialization(_) => PipelineError::Stage {
                kind,
                index,
                source: Box::new(self),
            },
            other => other,
        }
    }

    /// The innermost error, skipping stage context wrappers
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
