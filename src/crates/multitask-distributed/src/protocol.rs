//! Worker wire protocol
//!
//! A worker receives exactly one [`WorkerMessage`] at start-up and sends
//! exactly one [`Reply`] back. Both travel as JSON text:
//!
//! ```text
//! start:  {"path": [1, 0], "value": 3}
//! reply:  {"ok": true, "value": 4}
//!         {"ok": false, "error": {"kind": "stage", "message": "boom"}}
//! ```

use multitask_core::{ErrorCategory, PipelineError, Result, StagePath};
use serde::{Deserialize, Deserializer, Serialize};

/// Start-up payload addressing one element of one ParallelMap stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMessage {
    /// Route from the root pipeline to the ParallelMap stage
    pub path: StagePath,
    /// The element, already encoded
    pub value: serde_json::Value,
}

impl WorkerMessage {
    pub fn new(path: StagePath, value: serde_json::Value) -> Self {
        Self { path, value }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| {
            PipelineError::MalformedReply(format!("Failed to decode worker message: {}", e))
        })
    }
}

/// Kind of failure a worker reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The element function failed
    Stage,
    /// The path did not resolve to a ParallelMap stage
    Protocol,
    /// The worker could not set itself up
    Transport,
    /// The start-up message could not be decoded
    Malformed,
    /// The element was skipped after a sibling failed
    Cancelled,
}

/// Serializable description of a worker-side failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorDescription {
    /// Describe `error` for the coordinator
    ///
    /// Stage failures carry only the innermost message: the coordinator adds
    /// its own stage context when the error reaches the interpreter.
    pub fn from_error(error: &PipelineError) -> Self {
        let kind = match error {
            PipelineError::Protocol(_) => FailureKind::Protocol,
            PipelineError::MalformedReply(_) => FailureKind::Malformed,
            PipelineError::Cancelled(_) => FailureKind::Cancelled,
            other => match other.category() {
                ErrorCategory::Stage => FailureKind::Stage,
                _ => FailureKind::Transport,
            },
        };

        let message = match error.root_cause() {
            PipelineError::Raised(message)
            | PipelineError::Protocol(message)
            | PipelineError::MalformedReply(message)
            | PipelineError::Cancelled(message)
            | PipelineError::WorkerSpawn(message) => message.clone(),
            other => other.to_string(),
        };

        Self { kind, message }
    }

    /// Rebuild the error on the coordinator side
    pub fn into_error(self) -> PipelineError {
        match self.kind {
            FailureKind::Stage => PipelineError::Raised(self.message),
            FailureKind::Protocol => PipelineError::Protocol(self.message),
            FailureKind::Transport => PipelineError::WorkerSpawn(self.message),
            FailureKind::Malformed => PipelineError::MalformedReply(self.message),
            FailureKind::Cancelled => PipelineError::Cancelled(self.message),
        }
    }
}

/// Success-or-failure envelope sent back by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    /// `None` only when the field is absent; an explicit `null` is `Some`
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescription>,
}

fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl Reply {
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(error: &PipelineError) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(ErrorDescription::from_error(error)),
        }
    }

    /// Envelope for a finished element
    pub fn from_result(result: &Result<serde_json::Value>) -> Self {
        match result {
            Ok(value) => Self::success(value.clone()),
            Err(e) => Self::failure(e),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| PipelineError::MalformedReply(format!("Failed to decode reply: {}", e)))
    }

    /// The element output, or the worker's failure as an error
    pub fn into_result(self) -> Result<serde_json::Value> {
        match (self.ok, self.error) {
            (true, _) => self.value.ok_or_else(|| {
                PipelineError::MalformedReply("Success reply carried no value".to_string())
            }),
            (false, Some(error)) => Err(error.into_error()),
            (false, None) => Err(PipelineError::MalformedReply(
                "Failure reply carried no error description".to_string(),
            )),
        }
    }
}
