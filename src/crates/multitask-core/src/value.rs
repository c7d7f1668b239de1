//! Type-erased running values.

use crate::error::{PipelineError, Result};
use std::any::{self, Any};
use std::fmt;

/// The running value threaded through a pipeline's stages.
///
/// Stages of one pipeline change the value's type as they go, so the
/// interpreter carries it erased and each stage downcasts to the type it
/// was built for.
pub struct Value {
    inner: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Value {
    /// Wrap a value.
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            inner: Box::new(value),
            type_name: any::type_name::<T>(),
        }
    }

    /// Name of the wrapped type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the wrapped value is a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Take the wrapped value out as a `T`.
    pub fn downcast<T: 'static>(self) -> Result<T> {
        let found = self.type_name;
        self.inner
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| PipelineError::TypeMismatch {
                expected: any::type_name::<T>(),
                found,
            })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_round_trip() {
        let value = Value::new(vec![1i64, 2, 3]);
        assert!(value.is::<Vec<i64>>());
        assert_eq!(value.downcast::<Vec<i64>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_downcast_mismatch_names_both_types() {
        let err = Value::new(7u8).downcast::<String>().unwrap_err();
        match err {
            PipelineError::TypeMismatch { expected, found } => {
                assert_eq!(expected, "alloc::string::String");
                assert_eq!(found, "u8");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_debug_shows_type() {
        let value = Value::new("hello");
        assert!(format!("{:?}", value).contains("&str"));
    }
}
