//! Error Types - Tessera Core Error Handling
//!
//! Provides the single error type shared by every Tessera crate. The first
//! five variants are the engine's user-facing taxonomy (configuration, type,
//! value, dimension mismatch, execution); the rest are raised by the array
//! layer.
//!
//! # Key Features
//! - Unified error type for graph construction and execution
//! - Dimension mismatch messages that mark broadcastable axes with `*`
//! - Execution errors that carry the failing operator and operand shapes
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use thiserror::Error;

use crate::dtype::DType;

// =============================================================================
// Error Types
// =============================================================================

/// The main error type for Tessera operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An operator descriptor was built from invalid parameters.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What was wrong with the parameters.
        message: String,
    },

    /// Graph inputs do not have the types an operator requires.
    #[error("Type error: {message}")]
    Type {
        /// Description of the type conflict.
        message: String,
    },

    /// An operator was asked for something it cannot legally do, such as
    /// writing in place into a narrower input.
    #[error("Value error: {message}")]
    Value {
        /// Description of the illegal request.
        message: String,
    },

    /// Runtime operand extents disagree on a non-broadcastable axis.
    #[error("Dimension mismatch; shapes are {shapes}")]
    DimensionMismatch {
        /// Rendered operand shapes, `*` marking broadcastable axes.
        shapes: String,
    },

    /// A per-element computation failed while an operator was running.
    #[error("{source}\nApply node that caused the error: {op}, shapes of inputs: {shapes:?}")]
    Execution {
        /// Display form of the failing operator.
        op: String,
        /// Shapes of every operand at the time of failure.
        shapes: Vec<Vec<usize>>,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Shape mismatch between arrays.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// Element type mismatch between arrays or values.
    #[error("DType mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        /// The expected element type.
        expected: DType,
        /// The actual element type.
        actual: DType,
    },

    /// Invalid dimension index.
    #[error("Invalid dimension: index {index} for array with {ndim} dimensions")]
    InvalidDimension {
        /// The invalid dimension index.
        index: i64,
        /// Number of dimensions in the array.
        ndim: usize,
    },

    /// Index out of bounds.
    #[error("Index out of bounds: index {index} for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index.
        index: usize,
        /// The size of the dimension.
        size: usize,
    },

    /// A write was attempted through a read-only view.
    #[error("Array is not writeable")]
    ReadOnly,

    /// Invalid operation for the given operands.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

// =============================================================================
// Result Type
// =============================================================================

/// A specialized Result type for Tessera operations.
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// Helper Functions
// =============================================================================

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new type error.
    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    /// Creates a new value error.
    #[must_use]
    pub fn value(message: impl Into<String>) -> Self {
        Self::Value {
            message: message.into(),
        }
    }

    /// Creates a new shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a new invalid operation error.
    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Builds a dimension mismatch from operand shapes and broadcast flags.
    ///
    /// Each shape is rendered as a tuple; axes flagged broadcastable print as
    /// `*` instead of their extent.
    #[must_use]
    pub fn dimension_mismatch(operands: &[(&[usize], &[bool])]) -> Self {
        let shapes = operands
            .iter()
            .map(|(shape, bcast)| render_shape(shape, bcast))
            .collect::<Vec<_>>()
            .join(", ");
        Self::DimensionMismatch { shapes }
    }

    /// Wraps `self` as the cause of an execution failure in `op`.
    #[must_use]
    pub fn during(self, op: impl Into<String>, shapes: Vec<Vec<usize>>) -> Self {
        Self::Execution {
            op: op.into(),
            shapes,
            source: Box::new(self),
        }
    }
}

/// Renders a shape as `(3, *, 5)`; rank 1 is `(3)` and rank 0 is `()`.
fn render_shape(shape: &[usize], bcast: &[bool]) -> String {
    let dims: Vec<String> = shape
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if bcast.get(i).copied().unwrap_or(false) {
                "*".to_string()
            } else {
                d.to_string()
            }
        })
        .collect();
    format!("({})", dims.join(", "))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::shape_mismatch(&[2, 3], &[2, 4]);
        assert!(err.to_string().contains("Shape mismatch"));
    }

    #[test]
    fn test_dimension_mismatch_marks_broadcastable_axes() {
        let err = Error::dimension_mismatch(&[(&[3, 4], &[false, false]), (&[1, 5], &[true, false])]);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch; shapes are (3, 4), (*, 5)"
        );
    }

    #[test]
    fn test_rank_one_and_scalar_rendering() {
        let err = Error::dimension_mismatch(&[(&[7], &[false]), (&[], &[])]);
        assert_eq!(err.to_string(), "Dimension mismatch; shapes are (7), ()");
    }

    #[test]
    fn test_execution_wraps_source() {
        let inner = Error::invalid_operation("log of bool");
        let err = inner.clone().during("Elemwise{log}", vec![vec![2, 2]]);
        match &err {
            Error::Execution { op, shapes, source } => {
                assert_eq!(op, "Elemwise{log}");
                assert_eq!(shapes, &vec![vec![2, 2]]);
                assert_eq!(**source, inner);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("Apply node that caused the error"));
    }
}
