//! Tensor Types - Static Typing of Graph Variables
//!
//! Every symbolic variable carries a `TensorType`: an element dtype plus a
//! broadcast pattern with one flag per axis. A `true` flag promises the axis
//! has extent 1 at run time and may be stretched against other operands.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tessera_core::dtype::DType;
use tessera_core::error::{Error, Result};
use tessera_tensor::Array;

/// One flag per axis; `true` marks an axis of extent 1 that may broadcast.
pub type BroadcastPattern = SmallVec<[bool; 6]>;

// =============================================================================
// TensorType
// =============================================================================

/// Static type of a symbolic array: dtype and broadcast pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    /// Element type.
    pub dtype: DType,
    /// Broadcast flag of each axis; its length is the rank.
    pub broadcastable: BroadcastPattern,
}

impl TensorType {
    /// Creates a tensor type.
    #[must_use]
    pub fn new(dtype: DType, broadcastable: &[bool]) -> Self {
        Self {
            dtype,
            broadcastable: BroadcastPattern::from_slice(broadcastable),
        }
    }

    /// A rank-0 type.
    #[must_use]
    pub fn scalar(dtype: DType) -> Self {
        Self::new(dtype, &[])
    }

    /// The type a concrete array would be given as a constant: unit axes
    /// are broadcastable.
    #[must_use]
    pub fn of_array(array: &Array) -> Self {
        Self {
            dtype: array.dtype(),
            broadcastable: array.shape().iter().map(|&d| d == 1).collect(),
        }
    }

    /// Returns the rank.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.broadcastable.len()
    }

    /// Checks that `array` is a legal run-time value of this type.
    pub fn check(&self, array: &Array) -> Result<()> {
        if array.dtype() != self.dtype {
            return Err(Error::type_error(format!(
                "expected an array of {}, got {}",
                self.dtype,
                array.dtype()
            )));
        }
        if array.ndim() != self.ndim() {
            return Err(Error::type_error(format!(
                "expected an array with {} dimensions, got shape {:?}",
                self.ndim(),
                array.shape()
            )));
        }
        for (axis, (&bcast, &extent)) in self.broadcastable.iter().zip(array.shape()).enumerate() {
            if bcast && extent != 1 {
                return Err(Error::type_error(format!(
                    "axis {axis} is broadcastable but has extent {extent} in shape {:?}",
                    array.shape()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = self
            .broadcastable
            .iter()
            .map(|&b| if b { "true" } else { "false" })
            .collect();
        write!(f, "TensorType({}, ({}))", self.dtype, flags.join(", "))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of_array() {
        let a = Array::zeros(DType::F32, &[1, 5]);
        let ty = TensorType::of_array(&a);
        assert_eq!(ty, TensorType::new(DType::F32, &[true, false]));
        assert_eq!(ty.ndim(), 2);
    }

    #[test]
    fn test_check() {
        let ty = TensorType::new(DType::F64, &[true, false]);
        assert!(ty.check(&Array::zeros(DType::F64, &[1, 3])).is_ok());
        assert!(matches!(ty.check(&Array::zeros(DType::F64, &[2, 3])), Err(Error::Type { .. })));
        assert!(matches!(ty.check(&Array::zeros(DType::F32, &[1, 3])), Err(Error::Type { .. })));
        assert!(matches!(ty.check(&Array::zeros(DType::F64, &[3])), Err(Error::Type { .. })));
    }

    #[test]
    fn test_display() {
        let ty = TensorType::new(DType::I8, &[false, true]);
        assert_eq!(ty.to_string(), "TensorType(i8, (false, true))");
    }
}
