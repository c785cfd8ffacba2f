//! Array Creation Functions
//!
//! Factory functions for building arrays with common initializations.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use tessera_core::dtype::DType;
use tessera_core::error::Result;
use tessera_core::value::Value;

use crate::array::Array;
use crate::shape::numel;

// =============================================================================
// Constant Initialization
// =============================================================================

/// Creates an array filled with zeros.
#[must_use]
pub fn zeros(dtype: DType, shape: &[usize]) -> Array {
    Array::zeros(dtype, shape)
}

/// Creates an array filled with ones.
#[must_use]
pub fn ones(dtype: DType, shape: &[usize]) -> Array {
    Array::full(shape, Value::one(dtype))
}

/// Creates an array shaped like `other` filled with ones.
#[must_use]
pub fn ones_like(other: &Array) -> Array {
    ones(other.dtype(), other.shape())
}

// =============================================================================
// Ranges
// =============================================================================

/// Creates an array holding `0, 1, 2, ...` in row-major order over `shape`.
pub fn arange(dtype: DType, shape: &[usize]) -> Result<Array> {
    let values = (0..numel(shape)).map(|i| Value::I64(i as i64)).collect();
    Array::from_values(dtype, values, shape)
}

// =============================================================================
// Tests
// =============================================================================
