//! Scalar Values - Dynamically Typed Array Elements
//!
//! `Value` is a single element tagged with its runtime dtype. Scalar
//! operations consume and produce values; arrays expose per-element access
//! through them.
//!
//! # Key Features
//! - Lossy numpy-style casting between every pair of dtypes
//! - Per-dtype zero, one and extreme values for reduction identities
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;

use num_traits::{Bounded, One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::dtype::DType;

// =============================================================================
// Value
// =============================================================================

/// A single array element together with its dtype.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Value {
    /// Boolean element.
    Bool(bool),
    /// 8-bit signed integer element.
    I8(i8),
    /// 16-bit signed integer element.
    I16(i16),
    /// 32-bit signed integer element.
    I32(i32),
    /// 64-bit signed integer element.
    I64(i64),
    /// 8-bit unsigned integer element.
    U8(u8),
    /// 32-bit unsigned integer element.
    U32(u32),
    /// 64-bit unsigned integer element.
    U64(u64),
    /// 32-bit float element.
    F32(f32),
    /// 64-bit float element.
    F64(f64),
}

/// Converts any numeric variant to `$ty` with an `as` cast.
macro_rules! cast_as {
    ($value:expr, $ty:ty) => {
        match $value {
            Value::Bool(b) => u8::from(b) as $ty,
            Value::I8(x) => x as $ty,
            Value::I16(x) => x as $ty,
            Value::I32(x) => x as $ty,
            Value::I64(x) => x as $ty,
            Value::U8(x) => x as $ty,
            Value::U32(x) => x as $ty,
            Value::U64(x) => x as $ty,
            Value::F32(x) => x as $ty,
            Value::F64(x) => x as $ty,
        }
    };
}

/// Builds a value of `$dtype` from a generic constructor over each primitive.
macro_rules! per_dtype {
    ($dtype:expr, $make:ident) => {
        match $dtype {
            DType::Bool => Value::Bool($make::<u8>() != 0),
            DType::I8 => Value::I8($make::<i8>()),
            DType::I16 => Value::I16($make::<i16>()),
            DType::I32 => Value::I32($make::<i32>()),
            DType::I64 => Value::I64($make::<i64>()),
            DType::U8 => Value::U8($make::<u8>()),
            DType::U32 => Value::U32($make::<u32>()),
            DType::U64 => Value::U64($make::<u64>()),
            DType::F32 => Value::F32($make::<f32>()),
            DType::F64 => Value::F64($make::<f64>()),
        }
    };
}

fn zero<T: Zero>() -> T {
    T::zero()
}

fn one<T: One>() -> T {
    T::one()
}

fn lowest<T: Bounded>() -> T {
    T::min_value()
}

fn highest<T: Bounded>() -> T {
    T::max_value()
}

impl Value {
    /// Returns the dtype tag of this value.
    #[must_use]
    pub const fn dtype(self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::I8(_) => DType::I8,
            Self::I16(_) => DType::I16,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::U8(_) => DType::U8,
            Self::U32(_) => DType::U32,
            Self::U64(_) => DType::U64,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    /// The additive identity of `dtype`.
    #[must_use]
    pub fn zero(dtype: DType) -> Self {
        per_dtype!(dtype, zero)
    }

    /// The multiplicative identity of `dtype`.
    #[must_use]
    pub fn one(dtype: DType) -> Self {
        per_dtype!(dtype, one)
    }

    /// The smallest value of `dtype`; negative infinity for floats.
    #[must_use]
    pub fn lowest(dtype: DType) -> Self {
        match dtype {
            DType::F32 => Self::F32(f32::NEG_INFINITY),
            DType::F64 => Self::F64(f64::NEG_INFINITY),
            DType::Bool => Self::Bool(false),
            _ => per_dtype!(dtype, lowest),
        }
    }

    /// The largest value of `dtype`; positive infinity for floats.
    #[must_use]
    pub fn highest(dtype: DType) -> Self {
        match dtype {
            DType::F32 => Self::F32(f32::INFINITY),
            DType::F64 => Self::F64(f64::INFINITY),
            DType::Bool => Self::Bool(true),
            _ => per_dtype!(dtype, highest),
        }
    }

    /// Converts to `dtype` with C-style casting semantics.
    ///
    /// Floats truncate toward zero and saturate when cast to integers;
    /// anything non-zero becomes `true` when cast to bool.
    #[must_use]
    pub fn cast(self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self;
        }
        match dtype {
            DType::Bool => Self::Bool(self.is_truthy()),
            DType::I8 => Self::I8(cast_as!(self, i8)),
            DType::I16 => Self::I16(cast_as!(self, i16)),
            DType::I32 => Self::I32(cast_as!(self, i32)),
            DType::I64 => Self::I64(cast_as!(self, i64)),
            DType::U8 => Self::U8(cast_as!(self, u8)),
            DType::U32 => Self::U32(cast_as!(self, u32)),
            DType::U64 => Self::U64(cast_as!(self, u64)),
            DType::F32 => Self::F32(cast_as!(self, f32)),
            DType::F64 => Self::F64(cast_as!(self, f64)),
        }
    }

    /// True for anything other than zero or `false`.
    #[must_use]
    pub fn is_truthy(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::F32(x) => x != 0.0,
            Self::F64(x) => x != 0.0,
            other => other.to_f64() != 0.0,
        }
    }

    /// Widens to f64; integers beyond 2^53 lose precision.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        let widened = match self {
            Self::Bool(b) => Some(f64::from(u8::from(b))),
            Self::I8(x) => x.to_f64(),
            Self::I16(x) => x.to_f64(),
            Self::I32(x) => x.to_f64(),
            Self::I64(x) => x.to_f64(),
            Self::U8(x) => x.to_f64(),
            Self::U32(x) => x.to_f64(),
            Self::U64(x) => x.to_f64(),
            Self::F32(x) => x.to_f64(),
            Self::F64(x) => Some(x),
        };
        widened.unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::I8(x) => write!(f, "{x}"),
            Self::I16(x) => write!(f, "{x}"),
            Self::I32(x) => write!(f, "{x}"),
            Self::I64(x) => write!(f, "{x}"),
            Self::U8(x) => write!(f, "{x}"),
            Self::U32(x) => write!(f, "{x}"),
            Self::U64(x) => write!(f, "{x}"),
            Self::F32(x) => write!(f, "{x}"),
            Self::F64(x) => write!(f, "{x}"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities() {
        assert_eq!(Value::zero(DType::I8), Value::I8(0));
        assert_eq!(Value::one(DType::F32), Value::F32(1.0));
        assert_eq!(Value::zero(DType::Bool), Value::Bool(false));
        assert_eq!(Value::one(DType::Bool), Value::Bool(true));
    }

    #[test]
    fn test_extremes() {
        assert_eq!(Value::lowest(DType::I16), Value::I16(i16::MIN));
        assert_eq!(Value::highest(DType::U8), Value::U8(255));
        assert_eq!(Value::lowest(DType::F64), Value::F64(f64::NEG_INFINITY));
    }

    #[test]
    fn test_cast() {
        assert_eq!(Value::F64(-2.9).cast(DType::I32), Value::I32(-2));
        assert_eq!(Value::I32(300).cast(DType::U8), Value::U8(44));
        assert_eq!(Value::Bool(true).cast(DType::F32), Value::F32(1.0));
        assert_eq!(Value::F32(0.0).cast(DType::Bool), Value::Bool(false));
        assert_eq!(Value::I8(-1).cast(DType::I64), Value::I64(-1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::I64(-7).to_string(), "-7");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }
}
