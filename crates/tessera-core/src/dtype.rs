//! Data Types - Tessera Type System
//!
//! Defines the element types an array may hold and the `Element` trait that
//! ties each Rust primitive to its runtime tag. Supports floating point
//! (f32, f64), signed and unsigned integers, and booleans.
//!
//! # Key Features
//! - Runtime dtype information via `DType` enum
//! - Numpy-style type promotion for scalar type inference
//! - Typed extraction of values and buffers via `Element`
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::storage::Buffer;
use crate::value::Value;

// =============================================================================
// DType Enum
// =============================================================================

/// Runtime representation of array element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Boolean type.
    Bool,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// 32-bit floating point (single precision).
    F32,
    /// 64-bit floating point (double precision).
    F64,
}

impl DType {
    /// All supported element types.
    pub const ALL: [DType; 10] = [
        DType::Bool,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::U8,
        DType::U32,
        DType::U64,
        DType::F32,
        DType::F64,
    ];

    /// Returns the size in bytes of this data type.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }

    /// Returns true if this is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns true if this is a signed integer type.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Returns true if this is an unsigned integer type.
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::U8 | Self::U32 | Self::U64)
    }

    /// Returns true if this is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// Returns true for types without a continuous derivative (ints, bool).
    #[must_use]
    pub const fn is_discrete(self) -> bool {
        !self.is_float()
    }

    /// Returns the name of this data type as a string.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Returns the C type used when emitting specialized kernels.
    #[must_use]
    pub const fn c_type(self) -> &'static str {
        match self {
            Self::Bool => "npy_bool",
            Self::I8 => "npy_int8",
            Self::I16 => "npy_int16",
            Self::I32 => "npy_int32",
            Self::I64 => "npy_int64",
            Self::U8 => "npy_uint8",
            Self::U32 => "npy_uint32",
            Self::U64 => "npy_uint64",
            Self::F32 => "npy_float32",
            Self::F64 => "npy_float64",
        }
    }

    /// Returns the smallest type both `self` and `other` convert to
    /// without loss, following numpy's promotion table.
    #[must_use]
    pub fn promote(self, other: DType) -> DType {
        use DType::{Bool, F32, F64, I16, I64, U8};

        if self == other {
            return self;
        }
        match (self, other) {
            (Bool, t) | (t, Bool) => t,
            (a, b) if a.is_float() || b.is_float() => {
                let (float, rest) = if a.is_float() { (a, b) } else { (b, a) };
                if float == F64 || rest == F64 || (rest.is_integer() && rest.size_of() >= 4) {
                    F64
                } else {
                    F32
                }
            }
            (a, b) if a.is_signed() == b.is_signed() => {
                if a.size_of() >= b.size_of() {
                    a
                } else {
                    b
                }
            }
            (a, b) => {
                let (signed, unsigned) = if a.is_signed() { (a, b) } else { (b, a) };
                if signed.size_of() > unsigned.size_of() {
                    signed
                } else if unsigned == U8 {
                    I16
                } else {
                    I64
                }
            }
        }
    }

    /// Promotes an entire list of types; `None` for an empty list.
    #[must_use]
    pub fn promote_all(types: &[DType]) -> Option<DType> {
        let (first, rest) = types.split_first()?;
        Some(rest.iter().fold(*first, |acc, t| acc.promote(*t)))
    }
}

impl Default for DType {
    fn default() -> Self {
        Self::F64
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Element Trait
// =============================================================================

/// Trait for Rust primitives that can be stored in an array.
pub trait Element: Copy + Debug + Default + PartialEq + Send + Sync + 'static {
    /// The runtime dtype for this element type.
    const DTYPE: DType;

    /// Wraps this element as a tagged value.
    fn into_value(self) -> Value;

    /// Extracts an element from a value, casting when the tag differs.
    fn from_value(value: Value) -> Self;

    /// Moves a vector of elements into a tagged buffer.
    fn into_buffer(data: Vec<Self>) -> Buffer;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Self {
                match value.cast(DType::$variant) {
                    Value::$variant(v) => v,
                    _ => Self::default(),
                }
            }

            fn into_buffer(data: Vec<Self>) -> Buffer {
                Buffer::$variant(data)
            }
        }
    };
}

impl_element!(bool, Bool);
impl_element!(i8, I8);
impl_element!(i16, I16);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(u8, U8);
impl_element!(u32, U32);
impl_element!(u64, U64);
impl_element!(f32, F32);
impl_element!(f64, F64);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F32.size_of(), 4);
        assert_eq!(DType::F64.size_of(), 8);
        assert_eq!(DType::I16.size_of(), 2);
        assert_eq!(DType::Bool.size_of(), 1);
    }

    #[test]
    fn test_dtype_classes() {
        assert!(DType::F32.is_float());
        assert!(DType::I8.is_signed());
        assert!(DType::U32.is_unsigned());
        assert!(DType::Bool.is_discrete());
        assert!(!DType::Bool.is_integer());
    }

    #[test]
    fn test_promote_same_and_bool() {
        assert_eq!(DType::I32.promote(DType::I32), DType::I32);
        assert_eq!(DType::Bool.promote(DType::F32), DType::F32);
        assert_eq!(DType::U8.promote(DType::Bool), DType::U8);
    }

    #[test]
    fn test_promote_integers() {
        assert_eq!(DType::I8.promote(DType::I64), DType::I64);
        assert_eq!(DType::U8.promote(DType::U32), DType::U32);
        assert_eq!(DType::U8.promote(DType::I8), DType::I16);
        assert_eq!(DType::U8.promote(DType::I32), DType::I32);
        assert_eq!(DType::U32.promote(DType::I32), DType::I64);
        assert_eq!(DType::U64.promote(DType::I8), DType::I64);
    }

    #[test]
    fn test_promote_floats() {
        assert_eq!(DType::F32.promote(DType::I8), DType::F32);
        assert_eq!(DType::F32.promote(DType::I16), DType::F32);
        assert_eq!(DType::F32.promote(DType::I32), DType::F64);
        assert_eq!(DType::F32.promote(DType::F64), DType::F64);
        assert_eq!(DType::promote_all(&[DType::I8, DType::U8, DType::F32]), Some(DType::F32));
        assert_eq!(DType::promote_all(&[]), None);
    }

    #[test]
    fn test_element_roundtrip() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(i64::from_value(Value::F64(3.7)), 3);
        assert!(bool::from_value(Value::I32(2)));
        assert_eq!(2.5_f64.into_value(), Value::F64(2.5));
    }

    #[test]
    fn test_dtype_serde_name() {
        let json = serde_json::to_string(&DType::I16).unwrap();
        assert_eq!(json, "\"i16\"");
    }
}
