//! Storage - Shared Typed Buffers for Arrays
//!
//! Provides the memory that underlies every array. A `Buffer` is a typed
//! vector tagged with its dtype; a `Storage` is a reference-counted,
//! lock-protected buffer shared between an array and all of its views.
//!
//! # Key Features
//! - Reference-counted buffers for zero-copy views
//! - Aliasing detection between arrays (`Storage::ptr_eq`)
//! - In-place resizing gated on unique ownership
//!
//! # Example
//! ```rust
//! use tessera_core::{DType, Storage};
//!
//! let storage = Storage::zeros(DType::F32, 100);
//! assert_eq!(storage.len(), 100);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::value::Value;

// =============================================================================
// Buffer
// =============================================================================

/// A contiguous vector of elements of a single dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    /// Boolean elements.
    Bool(Vec<bool>),
    /// 8-bit signed integers.
    I8(Vec<i8>),
    /// 16-bit signed integers.
    I16(Vec<i16>),
    /// 32-bit signed integers.
    I32(Vec<i32>),
    /// 64-bit signed integers.
    I64(Vec<i64>),
    /// 8-bit unsigned integers.
    U8(Vec<u8>),
    /// 32-bit unsigned integers.
    U32(Vec<u32>),
    /// 64-bit unsigned integers.
    U64(Vec<u64>),
    /// 32-bit floats.
    F32(Vec<f32>),
    /// 64-bit floats.
    F64(Vec<f64>),
}

/// Runs `$body` with `$v` bound to the inner vector, whatever its type.
macro_rules! with_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            Buffer::Bool($v) => $body,
            Buffer::I8($v) => $body,
            Buffer::I16($v) => $body,
            Buffer::I32($v) => $body,
            Buffer::I64($v) => $body,
            Buffer::U8($v) => $body,
            Buffer::U32($v) => $body,
            Buffer::U64($v) => $body,
            Buffer::F32($v) => $body,
            Buffer::F64($v) => $body,
        }
    };
}

impl Buffer {
    /// Creates a zero-filled buffer.
    #[must_use]
    pub fn zeros(dtype: DType, len: usize) -> Self {
        Self::filled(Value::zero(dtype), len)
    }

    /// Creates a buffer holding `len` copies of `value`.
    #[must_use]
    pub fn filled(value: Value, len: usize) -> Self {
        match value {
            Value::Bool(x) => Self::Bool(vec![x; len]),
            Value::I8(x) => Self::I8(vec![x; len]),
            Value::I16(x) => Self::I16(vec![x; len]),
            Value::I32(x) => Self::I32(vec![x; len]),
            Value::I64(x) => Self::I64(vec![x; len]),
            Value::U8(x) => Self::U8(vec![x; len]),
            Value::U32(x) => Self::U32(vec![x; len]),
            Value::U64(x) => Self::U64(vec![x; len]),
            Value::F32(x) => Self::F32(vec![x; len]),
            Value::F64(x) => Self::F64(vec![x; len]),
        }
    }

    /// Collects values into a buffer of `dtype`, casting each one.
    pub fn from_values(dtype: DType, values: impl IntoIterator<Item = Value>) -> Self {
        let values = values.into_iter();
        let mut buffer = Self::zeros(dtype, 0);
        with_vec!(&mut buffer, v => {
            v.reserve(values.size_hint().0);
            for value in values {
                v.push(Element::from_value(value));
            }
        });
        buffer
    }

    /// Returns the dtype of the elements.
    #[must_use]
    pub fn dtype(&self) -> DType {
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

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        with_vec!(self, v => v.len())
    }

    /// Returns true if the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the element at `index` as a tagged value.
    ///
    /// # Panics
    /// Panics if `index` is out of range; callers address through validated
    /// strides.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        with_vec!(self, v => v[index].into_value())
    }

    /// Writes `value` at `index`, casting it to the buffer's dtype.
    pub fn set(&mut self, index: usize, value: Value) {
        with_vec!(self, v => v[index] = Element::from_value(value));
    }

    /// Grows or shrinks to `len` elements, zero-filling new slots.
    pub fn resize(&mut self, len: usize) {
        with_vec!(self, v => v.resize(len, Default::default()));
    }

    /// Copies the elements out as `T`, casting when the dtype differs.
    #[must_use]
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        with_vec!(self, v => v.iter().map(|x| T::from_value(x.into_value())).collect())
    }
}

// =============================================================================
// Storage Struct
// =============================================================================

/// Reference-counted buffer shared between an array and its views.
///
/// Cloning a `Storage` never copies elements; use [`Storage::deep_copy`] for
/// an independent buffer.
#[derive(Debug)]
pub struct Storage {
    inner: Arc<RwLock<Buffer>>,
}

impl Storage {
    /// Creates zero-filled storage.
    #[must_use]
    pub fn zeros(dtype: DType, len: usize) -> Self {
        Self::from_buffer(Buffer::zeros(dtype, len))
    }

    /// Takes ownership of an existing buffer.
    #[must_use]
    pub fn from_buffer(buffer: Buffer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(buffer)),
        }
    }

    /// Creates storage from a typed vector.
    #[must_use]
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        Self::from_buffer(T::into_buffer(data))
    }

    /// Returns the dtype of the stored elements.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.inner.read().dtype()
    }

    /// Returns the number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the storage holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if no other handle refers to this buffer.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    /// Returns true if both handles refer to the same buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Locks the buffer for reading.
    #[must_use]
    pub fn read(&self) -> StorageReadGuard<'_> {
        StorageReadGuard {
            guard: self.inner.read(),
        }
    }

    /// Locks the buffer for writing.
    #[must_use]
    pub fn write(&self) -> StorageWriteGuard<'_> {
        StorageWriteGuard {
            guard: self.inner.write(),
        }
    }

    /// Resizes the buffer in place.
    ///
    /// Refused when the buffer is shared, since other views would observe
    /// the change.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        if !self.is_unique() {
            return Err(Error::invalid_operation(
                "cannot resize storage that is aliased by another array",
            ));
        }
        self.inner.write().resize(len);
        Ok(())
    }

    /// Creates an independent copy of the buffer.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self::from_buffer(self.inner.read().clone())
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// =============================================================================
// Guard Types
// =============================================================================

/// Read guard for storage data.
pub struct StorageReadGuard<'a> {
    guard: RwLockReadGuard<'a, Buffer>,
}

impl Deref for StorageReadGuard<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Write guard for storage data.
pub struct StorageWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, Buffer>,
}

impl Deref for StorageWriteGuard<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for StorageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_zeros() {
        let storage = Storage::zeros(DType::F32, 10);
        assert_eq!(storage.len(), 10);
        assert_eq!(storage.dtype(), DType::F32);
        assert_eq!(storage.read().get(3), Value::F32(0.0));
    }

    #[test]
    fn test_storage_clone_shares() {
        let a = Storage::from_vec(vec![1i32, 2, 3]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.is_unique());
        b.write().set(0, Value::F64(9.0));
        assert_eq!(a.read().get(0), Value::I32(9));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let a = Storage::from_vec(vec![1.0f64, 2.0]);
        let b = a.deep_copy();
        assert!(!a.ptr_eq(&b));
        b.write().set(1, Value::F64(5.0));
        assert_eq!(a.read().get(1), Value::F64(2.0));
    }

    #[test]
    fn test_resize_requires_unique() {
        let mut a = Storage::zeros(DType::U8, 4);
        a.resize(8).unwrap();
        assert_eq!(a.len(), 8);

        let _alias = a.clone();
        assert!(a.resize(2).is_err());
    }

    #[test]
    fn test_buffer_from_values_casts() {
        let buffer = Buffer::from_values(DType::I16, [Value::F32(1.5), Value::Bool(true)]);
        assert_eq!(buffer, Buffer::I16(vec![1, 1]));
        assert_eq!(buffer.to_vec::<f64>(), vec![1.0, 1.0]);
    }
}
