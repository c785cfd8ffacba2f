//! Array - Dense Strided N-Dimensional Array
//!
//! The `Array` struct is the runtime value every Tessera operator reads and
//! writes. It pairs a shared, dynamically typed buffer with a shape, element
//! strides, a starting offset and a writeability flag, so permutations and
//! unit-axis insertions are views rather than copies.
//!
//! # Key Features
//! - Runtime dtype with typed extraction (`to_vec::<f32>()`)
//! - Zero-copy views sharing storage with their base
//! - Writeability propagated through views
//! - Output storage reuse gated on unique ownership
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;

use smallvec::SmallVec;
use tessera_core::dtype::{DType, Element};
use tessera_core::error::{Error, Result};
use tessera_core::storage::{Buffer, Storage};
use tessera_core::value::Value;

use crate::shape::{
    advance, check_permutation, check_reshape, contiguous_strides, is_contiguous, linear_index,
    numel, permute, Shape, Strides,
};

// =============================================================================
// Array Struct
// =============================================================================

/// An N-dimensional strided view over shared typed storage.
///
/// Cloning an `Array` yields another view of the same storage.
#[derive(Clone)]
pub struct Array {
    /// Underlying data storage (reference-counted).
    pub(crate) storage: Storage,
    /// Element type, fixed for the lifetime of the storage.
    pub(crate) dtype: DType,
    /// Extent of each axis.
    pub(crate) shape: Shape,
    /// Element step of each axis.
    pub(crate) strides: Strides,
    /// Offset of the first element into storage.
    pub(crate) offset: usize,
    /// Whether writes through this view are allowed.
    pub(crate) writable: bool,
}

impl Array {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a contiguous array over existing storage.
    pub fn from_storage(storage: Storage, shape: &[usize]) -> Result<Self> {
        let total = numel(shape);
        if total != storage.len() {
            return Err(Error::shape_mismatch(&[storage.len()], shape));
        }
        Ok(Self {
            dtype: storage.dtype(),
            storage,
            shape: Shape::from_slice(shape),
            strides: contiguous_strides(shape),
            offset: 0,
            writable: true,
        })
    }

    /// Creates an array from a typed vector.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Self::from_storage(Storage::from_vec(data), shape)
    }

    /// Creates an array of `dtype` from tagged values, casting each one.
    pub fn from_values(dtype: DType, values: Vec<Value>, shape: &[usize]) -> Result<Self> {
        Self::from_storage(Storage::from_buffer(Buffer::from_values(dtype, values)), shape)
    }

    /// Creates a rank-0 array holding one element.
    #[must_use]
    pub fn scalar<T: Element>(value: T) -> Self {
        Self::scalar_value(value.into_value())
    }

    /// Creates a rank-0 array from a tagged value.
    #[must_use]
    pub fn scalar_value(value: Value) -> Self {
        Self::full(&[], value)
    }

    /// Creates a zero-filled contiguous array.
    #[must_use]
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        Self::full(shape, Value::zero(dtype))
    }

    /// Creates a contiguous array with every element set to `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: Value) -> Self {
        Self {
            dtype: value.dtype(),
            storage: Storage::from_buffer(Buffer::filled(value, numel(shape))),
            shape: Shape::from_slice(shape),
            strides: contiguous_strides(shape),
            offset: 0,
            writable: true,
        }
    }

    /// Creates a view with explicit layout over `storage`.
    ///
    /// Fails if any addressable element would fall outside the buffer.
    pub fn from_parts(
        storage: Storage,
        shape: &[usize],
        strides: &[isize],
        offset: usize,
        writable: bool,
    ) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(Error::invalid_operation(format!(
                "shape has {} axes but strides have {}",
                shape.len(),
                strides.len()
            )));
        }
        if numel(shape) > 0 {
            let mut low = offset as isize;
            let mut high = offset as isize;
            for (&dim, &stride) in shape.iter().zip(strides) {
                let reach = (dim as isize - 1) * stride;
                if reach < 0 {
                    low += reach;
                } else {
                    high += reach;
                }
            }
            if low < 0 || high as usize >= storage.len() {
                return Err(Error::IndexOutOfBounds {
                    index: high.max(0) as usize,
                    size: storage.len(),
                });
            }
        }
        Ok(Self {
            dtype: storage.dtype(),
            storage,
            shape: Shape::from_slice(shape),
            strides: Strides::from_slice(strides),
            offset,
            writable,
        })
    }

    /// Returns a contiguous array of `shape`, reusing `existing` when possible.
    ///
    /// Storage is reused only when it has the right dtype, is not aliased by
    /// any other array, and is writeable; it is then resized in place.
    /// Otherwise fresh zeroed storage is allocated.
    #[must_use]
    pub fn reuse_or_alloc(existing: Option<Array>, dtype: DType, shape: &[usize]) -> Self {
        if let Some(mut array) = existing {
            if array.dtype == dtype && array.writable && array.storage.is_unique() {
                let total = numel(shape);
                if array.storage.resize(total).is_ok() {
                    array.shape = Shape::from_slice(shape);
                    array.strides = contiguous_strides(shape);
                    array.offset = 0;
                    return array;
                }
            }
        }
        Self::zeros(dtype, shape)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the extent of each axis.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element stride of each axis.
    #[must_use]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Returns the storage offset of the first element.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the number of axes.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Returns true if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Returns true if the elements are laid out row-major without gaps.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        is_contiguous(&self.shape, &self.strides)
    }

    /// Returns true if writes through this view are allowed.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns the underlying storage handle.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Returns true if both arrays view the same buffer.
    #[must_use]
    pub fn shares_storage(&self, other: &Array) -> bool {
        self.storage.ptr_eq(&other.storage)
    }

    // =========================================================================
    // Element Access
    // =========================================================================

    fn checked_offset(&self, indices: &[usize]) -> Result<usize> {
        if indices.len() != self.ndim() {
            return Err(Error::invalid_operation(format!(
                "expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        for (&idx, &dim) in indices.iter().zip(self.shape.iter()) {
            if idx >= dim {
                return Err(Error::IndexOutOfBounds {
                    index: idx,
                    size: dim,
                });
            }
        }
        Ok(linear_index(self.offset, indices, &self.strides))
    }

    /// Reads the element at `indices`.
    pub fn get(&self, indices: &[usize]) -> Result<Value> {
        let position = self.checked_offset(indices)?;
        Ok(self.storage.read().get(position))
    }

    /// Writes `value` at `indices`, casting it to the array's dtype.
    pub fn set(&self, indices: &[usize], value: Value) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        let position = self.checked_offset(indices)?;
        self.storage.write().set(position, value);
        Ok(())
    }

    /// Returns the only element of a single-element array.
    pub fn item(&self) -> Result<Value> {
        if self.numel() != 1 {
            return Err(Error::invalid_operation(format!(
                "item() needs exactly one element, array has {}",
                self.numel()
            )));
        }
        Ok(self.storage.read().get(self.offset))
    }

    /// Calls `f` with the storage offset of every element in row-major order.
    pub fn for_each_offset(&self, mut f: impl FnMut(usize)) {
        if self.is_empty() {
            return;
        }
        let mut index: Shape = SmallVec::from_elem(0, self.ndim());
        loop {
            f(linear_index(self.offset, &index, &self.strides));
            if !advance(&mut index, &self.shape) {
                break;
            }
        }
    }

    /// Copies every element out, in row-major order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        let buffer = self.storage.read();
        let mut out = Vec::with_capacity(self.numel());
        self.for_each_offset(|position| out.push(buffer.get(position)));
        out
    }

    /// Copies every element out as `T`, casting when the dtype differs.
    #[must_use]
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        self.values().into_iter().map(T::from_value).collect()
    }

    /// Overwrites every element, in row-major order, from `values`.
    pub fn assign(&self, values: &[Value]) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        if values.len() != self.numel() {
            return Err(Error::shape_mismatch(&[self.numel()], &[values.len()]));
        }
        let mut buffer = self.storage.write();
        let mut next = values.iter();
        self.for_each_offset(|position| {
            if let Some(&value) = next.next() {
                buffer.set(position, value);
            }
        });
        Ok(())
    }

    /// Sets every element to `value`.
    pub fn fill(&self, value: Value) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        let mut buffer = self.storage.write();
        self.for_each_offset(|position| buffer.set(position, value));
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Returns a view with axes reordered so that output axis `i` is input
    /// axis `axes[i]`.
    pub fn permute(&self, axes: &[usize]) -> Result<Self> {
        check_permutation(axes, self.ndim())?;
        Ok(Self {
            storage: self.storage.clone(),
            dtype: self.dtype,
            shape: permute(&self.shape, axes),
            strides: permute(&self.strides, axes),
            offset: self.offset,
            writable: self.writable,
        })
    }

    /// Returns a view with all axes reversed.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut view = self.clone();
        view.shape.reverse();
        view.strides.reverse();
        view
    }

    /// Returns a view without axis `axis`, which must have extent 1.
    pub fn remove_unit_axis(&self, axis: usize) -> Result<Self> {
        match self.shape.get(axis) {
            Some(1) => {
                let mut view = self.clone();
                view.shape.remove(axis);
                view.strides.remove(axis);
                Ok(view)
            }
            Some(&extent) => Err(Error::invalid_operation(format!(
                "cannot remove axis {axis} of extent {extent}"
            ))),
            None => Err(Error::InvalidDimension {
                index: axis as i64,
                ndim: self.ndim(),
            }),
        }
    }

    /// Returns a view with a new axis of extent 1 at position `axis`.
    pub fn insert_unit_axis(&self, axis: usize) -> Result<Self> {
        if axis > self.ndim() {
            return Err(Error::InvalidDimension {
                index: axis as i64,
                ndim: self.ndim(),
            });
        }
        let mut view = self.clone();
        view.shape.insert(axis, 1);
        view.strides.insert(axis, 0);
        Ok(view)
    }

    /// Returns an array with a new shape holding the same elements.
    ///
    /// Contiguous arrays are reshaped as views; others are copied first.
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self> {
        check_reshape(&self.shape, new_shape)?;
        let base = if self.is_contiguous() {
            self.clone()
        } else {
            self.copy()
        };
        Ok(Self {
            storage: base.storage,
            dtype: base.dtype,
            shape: Shape::from_slice(new_shape),
            strides: contiguous_strides(new_shape),
            offset: base.offset,
            writable: base.writable,
        })
    }

    /// Returns a view that rejects writes.
    #[must_use]
    pub fn readonly(&self) -> Self {
        let mut view = self.clone();
        view.writable = false;
        view
    }

    // =========================================================================
    // Copies
    // =========================================================================

    /// Returns a contiguous, writeable copy with its own storage.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.astype(self.dtype())
    }

    /// Returns a contiguous copy converted to `dtype`.
    #[must_use]
    pub fn astype(&self, dtype: DType) -> Self {
        Self {
            storage: Storage::from_buffer(Buffer::from_values(dtype, self.values())),
            dtype,
            shape: self.shape.clone(),
            strides: contiguous_strides(&self.shape),
            offset: 0,
            writable: true,
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("dtype", &self.dtype())
            .field("shape", &self.shape.as_slice())
            .field("strides", &self.strides.as_slice())
            .field("offset", &self.offset)
            .field("writable", &self.writable)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_and_get() {
        let a = Array::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(a.dtype(), DType::F32);
        assert_eq!(a.shape(), &[2, 3]);
        assert_eq!(a.get(&[1, 2]).unwrap(), Value::F32(6.0));
        assert!(a.get(&[2, 0]).is_err());
    }

    #[test]
    fn test_from_vec_shape_mismatch() {
        assert!(Array::from_vec(vec![1i32, 2, 3], &[2, 2]).is_err());
    }

    #[test]
    fn test_scalar() {
        let s = Array::scalar(7i64);
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.item().unwrap(), Value::I64(7));
    }

    #[test]
    fn test_permute_is_view() {
        let a = Array::from_vec((0..6).collect::<Vec<i32>>(), &[2, 3]).unwrap();
        let t = a.permute(&[1, 0]).unwrap();
        assert!(t.shares_storage(&a));
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_vec::<i32>(), vec![0, 3, 1, 4, 2, 5]);
        assert!(!t.is_contiguous());
    }

    #[test]
    fn test_unit_axis_views() {
        let a = Array::from_vec(vec![1u8, 2, 3], &[1, 3]).unwrap();
        let squeezed = a.remove_unit_axis(0).unwrap();
        assert_eq!(squeezed.shape(), &[3]);
        let expanded = squeezed.insert_unit_axis(1).unwrap();
        assert_eq!(expanded.shape(), &[3, 1]);
        assert_eq!(expanded.to_vec::<u8>(), vec![1, 2, 3]);
        assert!(a.remove_unit_axis(1).is_err());
    }

    #[test]
    fn test_reshape_non_contiguous_copies() {
        let a = Array::from_vec((0..6).collect::<Vec<i32>>(), &[2, 3]).unwrap();
        let r = a.transpose().reshape(&[6]).unwrap();
        assert!(!r.shares_storage(&a));
        assert_eq!(r.to_vec::<i32>(), vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_readonly_rejects_writes() {
        let a = Array::zeros(DType::F64, &[2]);
        let ro = a.readonly();
        assert_eq!(ro.set(&[0], Value::F64(1.0)), Err(Error::ReadOnly));
        assert!(a.set(&[0], Value::F64(1.0)).is_ok());
        assert_eq!(ro.get(&[0]).unwrap(), Value::F64(1.0));
    }

    #[test]
    fn test_assign_through_strided_view() {
        let a = Array::zeros(DType::I32, &[2, 2]);
        let t = a.transpose();
        t.assign(&[Value::I32(1), Value::I32(2), Value::I32(3), Value::I32(4)])
            .unwrap();
        assert_eq!(a.to_vec::<i32>(), vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_reuse_or_alloc() {
        let existing = Array::zeros(DType::F32, &[4]);
        let reused = Array::reuse_or_alloc(Some(existing), DType::F32, &[2, 3]);
        assert_eq!(reused.shape(), &[2, 3]);
        assert_eq!(reused.storage().len(), 6);

        let aliased = Array::zeros(DType::F32, &[4]);
        let keep = aliased.clone();
        let fresh = Array::reuse_or_alloc(Some(aliased), DType::F32, &[4]);
        assert!(!fresh.shares_storage(&keep));

        let wrong_type = Array::zeros(DType::I8, &[4]);
        let fresh = Array::reuse_or_alloc(Some(wrong_type), DType::F32, &[4]);
        assert_eq!(fresh.dtype(), DType::F32);
    }

    #[test]
    fn test_from_parts_bounds() {
        let storage = Storage::from_vec(vec![0i8; 4]);
        assert!(Array::from_parts(storage.clone(), &[2, 2], &[2, 1], 0, true).is_ok());
        assert!(Array::from_parts(storage.clone(), &[3, 2], &[2, 1], 0, true).is_err());
        let broadcast = Array::from_parts(storage, &[3, 4], &[0, 1], 0, false).unwrap();
        assert_eq!(broadcast.numel(), 12);
    }

    #[test]
    fn test_astype() {
        let a = Array::from_vec(vec![1.9f64, -2.5], &[2]).unwrap();
        let b = a.astype(DType::I32);
        assert_eq!(b.to_vec::<i32>(), vec![1, -2]);
    }
}
