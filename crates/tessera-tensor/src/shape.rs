//! Shape and Strides - Array Dimension Management
//!
//! Provides types and functions for managing array shapes and strides.
//! Shapes define the extents of an array, while strides (counted in
//! elements, not bytes) define how to traverse the underlying storage.
//!
//! # Key Features
//! - Efficient shape representation with small-vector optimization
//! - Stride computation for contiguous and permuted layouts
//! - Broadcast strides (stride 0 for unit axes stretched to a target)
//! - Row-major index advancing without per-step allocation
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use smallvec::SmallVec;

use tessera_core::error::{Error, Result};

// =============================================================================
// Type Aliases
// =============================================================================

/// Shape type - extents of an array.
/// Uses `SmallVec` for stack allocation of small shapes (up to 6 dimensions).
pub type Shape = SmallVec<[usize; 6]>;

/// Strides type - element steps for each dimension.
pub type Strides = SmallVec<[isize; 6]>;

// =============================================================================
// Shape Utilities
// =============================================================================

/// Computes the total number of elements from a shape.
#[must_use]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Computes row-major (C-order) strides for a shape.
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Strides {
    let mut strides = Strides::with_capacity(shape.len());
    let mut stride = 1isize;
    for &dim in shape.iter().rev() {
        strides.push(stride);
        stride *= dim.max(1) as isize;
    }
    strides.reverse();
    strides
}

/// Checks if strides describe a row-major contiguous layout.
///
/// Axes of extent 1 are never stepped over, so their stride is ignored.
#[must_use]
pub fn is_contiguous(shape: &[usize], strides: &[isize]) -> bool {
    let expected = contiguous_strides(shape);
    shape
        .iter()
        .zip(strides.iter().zip(expected.iter()))
        .all(|(&dim, (&actual, &wanted))| dim == 1 || actual == wanted)
}

/// Computes the storage offset of a multi-dimensional index.
#[must_use]
pub fn linear_index(offset: usize, indices: &[usize], strides: &[isize]) -> usize {
    debug_assert_eq!(indices.len(), strides.len());
    let mut position = offset as isize;
    for (&idx, &stride) in indices.iter().zip(strides.iter()) {
        position += idx as isize * stride;
    }
    position as usize
}

/// Converts a linear row-major position to multi-dimensional indices.
#[must_use]
pub fn unravel_index(mut linear: usize, shape: &[usize]) -> Shape {
    let mut indices: Shape = SmallVec::from_elem(0, shape.len());
    for (i, &dim) in shape.iter().enumerate().rev() {
        if dim == 0 {
            continue;
        }
        indices[i] = linear % dim;
        linear /= dim;
    }
    indices
}

/// Steps `index` to the next row-major position within `shape`.
///
/// Returns false once every position has been visited, leaving `index`
/// back at all zeros.
pub fn advance(index: &mut [usize], shape: &[usize]) -> bool {
    for axis in (0..shape.len()).rev() {
        index[axis] += 1;
        if index[axis] < shape[axis] {
            return true;
        }
        index[axis] = 0;
    }
    false
}

// =============================================================================
// Broadcasting
// =============================================================================

/// Computes strides that read an array of `shape` as if it had
/// `target_shape`, which must have the same rank.
///
/// Unit axes stretched to a larger extent get stride 0.
#[must_use]
pub fn broadcast_strides(shape: &[usize], strides: &[isize], target_shape: &[usize]) -> Strides {
    shape
        .iter()
        .zip(strides.iter())
        .zip(target_shape.iter())
        .map(|((&dim, &stride), &target)| if dim == 1 && target != 1 { 0 } else { stride })
        .collect()
}

// =============================================================================
// Shape Manipulation
// =============================================================================

/// Validates that `axes` is a permutation of `0..ndim`.
pub fn check_permutation(axes: &[usize], ndim: usize) -> Result<()> {
    if axes.len() != ndim {
        return Err(Error::invalid_operation(format!(
            "permutation of length {} given for {} dimensions",
            axes.len(),
            ndim
        )));
    }
    let mut seen: SmallVec<[bool; 6]> = SmallVec::from_elem(false, ndim);
    for &axis in axes {
        if axis >= ndim {
            return Err(Error::InvalidDimension {
                index: axis as i64,
                ndim,
            });
        }
        if seen[axis] {
            return Err(Error::invalid_operation(format!(
                "axis {axis} repeated in permutation"
            )));
        }
        seen[axis] = true;
    }
    Ok(())
}

/// Applies a permutation to a per-axis sequence.
#[must_use]
pub fn permute<T: Copy>(values: &[T], axes: &[usize]) -> SmallVec<[T; 6]> {
    axes.iter().map(|&a| values[a]).collect()
}

/// Validates a reshape target against the element count of `old_shape`.
pub fn check_reshape(old_shape: &[usize], new_shape: &[usize]) -> Result<()> {
    if numel(old_shape) == numel(new_shape) {
        Ok(())
    } else {
        Err(Error::shape_mismatch(old_shape, new_shape))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel() {
        assert_eq!(numel(&[2, 3, 4]), 24);
        assert_eq!(numel(&[]), 1);
        assert_eq!(numel(&[4, 0]), 0);
    }

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(contiguous_strides(&[2, 3, 4]).as_slice(), &[12, 4, 1]);
        assert!(contiguous_strides(&[]).is_empty());
    }

    #[test]
    fn test_is_contiguous_ignores_unit_axes() {
        assert!(is_contiguous(&[2, 3], &[3, 1]));
        assert!(!is_contiguous(&[2, 3], &[1, 2]));
        assert!(is_contiguous(&[1, 3], &[0, 1]));
    }

    #[test]
    fn test_linear_and_unravel() {
        let strides = contiguous_strides(&[2, 3, 4]);
        assert_eq!(linear_index(0, &[1, 2, 3], &strides), 23);
        assert_eq!(linear_index(5, &[0, 0, 1], &strides), 6);
        assert_eq!(unravel_index(23, &[2, 3, 4]).as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_advance_visits_row_major() {
        let shape = [2, 2];
        let mut index = [0, 0];
        let mut seen = vec![index.to_vec()];
        while advance(&mut index, &shape) {
            seen.push(index.to_vec());
        }
        assert_eq!(seen, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn test_broadcast_strides() {
        let strides = broadcast_strides(&[1, 5], &[5, 1], &[10, 5]);
        assert_eq!(strides.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_check_permutation() {
        assert!(check_permutation(&[2, 0, 1], 3).is_ok());
        assert!(check_permutation(&[0, 0], 2).is_err());
        assert!(check_permutation(&[0, 3], 2).is_err());
        assert!(check_permutation(&[0], 2).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_unravel_matches_contiguous_offset(
            shape in proptest::collection::vec(1usize..5, 0..5),
            seed in 0usize..10_000,
        ) {
            let total = numel(&shape);
            let linear = seed % total;
            let index = unravel_index(linear, &shape);
            let strides = contiguous_strides(&shape);
            proptest::prop_assert_eq!(linear_index(0, &index, &strides), linear);
        }

        #[test]
        fn prop_advance_counts_every_position(shape in proptest::collection::vec(1usize..4, 1..4)) {
            let mut index = vec![0; shape.len()];
            let mut visited = 1;
            while advance(&mut index, &shape) {
                visited += 1;
            }
            proptest::prop_assert_eq!(visited, numel(&shape));
            proptest::prop_assert!(index.iter().all(|&i| i == 0));
        }
    }
}
