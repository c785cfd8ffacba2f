//! Loop Plans - Strided Multi-Operand Iteration
//!
//! A `LoopPlan` walks a loop nest of fixed extents and keeps one running
//! storage position per operand. Each operand contributes one element
//! stride per loop level; a stride of 0 re-reads the same element along
//! that level, which is how broadcast axes and reduction accumulators are
//! expressed.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use smallvec::SmallVec;
use tessera_core::error::{Error, Result};
use tessera_tensor::{Array, Shape, Strides};

use crate::codegen::IterOrder;

// =============================================================================
// LoopPlan
// =============================================================================

#[derive(Debug, Clone)]
struct Operand {
    offset: usize,
    strides: Strides,
}

/// A loop nest over several strided operands.
#[derive(Debug, Clone)]
pub struct LoopPlan {
    extents: Shape,
    operands: Vec<Operand>,
}

impl LoopPlan {
    /// Creates a plan with one loop level per extent, outermost first.
    #[must_use]
    pub fn new(extents: &[usize]) -> Self {
        Self {
            extents: Shape::from_slice(extents),
            operands: Vec::new(),
        }
    }

    /// Adds an operand starting at `offset` and stepping by `strides`.
    pub fn operand(mut self, offset: usize, strides: &[isize]) -> Result<Self> {
        if strides.len() != self.extents.len() {
            return Err(Error::invalid_operation(format!(
                "operand has {} strides for a {}-level loop",
                strides.len(),
                self.extents.len()
            )));
        }
        self.operands.push(Operand {
            offset,
            strides: Strides::from_slice(strides),
        });
        Ok(self)
    }

    /// Adds `array` as an operand, mapping loop levels to its axes by `order`.
    pub fn array(self, array: &Array, order: &IterOrder) -> Result<Self> {
        let strides = order_strides(array, order)?;
        self.operand(array.offset(), &strides)
    }

    /// Loop extents, outermost first.
    #[must_use]
    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    /// Total number of innermost iterations.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.extents.iter().product()
    }

    /// Calls `body` with every operand's storage position, innermost level
    /// fastest. Stops at the first error.
    pub fn run(&self, mut body: impl FnMut(&[usize]) -> Result<()>) -> Result<()> {
        if self.extents.contains(&0) {
            return Ok(());
        }
        let mut positions: SmallVec<[isize; 8]> =
            self.operands.iter().map(|op| op.offset as isize).collect();
        let mut current: SmallVec<[usize; 8]> = SmallVec::new();
        let mut index: Shape = SmallVec::from_elem(0, self.extents.len());

        loop {
            current.clear();
            current.extend(positions.iter().map(|&p| p as usize));
            body(&current)?;

            let mut level = self.extents.len();
            loop {
                if level == 0 {
                    return Ok(());
                }
                level -= 1;
                index[level] += 1;
                for (position, operand) in positions.iter_mut().zip(&self.operands) {
                    *position += operand.strides[level];
                }
                if index[level] < self.extents[level] {
                    break;
                }
                // rewind this level and carry into the next outer one
                let steps = self.extents[level] as isize;
                for (position, operand) in positions.iter_mut().zip(&self.operands) {
                    *position -= operand.strides[level] * steps;
                }
                index[level] = 0;
            }
        }
    }
}

/// Strides of `array` per loop level; `None` levels step by 0.
pub fn order_strides(array: &Array, order: &IterOrder) -> Result<Strides> {
    order
        .iter()
        .map(|level| match level {
            Some(axis) => array.strides().get(*axis).copied().ok_or(Error::InvalidDimension {
                index: *axis as i64,
                ndim: array.ndim(),
            }),
            None => Ok(0),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::dtype::DType;

    #[test]
    fn test_visits_row_major() {
        let plan = LoopPlan::new(&[2, 3]).operand(0, &[3, 1]).unwrap();
        let mut seen = Vec::new();
        plan.run(|p| {
            seen.push(p[0]);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(plan.iterations(), 6);
    }

    #[test]
    fn test_zero_stride_repeats() {
        let plan = LoopPlan::new(&[2, 2])
            .operand(0, &[2, 1])
            .unwrap()
            .operand(5, &[0, 1])
            .unwrap();
        let mut seen = Vec::new();
        plan.run(|p| {
            seen.push((p[0], p[1]));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(0, 5), (1, 6), (2, 5), (3, 6)]);
    }

    #[test]
    fn test_rank_zero_runs_once() {
        let plan = LoopPlan::new(&[]).operand(4, &[]).unwrap();
        let mut count = 0;
        plan.run(|p| {
            assert_eq!(p, &[4]);
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_extent_skips_body() {
        let plan = LoopPlan::new(&[3, 0]).operand(0, &[0, 1]).unwrap();
        plan.run(|_| Err(Error::ReadOnly)).unwrap();
    }

    #[test]
    fn test_array_order() {
        let a = Array::zeros(DType::F32, &[2, 3]);
        let strides = order_strides(&a, &vec![Some(1), None, Some(0)]).unwrap();
        assert_eq!(strides.as_slice(), &[1, 0, 3]);
        assert!(order_strides(&a, &vec![Some(2)]).is_err());
    }

    #[test]
    fn test_stride_mismatch_rejected() {
        assert!(LoopPlan::new(&[2]).operand(0, &[1, 1]).is_err());
    }
}
