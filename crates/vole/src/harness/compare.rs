use std::fmt;

use vole_core::error::{Error, Result};
use vole_core::memory::Memory;

// Elementwise comparison against a reference
//
// The error of one element is relative to the reference value, except
// where the reference is close to zero and a relative error would blow up:
//
//   e = |got - ref| / |ref|   if |ref| > 1e-4
//   e = |got - ref|           otherwise
//
// An element passes when e < tolerance. NaN never passes.

const RELATIVE_FLOOR: f32 = 1e-4;

/// The first element that failed a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Logical flat index.
    pub index: usize,
    pub expected: f32,
    pub got: f32,
    pub error: f32,
}

/// Summary of comparing a tensor to its reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub count: usize,
    pub mismatches: usize,
    pub max_error: f32,
    pub tolerance: f32,
    pub first_mismatch: Option<Mismatch>,
}

impl Comparison {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.first_mismatch {
            None => write!(
                f,
                "{} elements within {:e} (max error {:e})",
                self.count, self.tolerance, self.max_error
            ),
            Some(m) => write!(
                f,
                "{}/{} elements off; first at index {}: expected {}, got {} (error {:e} >= {:e})",
                self.mismatches, self.count, m.index, m.expected, m.got, m.error, self.tolerance
            ),
        }
    }
}

/// Error of one element, relative unless the reference is near zero.
pub fn element_error(expected: f32, got: f32) -> f32 {
    let diff = (got - expected).abs();
    if expected.abs() > RELATIVE_FLOOR {
        diff / expected.abs()
    } else {
        diff
    }
}

/// Compare two logically ordered slices.
pub fn compare_slices(expected: &[f32], got: &[f32], tolerance: f32) -> Comparison {
    let mut cmp = Comparison {
        count: expected.len(),
        mismatches: 0,
        max_error: 0.0,
        tolerance,
        first_mismatch: None,
    };
    for (index, (&e, &g)) in expected.iter().zip(got).enumerate() {
        let error = element_error(e, g);
        if error > cmp.max_error || error.is_nan() {
            cmp.max_error = error;
        }
        // written so NaN fails
        if !(error < tolerance) {
            cmp.mismatches += 1;
            if cmp.first_mismatch.is_none() {
                cmp.first_mismatch = Some(Mismatch {
                    index,
                    expected: e,
                    got: g,
                    error,
                });
            }
        }
    }
    cmp
}

/// Compare a tensor against a reference tensor of the same logical shape.
///
/// The two may use different formats; both are read in logical order.
pub fn compare(reference: &Memory, got: &Memory, tolerance: f32) -> Result<Comparison> {
    if reference.shape() != got.shape() {
        return Err(Error::ShapeMismatch {
            expected: reference.shape().clone(),
            got: got.shape().clone(),
        });
    }
    let expected = reference.to_logical_vec::<f32>()?;
    let actual = got.to_logical_vec::<f32>()?;
    Ok(compare_slices(&expected, &actual, tolerance))
}
