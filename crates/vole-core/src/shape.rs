use std::fmt;

use crate::error::{Error, Result};

// Shape — Logical N-dimensional extent of a tensor
//
// A Shape only says how many elements live along each logical axis. It says
// nothing about where those elements sit in memory; that is the job of the
// MemoryDesc (shape + dtype + format). Typical shapes in this crate:
//
//   - Activations: [mb, channels, height, width]
//   - Weights:     [oc, ic, kh, kw]          (one group)
//   - Grouped:     [g, oc/g, ic/g, kh, kw]
//
// Every consumer addresses elements by a *logical flat index*: the row-major
// position of a coordinate within this shape. `unravel` and `ravel` convert
// between the two forms.

/// N-dimensional logical shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }

    /// Reject shapes with no dimensions or with a zero-sized dimension.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidShape {
                shape: self.clone(),
                reason: "at least one dimension is required".into(),
            });
        }
        if let Some(axis) = self.0.iter().position(|&d| d == 0) {
            return Err(Error::InvalidShape {
                shape: self.clone(),
                reason: format!("dimension {} is zero", axis),
            });
        }
        Ok(())
    }

    /// Decompose a logical flat index into per-dimension coordinates.
    ///
    /// The caller guarantees `index < elem_count()`.
    pub fn unravel(&self, mut index: usize) -> Vec<usize> {
        let mut pos = vec![0usize; self.rank()];
        for d in (0..self.rank()).rev() {
            pos[d] = index % self.0[d];
            index /= self.0[d];
        }
        pos
    }

    /// Inverse of [`unravel`](Shape::unravel).
    pub fn ravel(&self, pos: &[usize]) -> usize {
        pos.iter()
            .zip(self.0.iter())
            .fold(0, |acc, (&p, &d)| acc * d + p)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// These let you write: Shape::from((2, 4, 5, 5)) instead of Shape::new(vec![2, 4, 5, 5])

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<(usize, usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3, d4): (usize, usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3, d4])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_4d_counts() {
        let s = Shape::from((2, 4, 5, 5));
        assert_eq!(s.elem_count(), 200);
        assert_eq!(s.rank(), 4);
        assert_eq!(s.ravel(&[1, 0, 0, 0]), 100);
    }

    #[test]
    fn test_unravel_ravel() {
        let s = Shape::from((2, 3, 4));
        // 1*12 + 2*4 + 3 = 23
        assert_eq!(s.unravel(23), vec![1, 2, 3]);
        assert_eq!(s.ravel(&[1, 2, 3]), 23);
        for i in 0..s.elem_count() {
            assert_eq!(s.ravel(&s.unravel(i)), i);
        }
    }

    #[test]
    fn test_validate() {
        assert!(Shape::from((2, 3)).validate().is_ok());
        assert!(Shape::from((2, 0)).validate().is_err());
        assert!(Shape::new(vec![]).validate().is_err());
    }

    #[test]
    fn test_display() {
        let s = Shape::from((3, 4));
        assert_eq!(format!("{}", s), "[3, 4]");
    }
}
