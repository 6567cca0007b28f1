use std::fmt;

// MemoryFormat — Catalog of physical layouts
//
// A format names how the elements of a logical tensor are arranged in a
// buffer. Every format reduces to the same recipe:
//
//   1. An *outer order*: the logical axes listed from slowest to fastest
//      varying. nchw is [0, 1, 2, 3]; nhwc is [0, 2, 3, 1].
//
//   2. Zero or more *inner blocks*: (axis, block) pairs, again slowest to
//      fastest. nChw8c splits the channel axis into C/8 outer steps and an
//      innermost run of 8 channels: [(1, 8)]. OIhw8i8o keeps an 8x8 tile of
//      (input, output) channels innermost: [(1, 8), (0, 8)].
//
//   3. A *padding policy* for blocked axes. Activation formats round the
//      channel axis up to the block size; weights formats demand an exact
//      multiple; the generic Blocked format takes explicit padding.
//
// The MemoryDesc turns a recipe plus a shape into strides, so nothing
// outside this module ever branches on a particular format.

/// Explicit block sizes and trailing padding per dimension.
///
/// `padding[d]` extra elements are appended to axis `d` before it is split
/// into blocks of `blocks[d]`; the padded size must be a multiple of the block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockSpec {
    pub blocks: Vec<usize>,
    pub padding: Vec<usize>,
}

impl BlockSpec {
    pub fn new(blocks: Vec<usize>, padding: Vec<usize>) -> Self {
        Self { blocks, padding }
    }
}

/// Named physical layouts, plus a generic blocked/padded layout.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryFormat {
    /// 1-D dense.
    X,
    /// 2-D activations, row-major.
    Nc,
    /// 2-D weights, row-major.
    Oi,
    /// Activations, row-major over [n, c, h, w].
    Nchw,
    /// Activations, channels innermost.
    Nhwc,
    /// Activations, batch innermost.
    Chwn,
    /// Activations, channels blocked by 8 (channel axis padded up).
    NChw8c,
    /// Activations, channels blocked by 16 (channel axis padded up).
    NChw16c,
    /// Weights, row-major over [o, i, h, w].
    Oihw,
    /// Weights, spatial outermost.
    Hwio,
    /// Weights, input channels outermost.
    Ihwo,
    /// Weights, 8x8 (input, output) channel tiles.
    OIhw8i8o,
    /// Weights, 16x16 (input, output) channel tiles.
    OIhw16i16o,
    /// Weights, output channels blocked by 8 innermost.
    Ohwi8o,
    /// Grouped weights, row-major over [g, o, i, h, w].
    Goihw,
    /// Grouped weights, 8x8 channel tiles per group.
    GOihw8i8o,
    /// Grouped weights, 16x16 channel tiles per group.
    GOihw16i16o,
    /// Row-major order with explicit per-dimension blocks and padding.
    Blocked(BlockSpec),
}

/// How a blocked axis that is not a multiple of its block is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Padding {
    RoundUp,
    Strict,
    Explicit(Vec<usize>),
}

/// The format-independent description every MemoryFormat reduces to.
#[derive(Debug, Clone)]
pub(crate) struct Recipe {
    pub rank: usize,
    pub outer: Vec<usize>,
    pub inner: Vec<(usize, usize)>,
    pub padding: Padding,
}

impl Recipe {
    fn plain(outer: &[usize]) -> Self {
        Recipe {
            rank: outer.len(),
            outer: outer.to_vec(),
            inner: Vec::new(),
            padding: Padding::Strict,
        }
    }

    fn blocked(outer: &[usize], inner: &[(usize, usize)], padding: Padding) -> Self {
        Recipe {
            rank: outer.len(),
            outer: outer.to_vec(),
            inner: inner.to_vec(),
            padding,
        }
    }
}

impl MemoryFormat {
    /// The row-major format of a given rank, if the catalog names one.
    pub fn dense_for_rank(rank: usize) -> Option<Self> {
        match rank {
            1 => Some(MemoryFormat::X),
            2 => Some(MemoryFormat::Nc),
            4 => Some(MemoryFormat::Nchw),
            5 => Some(MemoryFormat::Goihw),
            _ => None,
        }
    }

    /// Number of logical dimensions this format describes.
    pub fn rank(&self) -> usize {
        self.recipe().rank
    }

    /// Whether any axis is split into blocks.
    pub fn is_blocked(&self) -> bool {
        self.recipe().inner.iter().any(|&(_, b)| b > 1)
    }

    pub(crate) fn recipe(&self) -> Recipe {
        use MemoryFormat::*;
        match self {
            X => Recipe::plain(&[0]),
            Nc | Oi => Recipe::plain(&[0, 1]),
            Nchw | Oihw => Recipe::plain(&[0, 1, 2, 3]),
            Nhwc => Recipe::plain(&[0, 2, 3, 1]),
            Chwn | Ihwo => Recipe::plain(&[1, 2, 3, 0]),
            Hwio => Recipe::plain(&[2, 3, 1, 0]),
            NChw8c => Recipe::blocked(&[0, 1, 2, 3], &[(1, 8)], Padding::RoundUp),
            NChw16c => Recipe::blocked(&[0, 1, 2, 3], &[(1, 16)], Padding::RoundUp),
            OIhw8i8o => Recipe::blocked(&[0, 1, 2, 3], &[(1, 8), (0, 8)], Padding::Strict),
            OIhw16i16o => {
                Recipe::blocked(&[0, 1, 2, 3], &[(1, 16), (0, 16)], Padding::Strict)
            }
            Ohwi8o => Recipe::blocked(&[0, 2, 3, 1], &[(0, 8)], Padding::Strict),
            Goihw => Recipe::plain(&[0, 1, 2, 3, 4]),
            GOihw8i8o => {
                Recipe::blocked(&[0, 1, 2, 3, 4], &[(2, 8), (1, 8)], Padding::Strict)
            }
            GOihw16i16o => {
                Recipe::blocked(&[0, 1, 2, 3, 4], &[(2, 16), (1, 16)], Padding::Strict)
            }
            Blocked(spec) => {
                let rank = spec.blocks.len();
                let inner = spec
                    .blocks
                    .iter()
                    .enumerate()
                    .filter(|&(_, &b)| b != 1)
                    .map(|(d, &b)| (d, b))
                    .collect();
                Recipe {
                    rank,
                    outer: (0..rank).collect(),
                    inner,
                    padding: Padding::Explicit(spec.padding.clone()),
                }
            }
        }
    }
}

impl fmt::Display for MemoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MemoryFormat::*;
        let s = match self {
            X => "x",
            Nc => "nc",
            Oi => "oi",
            Nchw => "nchw",
            Nhwc => "nhwc",
            Chwn => "chwn",
            NChw8c => "nChw8c",
            NChw16c => "nChw16c",
            Oihw => "oihw",
            Hwio => "hwio",
            Ihwo => "ihwo",
            OIhw8i8o => "OIhw8i8o",
            OIhw16i16o => "OIhw16i16o",
            Ohwi8o => "Ohwi8o",
            Goihw => "goihw",
            GOihw8i8o => "gOIhw8i8o",
            GOihw16i16o => "gOIhw16i16o",
            Blocked(spec) => {
                return write!(
                    f,
                    "blocked(blocks={:?}, padding={:?})",
                    spec.blocks, spec.padding
                )
            }
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks() {
        assert_eq!(MemoryFormat::Nchw.rank(), 4);
        assert_eq!(MemoryFormat::GOihw8i8o.rank(), 5);
        assert_eq!(MemoryFormat::X.rank(), 1);
        let spec = BlockSpec::new(vec![1, 4, 1], vec![0, 2, 0]);
        assert_eq!(MemoryFormat::Blocked(spec).rank(), 3);
    }

    #[test]
    fn test_is_blocked() {
        assert!(!MemoryFormat::Nhwc.is_blocked());
        assert!(MemoryFormat::NChw8c.is_blocked());
        assert!(MemoryFormat::Ohwi8o.is_blocked());
        let unblocked = BlockSpec::new(vec![1, 1], vec![0, 3]);
        assert!(!MemoryFormat::Blocked(unblocked).is_blocked());
    }

    #[test]
    fn test_dense_for_rank() {
        assert_eq!(MemoryFormat::dense_for_rank(4), Some(MemoryFormat::Nchw));
        assert_eq!(MemoryFormat::dense_for_rank(5), Some(MemoryFormat::Goihw));
        assert_eq!(MemoryFormat::dense_for_rank(3), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryFormat::NChw8c.to_string(), "nChw8c");
        assert_eq!(MemoryFormat::GOihw16i16o.to_string(), "gOIhw16i16o");
    }
}
