use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::format::{MemoryFormat, Padding};
use crate::shape::Shape;

// MemoryDesc — Logical shape + element type + physical format
//
// The MemoryDesc decouples *which* element a computation wants (a logical
// flat index, row-major over the shape) from *where* that element lives in
// the buffer (a physical offset). Every consumer (primitives, reference
// code, fill and compare utilities) asks the descriptor for offsets, so an
// algorithm written against logical indices works unchanged in any format.
//
// MAPPING:
//
//   pos[d]    = coordinate of the element on axis d
//   block[d]  = block size of axis d (1 when the axis is not blocked)
//
//   offset = Σ_d (pos[d] / block[d]) * outer_stride[d]
//          + Σ_d (pos[d] % block[d]) * inner_stride[d]
//
// Inner strides lay out one block (the product of all block sizes) with the
// last listed block innermost. Outer strides walk the padded, blocked axes
// in the format's outer order, each step jumping a whole block.
//
// Because blocks and outer steps occupy disjoint stride ranges and every
// padded axis covers its logical axis, the mapping is injective and stays
// below `size()`. Padding elements exist in the buffer but no logical
// index reaches them.

/// Strides derived from a format for one concrete shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockingDesc {
    block_dims: Vec<usize>,
    padded_dims: Vec<usize>,
    outer_strides: Vec<usize>,
    inner_strides: Vec<usize>,
    size: usize,
}

impl BlockingDesc {
    fn build(
        rank: usize,
        outer: &[usize],
        inner: &[(usize, usize)],
        block_dims: Vec<usize>,
        padded_dims: Vec<usize>,
    ) -> Self {
        let mut inner_strides = vec![0usize; rank];
        let mut stride = 1usize;
        for &(d, b) in inner.iter().rev() {
            inner_strides[d] = stride;
            stride *= b;
        }

        let mut outer_strides = vec![0usize; rank];
        for &d in outer.iter().rev() {
            outer_strides[d] = stride;
            stride *= padded_dims[d] / block_dims[d];
        }

        BlockingDesc {
            block_dims,
            padded_dims,
            outer_strides,
            inner_strides,
            size: stride,
        }
    }

    pub fn block_dims(&self) -> &[usize] {
        &self.block_dims
    }

    /// Dimensions after padding; each is a multiple of its block.
    pub fn padded_dims(&self) -> &[usize] {
        &self.padded_dims
    }

    pub fn outer_strides(&self) -> &[usize] {
        &self.outer_strides
    }

    pub fn inner_strides(&self) -> &[usize] {
        &self.inner_strides
    }

    /// Physical size in elements.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Physical offset of a multi-dimensional coordinate.
    #[inline]
    pub fn offset_of(&self, pos: &[usize]) -> usize {
        let mut off = 0usize;
        for (d, &p) in pos.iter().enumerate() {
            let b = self.block_dims[d];
            off += (p / b) * self.outer_strides[d] + (p % b) * self.inner_strides[d];
        }
        off
    }
}

/// Describes a tensor's logical shape, element type and physical layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryDesc {
    shape: Shape,
    dtype: DType,
    format: MemoryFormat,
    blocking: BlockingDesc,
}

impl MemoryDesc {
    /// Create a descriptor, failing if the format cannot hold this shape.
    pub fn new(shape: impl Into<Shape>, dtype: DType, format: MemoryFormat) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let blocking = blocking_for(&shape, &format)?;
        Ok(MemoryDesc {
            shape,
            dtype,
            format,
            blocking,
        })
    }

    /// Create a row-major descriptor.
    ///
    /// Uses the catalog's dense format for ranks 1, 2, 4 and 5, and an
    /// unblocked, unpadded [`MemoryFormat::Blocked`] otherwise.
    pub fn dense(shape: impl Into<Shape>, dtype: DType) -> Result<Self> {
        let shape = shape.into();
        let format = MemoryFormat::dense_for_rank(shape.rank()).unwrap_or_else(|| {
            MemoryFormat::Blocked(crate::format::BlockSpec::new(
                vec![1; shape.rank()],
                vec![0; shape.rank()],
            ))
        });
        Self::new(shape, dtype, format)
    }

    /// Same shape and format, different element type.
    pub fn with_dtype(&self, dtype: DType) -> Self {
        MemoryDesc {
            dtype,
            ..self.clone()
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn format(&self) -> &MemoryFormat {
        &self.format
    }

    pub fn blocking(&self) -> &BlockingDesc {
        &self.blocking
    }

    /// Number of logical elements.
    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Physical extent in elements, including padding.
    pub fn size(&self) -> usize {
        self.blocking.size()
    }

    /// Physical extent in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.size() * self.dtype.size_in_bytes()
    }

    /// Physical offset of the element at a logical flat index.
    ///
    /// The index must be below `elem_count()`; see [`try_offset`](Self::try_offset)
    /// for a checked version.
    #[inline]
    pub fn offset(&self, logical: usize) -> usize {
        let dims = self.shape.dims();
        let mut rem = logical;
        let mut off = 0usize;
        for d in (0..dims.len()).rev() {
            let p = rem % dims[d];
            rem /= dims[d];
            let b = self.blocking.block_dims[d];
            off += (p / b) * self.blocking.outer_strides[d] + (p % b) * self.blocking.inner_strides[d];
        }
        off
    }

    pub fn try_offset(&self, logical: usize) -> Result<usize> {
        let count = self.elem_count();
        if logical >= count {
            return Err(Error::IndexOutOfRange {
                index: logical,
                count,
            });
        }
        Ok(self.offset(logical))
    }

    /// Physical offset of a multi-dimensional coordinate.
    pub fn offset_of(&self, pos: &[usize]) -> usize {
        self.blocking.offset_of(pos)
    }

    /// Iterator over physical offsets, in logical order.
    pub fn offsets(&self) -> Offsets {
        Offsets::new(self)
    }

    /// Whether `offset(i) == i` for every logical index.
    pub fn is_dense(&self) -> bool {
        self.size() == self.elem_count() && self.offsets().enumerate().all(|(i, o)| i == o)
    }

    /// Copy physical elements into a vector in logical order.
    pub fn gather<T: Copy>(&self, physical: &[T]) -> Vec<T> {
        self.offsets().map(|o| physical[o]).collect()
    }

    /// Write logically ordered elements to their physical offsets.
    pub fn scatter<T: Copy>(&self, logical: &[T], physical: &mut [T]) {
        for (v, o) in logical.iter().zip(self.offsets()) {
            physical[o] = *v;
        }
    }
}

fn incompatible(shape: &Shape, format: &MemoryFormat, reason: String) -> Error {
    Error::IncompatibleFormat {
        format: format.clone(),
        shape: shape.clone(),
        reason,
    }
}

fn blocking_for(shape: &Shape, format: &MemoryFormat) -> Result<BlockingDesc> {
    let recipe = format.recipe();
    let rank = shape.rank();
    if recipe.rank != rank {
        return Err(incompatible(
            shape,
            format,
            format!("format describes rank {}, shape has rank {}", recipe.rank, rank),
        ));
    }

    let mut block_dims = vec![1usize; rank];
    for &(d, b) in &recipe.inner {
        if b == 0 {
            return Err(incompatible(shape, format, format!("axis {} has block size 0", d)));
        }
        block_dims[d] *= b;
    }

    let dims = shape.dims();
    let padded_dims = match &recipe.padding {
        Padding::RoundUp => dims
            .iter()
            .zip(&block_dims)
            .map(|(&n, &b)| n.div_ceil(b) * b)
            .collect(),
        Padding::Strict => {
            for (d, (&n, &b)) in dims.iter().zip(&block_dims).enumerate() {
                if n % b != 0 {
                    return Err(incompatible(
                        shape,
                        format,
                        format!("axis {} of size {} is not a multiple of block {}", d, n, b),
                    ));
                }
            }
            dims.to_vec()
        }
        Padding::Explicit(pad) => {
            if pad.len() != rank {
                return Err(incompatible(
                    shape,
                    format,
                    format!("{} padding entries for rank {}", pad.len(), rank),
                ));
            }
            let mut padded = Vec::with_capacity(rank);
            for d in 0..rank {
                let n = dims[d] + pad[d];
                if n % block_dims[d] != 0 {
                    return Err(incompatible(
                        shape,
                        format,
                        format!(
                            "axis {} padded to {} is not a multiple of block {}",
                            d, n, block_dims[d]
                        ),
                    ));
                }
                padded.push(n);
            }
            padded
        }
    };

    Ok(BlockingDesc::build(
        rank,
        &recipe.outer,
        &recipe.inner,
        block_dims,
        padded_dims,
    ))
}

// Offsets — Physical offsets of every logical element, in logical order
//
// Walks the logical coordinate like an odometer (rightmost axis first) and
// maps each position through the blocking strides. For a dense format this
// counts 0, 1, 2, ...; for nhwc or nChw8c it jumps around the buffer.

/// Iterator that yields the physical offset of each logical element.
pub struct Offsets<'a> {
    desc: &'a MemoryDesc,
    current: Vec<usize>,
    remaining: usize,
    started: bool,
}

impl<'a> Offsets<'a> {
    fn new(desc: &'a MemoryDesc) -> Self {
        Offsets {
            desc,
            current: vec![0; desc.rank()],
            remaining: desc.elem_count(),
            started: false,
        }
    }

    fn advance(&mut self) {
        let dims = self.desc.dims();
        for i in (0..dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < dims[i] {
                return;
            }
            self.current[i] = 0;
        }
    }
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.desc.offset_of(&self.current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Offsets<'_> {}
