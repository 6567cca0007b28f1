// ConvolutionDesc — Declarative description of one convolution
//
// A descriptor records *what* to compute: direction, algorithm, the three
// operand memory descriptors, strides and padding. It is validated for
// well-formedness on construction (ranks, strides, group partitioning) but
// not yet bound to an engine; that happens when it is resolved into a
// primitive descriptor.
//
// OPERAND SHAPES:
//
//   src / diff_src:           [mb, ic, ih, iw]
//   weights / diff_weights:   [oc, ic, kh, kw]               (g == 1)
//                             [g, oc/g, ic/g, kh, kw]        (g > 1)
//   dst / diff_dst:           [mb, oc, oh, ow]
//
// The group count is implied by the weights rank.

use std::fmt;

use vole_core::error::{Error, Result};
use vole_core::memory_desc::MemoryDesc;
use vole_core::shape::Shape;

/// Which convolution pass a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    BackwardData,
    BackwardWeights,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Forward => "forward",
            Direction::BackwardData => "backward_data",
            Direction::BackwardWeights => "backward_weights",
        };
        write!(f, "{}", s)
    }
}

/// Convolution algorithm requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    #[default]
    Direct,
    Winograd,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Direct => write!(f, "direct"),
            Algorithm::Winograd => write!(f, "winograd"),
        }
    }
}

/// What out-of-bounds taps read. Only zero padding exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PaddingKind {
    #[default]
    Zero,
}

/// All sizes of one convolution, derived from the operand descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvGeometry {
    pub mb: usize,
    pub groups: usize,
    pub ic: usize,
    pub oc: usize,
    pub ih: usize,
    pub iw: usize,
    pub oh: usize,
    pub ow: usize,
    pub kh: usize,
    pub kw: usize,
    pub strides: [usize; 2],
    pub padding_l: [usize; 2],
    pub padding_r: [usize; 2],
}

impl ConvGeometry {
    pub fn ic_per_group(&self) -> usize {
        self.ic / self.groups
    }

    pub fn oc_per_group(&self) -> usize {
        self.oc / self.groups
    }

    pub fn src_shape(&self) -> Shape {
        Shape::from((self.mb, self.ic, self.ih, self.iw))
    }

    pub fn dst_shape(&self) -> Shape {
        Shape::from((self.mb, self.oc, self.oh, self.ow))
    }

    /// Weights shape, with a leading group axis only when `groups > 1`.
    pub fn weights_shape(&self) -> Shape {
        if self.groups > 1 {
            Shape::from((
                self.groups,
                self.oc_per_group(),
                self.ic_per_group(),
                self.kh,
                self.kw,
            ))
        } else {
            Shape::from((self.oc, self.ic, self.kh, self.kw))
        }
    }
}

impl fmt::Display for ConvGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mb{}_g{}_ic{}oc{}_ih{}iw{}_oh{}ow{}_kh{}kw{}_sh{}sw{}_ph{}pw{}",
            self.mb,
            self.groups,
            self.ic,
            self.oc,
            self.ih,
            self.iw,
            self.oh,
            self.ow,
            self.kh,
            self.kw,
            self.strides[0],
            self.strides[1],
            self.padding_l[0],
            self.padding_l[1],
        )
    }
}

/// Immutable description of a convolution, not yet bound to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvolutionDesc {
    direction: Direction,
    algorithm: Algorithm,
    src: MemoryDesc,
    weights: MemoryDesc,
    dst: MemoryDesc,
    padding_kind: PaddingKind,
    geometry: ConvGeometry,
}

impl ConvolutionDesc {
    /// Describe a forward convolution `dst = src * weights`.
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        algorithm: Algorithm,
        src: &MemoryDesc,
        weights: &MemoryDesc,
        dst: &MemoryDesc,
        strides: [usize; 2],
        padding_l: [usize; 2],
        padding_r: [usize; 2],
        padding_kind: PaddingKind,
    ) -> Result<Self> {
        Self::new(
            Direction::Forward,
            algorithm,
            src,
            weights,
            dst,
            strides,
            padding_l,
            padding_r,
            padding_kind,
        )
    }

    /// Describe the gradient with respect to the convolution input.
    #[allow(clippy::too_many_arguments)]
    pub fn backward_data(
        algorithm: Algorithm,
        diff_src: &MemoryDesc,
        weights: &MemoryDesc,
        diff_dst: &MemoryDesc,
        strides: [usize; 2],
        padding_l: [usize; 2],
        padding_r: [usize; 2],
        padding_kind: PaddingKind,
    ) -> Result<Self> {
        Self::new(
            Direction::BackwardData,
            algorithm,
            diff_src,
            weights,
            diff_dst,
            strides,
            padding_l,
            padding_r,
            padding_kind,
        )
    }

    /// Describe the gradient with respect to the weights.
    #[allow(clippy::too_many_arguments)]
    pub fn backward_weights(
        algorithm: Algorithm,
        src: &MemoryDesc,
        diff_weights: &MemoryDesc,
        diff_dst: &MemoryDesc,
        strides: [usize; 2],
        padding_l: [usize; 2],
        padding_r: [usize; 2],
        padding_kind: PaddingKind,
    ) -> Result<Self> {
        Self::new(
            Direction::BackwardWeights,
            algorithm,
            src,
            diff_weights,
            diff_dst,
            strides,
            padding_l,
            padding_r,
            padding_kind,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        direction: Direction,
        algorithm: Algorithm,
        src: &MemoryDesc,
        weights: &MemoryDesc,
        dst: &MemoryDesc,
        strides: [usize; 2],
        padding_l: [usize; 2],
        padding_r: [usize; 2],
        padding_kind: PaddingKind,
    ) -> Result<Self> {
        if src.rank() != 4 {
            return Err(Error::RankMismatch {
                expected: 4,
                got: src.rank(),
            });
        }
        if dst.rank() != 4 {
            return Err(Error::RankMismatch {
                expected: 4,
                got: dst.rank(),
            });
        }
        let w = weights.dims();
        let (groups, kh, kw) = match w.len() {
            4 => (1, w[2], w[3]),
            5 => (w[0], w[3], w[4]),
            got => return Err(Error::RankMismatch { expected: 4, got }),
        };
        if let Some(axis) = strides.iter().position(|&s| s == 0) {
            return Err(Error::InvalidDescriptor(format!(
                "stride on axis {} is zero",
                axis
            )));
        }

        let s = src.dims();
        let d = dst.dims();
        let (ic, oc) = (s[1], d[1]);
        if ic % groups != 0 {
            return Err(Error::InvalidGroups {
                groups,
                channels: ic,
                role: "input",
            });
        }
        if oc % groups != 0 {
            return Err(Error::InvalidGroups {
                groups,
                channels: oc,
                role: "output",
            });
        }

        let geometry = ConvGeometry {
            mb: s[0],
            groups,
            ic,
            oc,
            ih: s[2],
            iw: s[3],
            oh: d[2],
            ow: d[3],
            kh,
            kw,
            strides,
            padding_l,
            padding_r,
        };

        Ok(ConvolutionDesc {
            direction,
            algorithm,
            src: src.clone(),
            weights: weights.clone(),
            dst: dst.clone(),
            padding_kind,
            geometry,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// `src` for forward and backward-weights, `diff_src` for backward-data.
    pub fn src_desc(&self) -> &MemoryDesc {
        &self.src
    }

    /// `weights`, or `diff_weights` for backward-weights.
    pub fn weights_desc(&self) -> &MemoryDesc {
        &self.weights
    }

    /// `dst` for forward, `diff_dst` for the backward directions.
    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.dst
    }

    pub fn padding_kind(&self) -> PaddingKind {
        self.padding_kind
    }

    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    pub fn strides(&self) -> [usize; 2] {
        self.geometry.strides
    }

    pub fn padding_l(&self) -> [usize; 2] {
        self.geometry.padding_l
    }

    pub fn padding_r(&self) -> [usize; 2] {
        self.geometry.padding_r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vole_core::{DType, MemoryFormat};

    fn md(dims: Vec<usize>, format: MemoryFormat) -> MemoryDesc {
        MemoryDesc::new(dims, DType::F32, format).unwrap()
    }

    #[test]
    fn test_geometry_from_descs() {
        let src = md(vec![2, 4, 5, 5], MemoryFormat::Nchw);
        let w = md(vec![6, 4, 3, 3], MemoryFormat::Oihw);
        let dst = md(vec![2, 6, 3, 3], MemoryFormat::Nchw);
        let desc = ConvolutionDesc::backward_data(
            Algorithm::Direct,
            &src,
            &w,
            &dst,
            [1, 1],
            [0, 0],
            [0, 0],
            PaddingKind::Zero,
        )
        .unwrap();
        let g = desc.geometry();
        assert_eq!(desc.direction(), Direction::BackwardData);
        assert_eq!((g.mb, g.groups, g.ic, g.oc), (2, 1, 4, 6));
        assert_eq!((g.ih, g.oh, g.kh), (5, 3, 3));
        assert_eq!(g.weights_shape(), Shape::from((6, 4, 3, 3)));
        assert_eq!(g.to_string(), "mb2_g1_ic4oc6_ih5iw5_oh3ow3_kh3kw3_sh1sw1_ph0pw0");
    }

    #[test]
    fn test_grouped_weights_shape() {
        let src = md(vec![1, 4, 4, 4], MemoryFormat::Nchw);
        let w = md(vec![2, 3, 2, 3, 3], MemoryFormat::Goihw);
        let dst = md(vec![1, 6, 4, 4], MemoryFormat::Nchw);
        let desc = ConvolutionDesc::forward(
            Algorithm::Direct,
            &src,
            &w,
            &dst,
            [1, 1],
            [1, 1],
            [1, 1],
            PaddingKind::Zero,
        )
        .unwrap();
        let g = desc.geometry();
        assert_eq!(g.groups, 2);
        assert_eq!(g.ic_per_group(), 2);
        assert_eq!(g.oc_per_group(), 3);
        assert_eq!(g.weights_shape(), Shape::from((2, 3, 2, 3, 3)));
    }

    #[test]
    fn test_bad_group_partition() {
        let src = md(vec![1, 4, 4, 4], MemoryFormat::Nchw);
        let w = md(vec![3, 2, 1, 3, 3], MemoryFormat::Goihw);
        let dst = md(vec![1, 6, 4, 4], MemoryFormat::Nchw);
        let e = ConvolutionDesc::forward(
            Algorithm::Direct,
            &src,
            &w,
            &dst,
            [1, 1],
            [1, 1],
            [1, 1],
            PaddingKind::Zero,
        );
        assert!(matches!(
            e,
            Err(Error::InvalidGroups {
                groups: 3,
                channels: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_zero_stride_rejected() {
        let src = md(vec![1, 4, 4, 4], MemoryFormat::Nchw);
        let w = md(vec![4, 4, 3, 3], MemoryFormat::Oihw);
        let dst = md(vec![1, 4, 2, 2], MemoryFormat::Nchw);
        let e = ConvolutionDesc::forward(
            Algorithm::Direct,
            &src,
            &w,
            &dst,
            [0, 1],
            [0, 0],
            [0, 0],
            PaddingKind::Zero,
        );
        assert!(matches!(e, Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn test_weights_rank_checked() {
        let src = md(vec![1, 4, 4, 4], MemoryFormat::Nchw);
        let w = md(vec![4, 4], MemoryFormat::Oi);
        let dst = md(vec![1, 4, 2, 2], MemoryFormat::Nchw);
        let e = ConvolutionDesc::forward(
            Algorithm::Direct,
            &src,
            &w,
            &dst,
            [1, 1],
            [0, 0],
            [0, 0],
            PaddingKind::Zero,
        );
        assert!(matches!(e, Err(Error::RankMismatch { got: 2, .. })));
    }
}
