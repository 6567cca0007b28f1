use rayon::prelude::*;

use vole_core::engine::Engine;
use vole_core::error::Result;
use vole_core::memory::Memory;
use vole_core::primitive::{Execute, Primitive};

use crate::kernels::{self, GroupGemm, Window};
use crate::primitive_desc::{check_binding, check_no_alias, ConvolutionForwardPrimitiveDesc};

// ConvolutionForward — dst = conv(src, weights)
//
// Per sample and group: im2col the group's input channels, then one GEMM
// with the group's weights block. Samples are independent, so the output
// is split into per-sample chunks and processed in parallel.

/// Forward convolution bound to its tensors.
#[derive(Debug)]
pub struct ConvolutionForward {
    pd: ConvolutionForwardPrimitiveDesc,
    src: Memory,
    weights: Memory,
    dst: Memory,
}

impl ConvolutionForward {
    pub fn new(pd: &ConvolutionForwardPrimitiveDesc, src: &Memory, weights: &Memory, dst: &Memory) -> Result<Self> {
        let engine = pd.engine();
        check_binding("src", pd.src_desc(), engine, src)?;
        check_binding("weights", pd.weights_desc(), engine, weights)?;
        check_binding("dst", pd.dst_desc(), engine, dst)?;
        check_no_alias("dst", dst, &[("src", src), ("weights", weights)])?;
        Ok(ConvolutionForward {
            pd: pd.clone(),
            src: src.clone(),
            weights: weights.clone(),
            dst: dst.clone(),
        })
    }

    pub fn primitive_desc(&self) -> &ConvolutionForwardPrimitiveDesc {
        &self.pd
    }
}

impl Execute for ConvolutionForward {
    fn name(&self) -> &str {
        "convolution_forward"
    }

    fn engine(&self) -> &Engine {
        self.pd.engine()
    }

    fn outputs(&self) -> Vec<&Memory> {
        vec![&self.dst]
    }

    fn execute(&self) -> Result<()> {
        let imp = self.pd.implementation();
        let g = *self.pd.desc().geometry();
        let src = kernels::load(&self.src, imp, "src")?;
        let weights = kernels::load(&self.weights, imp, "weights")?;

        let win = Window {
            h: g.ih,
            w: g.iw,
            kh: g.kh,
            kw: g.kw,
            sh: g.strides[0],
            sw: g.strides[1],
            ph: g.padding_l[0],
            pw: g.padding_l[1],
            oh: g.oh,
            ow: g.ow,
        };
        let mm = GroupGemm::new(&g);
        let icg = g.ic_per_group();
        let src_sample = g.ic * g.ih * g.iw;
        let src_group = icg * g.ih * g.iw;

        let mut dst = vec![0.0f32; g.mb * g.groups * mm.dst_len()];
        dst.par_chunks_mut(g.groups * mm.dst_len())
            .enumerate()
            .for_each(|(n, out)| {
                let mut columns = vec![0.0f32; mm.columns_len()];
                for grp in 0..g.groups {
                    let s = n * src_sample + grp * src_group;
                    kernels::im2col(&src[s..s + src_group], icg, &win, &mut columns);
                    mm.forward(grp, &weights, &columns, out);
                }
            });

        kernels::store(&self.dst, imp, "dst", &dst)
    }
}

impl From<ConvolutionForward> for Primitive {
    fn from(op: ConvolutionForward) -> Self {
        Primitive::new(op)
    }
}
