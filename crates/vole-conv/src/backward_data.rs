use rayon::prelude::*;

use vole_core::engine::Engine;
use vole_core::error::Result;
use vole_core::memory::Memory;
use vole_core::primitive::{Execute, Primitive};

use crate::kernels::{self, GroupGemm, Window};
use crate::primitive_desc::{check_binding, check_no_alias, ConvolutionBackwardDataPrimitiveDesc};

// ConvolutionBackwardData — diff_src from diff_dst and weights
//
// The gradient of a convolution with respect to its input is the
// transposed convolution of diff_dst with the same weights. Per sample and
// group:
//
//   columns  = W_gᵀ × diff_dst_g       [ic_g * kh * kw, oh * ow]
//   diff_src_g = col2im(columns)
//
// col2im drops the taps that fall into left or right padding, so the
// result only covers real input positions. Every diff_src element is
// overwritten: the buffer is assembled from zero and stored in one pass.

/// Backward-data convolution bound to its tensors.
#[derive(Debug)]
pub struct ConvolutionBackwardData {
    pd: ConvolutionBackwardDataPrimitiveDesc,
    diff_dst: Memory,
    weights: Memory,
    diff_src: Memory,
}

impl ConvolutionBackwardData {
    pub fn new(
        pd: &ConvolutionBackwardDataPrimitiveDesc,
        diff_dst: &Memory,
        weights: &Memory,
        diff_src: &Memory,
    ) -> Result<Self> {
        let engine = pd.engine();
        check_binding("diff_dst", pd.diff_dst_desc(), engine, diff_dst)?;
        check_binding("weights", pd.weights_desc(), engine, weights)?;
        check_binding("diff_src", pd.diff_src_desc(), engine, diff_src)?;
        check_no_alias(
            "diff_src",
            diff_src,
            &[("diff_dst", diff_dst), ("weights", weights)],
        )?;
        Ok(ConvolutionBackwardData {
            pd: pd.clone(),
            diff_dst: diff_dst.clone(),
            weights: weights.clone(),
            diff_src: diff_src.clone(),
        })
    }

    pub fn primitive_desc(&self) -> &ConvolutionBackwardDataPrimitiveDesc {
        &self.pd
    }
}

impl Execute for ConvolutionBackwardData {
    fn name(&self) -> &str {
        "convolution_backward_data"
    }

    fn engine(&self) -> &Engine {
        self.pd.engine()
    }

    fn outputs(&self) -> Vec<&Memory> {
        vec![&self.diff_src]
    }

    fn execute(&self) -> Result<()> {
        let imp = self.pd.implementation();
        let g = *self.pd.desc().geometry();
        let diff_dst = kernels::load(&self.diff_dst, imp, "diff_dst")?;
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
        let dst_sample = g.groups * mm.dst_len();
        let src_group = icg * g.ih * g.iw;

        log::debug!("convolution_backward_data {} ({:?})", g, imp);

        let mut diff_src = vec![0.0f32; g.mb * g.ic * g.ih * g.iw];
        diff_src
            .par_chunks_mut(g.ic * g.ih * g.iw)
            .enumerate()
            .for_each(|(n, out)| {
                let sample = &diff_dst[n * dst_sample..][..dst_sample];
                let mut columns = vec![0.0f32; mm.columns_len()];
                for grp in 0..g.groups {
                    columns.fill(0.0);
                    mm.backward_data(grp, &weights, sample, &mut columns);
                    kernels::col2im(
                        &columns,
                        icg,
                        &win,
                        &mut out[grp * src_group..(grp + 1) * src_group],
                    );
                }
            });

        kernels::store(&self.diff_src, imp, "diff_src", &diff_src)
    }
}

impl From<ConvolutionBackwardData> for Primitive {
    fn from(op: ConvolutionBackwardData) -> Self {
        Primitive::new(op)
    }
}
