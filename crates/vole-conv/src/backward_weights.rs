use rayon::prelude::*;

use vole_core::engine::Engine;
use vole_core::error::Result;
use vole_core::memory::Memory;
use vole_core::primitive::{Execute, Primitive};

use crate::kernels::{self, GroupGemm, Window};
use crate::primitive_desc::{check_binding, check_no_alias, ConvolutionBackwardWeightsPrimitiveDesc};

// ConvolutionBackwardWeights — diff_weights from src and diff_dst
//
// Per group: diff_W_g = Σ_n diff_dst_{n,g} × im2col(src_{n,g})ᵀ.
// Each sample's contribution is computed in parallel into its own buffer;
// the partial sums are then added in sample order so the result does not
// depend on how the work was scheduled.

/// Backward-weights convolution bound to its tensors.
#[derive(Debug)]
pub struct ConvolutionBackwardWeights {
    pd: ConvolutionBackwardWeightsPrimitiveDesc,
    src: Memory,
    diff_dst: Memory,
    diff_weights: Memory,
}

impl ConvolutionBackwardWeights {
    pub fn new(
        pd: &ConvolutionBackwardWeightsPrimitiveDesc,
        src: &Memory,
        diff_dst: &Memory,
        diff_weights: &Memory,
    ) -> Result<Self> {
        let engine = pd.engine();
        check_binding("src", pd.src_desc(), engine, src)?;
        check_binding("diff_dst", pd.diff_dst_desc(), engine, diff_dst)?;
        check_binding("diff_weights", pd.diff_weights_desc(), engine, diff_weights)?;
        check_no_alias(
            "diff_weights",
            diff_weights,
            &[("src", src), ("diff_dst", diff_dst)],
        )?;
        Ok(ConvolutionBackwardWeights {
            pd: pd.clone(),
            src: src.clone(),
            diff_dst: diff_dst.clone(),
            diff_weights: diff_weights.clone(),
        })
    }

    pub fn primitive_desc(&self) -> &ConvolutionBackwardWeightsPrimitiveDesc {
        &self.pd
    }
}

impl Execute for ConvolutionBackwardWeights {
    fn name(&self) -> &str {
        "convolution_backward_weights"
    }

    fn engine(&self) -> &Engine {
        self.pd.engine()
    }

    fn outputs(&self) -> Vec<&Memory> {
        vec![&self.diff_weights]
    }

    fn execute(&self) -> Result<()> {
        let imp = self.pd.implementation();
        let g = *self.pd.desc().geometry();
        let src = kernels::load(&self.src, imp, "src")?;
        let diff_dst = kernels::load(&self.diff_dst, imp, "diff_dst")?;

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
        let dst_sample = g.groups * mm.dst_len();
        let w_total = g.groups * mm.weights_len();

        let partials: Vec<Vec<f32>> = (0..g.mb)
            .into_par_iter()
            .map(|n| {
                let mut part = vec![0.0f32; w_total];
                let sample = &diff_dst[n * dst_sample..][..dst_sample];
                let mut columns = vec![0.0f32; mm.columns_len()];
                for grp in 0..g.groups {
                    let s = n * src_sample + grp * src_group;
                    kernels::im2col(&src[s..s + src_group], icg, &win, &mut columns);
                    mm.backward_weights(grp, sample, &columns, &mut part);
                }
                part
            })
            .collect();

        let mut diff_weights = vec![0.0f32; w_total];
        for part in &partials {
            for (acc, v) in diff_weights.iter_mut().zip(part) {
                *acc += v;
            }
        }

        kernels::store(&self.diff_weights, imp, "diff_weights", &diff_weights)
    }
}

impl From<ConvolutionBackwardWeights> for Primitive {
    fn from(op: ConvolutionBackwardWeights) -> Self {
        Primitive::new(op)
    }
}
