// Kernels — im2col / col2im + GEMM for f32 convolution
//
// im2col extracts all sliding-window patches from one sample (one group's
// channels) and arranges them as columns of a matrix, which turns
// convolution into matrix products:
//
//   columns  = im2col(src)           [ic_g * kh * kw, oh * ow]
//   dst      = W × columns           [oc_g, oh * ow]             forward
//   columns  = Wᵀ × diff_dst         [ic_g * kh * kw, oh * ow]   backward-data
//   diff_src = col2im(columns)                                   backward-data
//   diff_W  += diff_dst × columnsᵀ   [oc_g, ic_g * kh * kw]      backward-weights
//
// col2im scatters columns back into an image buffer, accumulating where
// windows overlap. Left padding shifts the window origin; taps that land
// outside the image read as zero (im2col) or are dropped (col2im). Right
// padding only matters through the output size the caller passes in.
//
// GroupGemm carries the three products, each restricted to one group's
// block of the weights and dst buffers.
//
// All buffers here are logical, row-major f32. `load` and `store` move data
// between those buffers and a Memory's physical layout.

use vole_core::error::{Error, Result};
use vole_core::memory::{typed, typed_mut, Memory};

use crate::desc::ConvGeometry;
use crate::primitive_desc::Implementation;

/// Spatial parameters shared by im2col and col2im.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub h: usize,
    pub w: usize,
    pub kh: usize,
    pub kw: usize,
    pub sh: usize,
    pub sw: usize,
    pub ph: usize,
    pub pw: usize,
    pub oh: usize,
    pub ow: usize,
}

impl Window {
    /// Input coordinate hit by output `o` and kernel tap `k`, if inside the image.
    #[inline]
    fn tap(o: usize, k: usize, stride: usize, pad: usize, extent: usize) -> Option<usize> {
        let i = (o * stride + k).checked_sub(pad)?;
        (i < extent).then_some(i)
    }
}

/// Extract patches of `channels` image planes (`[channels, h, w]`) into
/// `columns` (`[channels * kh * kw, oh * ow]`).
pub(crate) fn im2col(input: &[f32], channels: usize, win: &Window, columns: &mut [f32]) {
    let col_cols = win.oh * win.ow;
    for c in 0..channels {
        let plane = &input[c * win.h * win.w..(c + 1) * win.h * win.w];
        for ki in 0..win.kh {
            for kj in 0..win.kw {
                let row = (c * win.kh + ki) * win.kw + kj;
                let out = &mut columns[row * col_cols..(row + 1) * col_cols];
                for oy in 0..win.oh {
                    let iy = Window::tap(oy, ki, win.sh, win.ph, win.h);
                    for ox in 0..win.ow {
                        let ix = Window::tap(ox, kj, win.sw, win.pw, win.w);
                        out[oy * win.ow + ox] = match (iy, ix) {
                            (Some(y), Some(x)) => plane[y * win.w + x],
                            _ => 0.0,
                        };
                    }
                }
            }
        }
    }
}

/// Accumulate `columns` back into image planes. `output` must be zeroed
/// by the caller if a fresh result is wanted.
pub(crate) fn col2im(columns: &[f32], channels: usize, win: &Window, output: &mut [f32]) {
    let col_cols = win.oh * win.ow;
    for c in 0..channels {
        let plane = &mut output[c * win.h * win.w..(c + 1) * win.h * win.w];
        for ki in 0..win.kh {
            for kj in 0..win.kw {
                let row = (c * win.kh + ki) * win.kw + kj;
                let col = &columns[row * col_cols..(row + 1) * col_cols];
                for oy in 0..win.oh {
                    let Some(y) = Window::tap(oy, ki, win.sh, win.ph, win.h) else {
                        continue;
                    };
                    for ox in 0..win.ow {
                        if let Some(x) = Window::tap(ox, kj, win.sw, win.pw, win.w) {
                            plane[y * win.w + x] += col[oy * win.ow + ox];
                        }
                    }
                }
            }
        }
    }
}

/// Per-group matrix products of a convolution.
///
/// Operands are whole per-sample (or whole weights) buffers; each product
/// selects group `grp`'s block itself. Shapes, with `r = ic_g * kh * kw` and
/// `p = oh * ow`:
///
///   weights  [groups, oc_g, r]
///   columns  [r, p]              one group, one sample
///   dst      [groups * oc_g, p]  one sample
///
/// Every product accumulates (`+=`) into its output block, in ascending
/// order of the reduced index.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GroupGemm {
    ocg: usize,
    rows: usize,
    cols: usize,
}

impl GroupGemm {
    pub fn new(geometry: &ConvGeometry) -> Self {
        GroupGemm {
            ocg: geometry.oc_per_group(),
            rows: geometry.ic_per_group() * geometry.kh * geometry.kw,
            cols: geometry.oh * geometry.ow,
        }
    }

    /// Elements in one group's weights block.
    pub fn weights_len(&self) -> usize {
        self.ocg * self.rows
    }

    /// Elements in one group's dst block.
    pub fn dst_len(&self) -> usize {
        self.ocg * self.cols
    }

    /// Elements in one columns matrix.
    pub fn columns_len(&self) -> usize {
        self.rows * self.cols
    }

    /// dst_g += W_g × columns
    pub fn forward(&self, grp: usize, weights: &[f32], columns: &[f32], dst: &mut [f32]) {
        let w = &weights[grp * self.weights_len()..][..self.weights_len()];
        let out = &mut dst[grp * self.dst_len()..][..self.dst_len()];
        for (o, out_row) in out.chunks_exact_mut(self.cols).enumerate() {
            let w_row = &w[o * self.rows..][..self.rows];
            for (&wv, col_row) in w_row.iter().zip(columns.chunks_exact(self.cols)) {
                for (acc, &c) in out_row.iter_mut().zip(col_row) {
                    *acc += wv * c;
                }
            }
        }
    }

    /// columns += W_gᵀ × diff_dst_g
    pub fn backward_data(&self, grp: usize, weights: &[f32], diff_dst: &[f32], columns: &mut [f32]) {
        let w = &weights[grp * self.weights_len()..][..self.weights_len()];
        let dd = &diff_dst[grp * self.dst_len()..][..self.dst_len()];
        for (r, col_row) in columns.chunks_exact_mut(self.cols).enumerate() {
            for (o, dd_row) in dd.chunks_exact(self.cols).enumerate() {
                let wv = w[o * self.rows + r];
                for (acc, &d) in col_row.iter_mut().zip(dd_row) {
                    *acc += wv * d;
                }
            }
        }
    }

    /// diff_W_g += diff_dst_g × columnsᵀ
    pub fn backward_weights(&self, grp: usize, diff_dst: &[f32], columns: &[f32], diff_weights: &mut [f32]) {
        let dd = &diff_dst[grp * self.dst_len()..][..self.dst_len()];
        let dw = &mut diff_weights[grp * self.weights_len()..][..self.weights_len()];
        for (dw_row, dd_row) in dw.chunks_exact_mut(self.rows).zip(dd.chunks_exact(self.cols)) {
            for (acc, col_row) in dw_row.iter_mut().zip(columns.chunks_exact(self.cols)) {
                let dot: f32 = dd_row.iter().zip(col_row).map(|(&d, &c)| d * c).sum();
                *acc += dot;
            }
        }
    }
}

/// Copy a tensor's logical contents into an owned row-major buffer.
///
/// The read guard is released before returning so the caller can take a
/// write lock on its output.
pub(crate) fn load(mem: &Memory, implementation: Implementation, role: &'static str) -> Result<Vec<f32>> {
    let desc = mem.desc();
    let guard = mem.read()?;
    let physical = typed::<f32>(&guard)?;
    check_extent(role, desc.size(), physical.len())?;
    Ok(match implementation {
        Implementation::Dense => physical[..desc.elem_count()].to_vec(),
        Implementation::Gathered => desc.gather(physical),
    })
}

/// Write a row-major logical buffer into a tensor's physical layout.
pub(crate) fn store(mem: &Memory, implementation: Implementation, role: &'static str, logical: &[f32]) -> Result<()> {
    let desc = mem.desc();
    let mut guard = mem.write()?;
    let physical = typed_mut::<f32>(&mut guard)?;
    check_extent(role, desc.size(), physical.len())?;
    match implementation {
        Implementation::Dense => physical[..logical.len()].copy_from_slice(logical),
        Implementation::Gathered => desc.scatter(logical, physical),
    }
    Ok(())
}

fn check_extent(role: &'static str, required: usize, got: usize) -> Result<()> {
    if got < required {
        return Err(Error::InsufficientExtent { role, required, got });
    }
    Ok(())
}
