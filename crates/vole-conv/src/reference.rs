// Reference convolutions — brute force, format agnostic
//
// These evaluate the convolution sums directly from their definitions, one
// output element at a time, and reach every operand only through
// `MemoryDesc::offset`. They share no code with the im2col/GEMM kernels,
// which is what makes them useful as a yardstick.
//
// Each output element is independent, so the logical index range is split
// across rayon workers. Inputs are read under shared locks, the results are
// collected in logical order, and then each element is written exactly once
// under the output's write lock.
//
// BACKWARD DATA:
//
//   diff_src[n, g, ic, ih, iw] = Σ_{oc, kh, kw} diff_dst[n, g, oc, oh, ow]
//                                               * weights[g, oc, ic, kh, kw]
//
//   with oh = (ih + pad_h - kh) / str_h, ow = (iw + pad_w - kw) / str_w,
//   taken only when the numerators are non-negative, divisible by the
//   stride, and land inside [0, oh_size) x [0, ow_size).

use rayon::prelude::*;

use vole_core::error::{Error, Result};
use vole_core::memory::{typed, typed_mut, Memory};
use vole_core::memory_desc::MemoryDesc;
use vole_core::shape::Shape;

use crate::desc::{ConvGeometry, ConvolutionDesc};

fn check_shape(mem: &Memory, expected: Shape) -> Result<()> {
    if mem.shape() != &expected {
        return Err(Error::ShapeMismatch {
            expected,
            got: mem.shape().clone(),
        });
    }
    Ok(())
}

fn check_output(role: &'static str, output: &Memory, inputs: [(&'static str, &Memory); 2]) -> Result<()> {
    for (input_role, input) in inputs {
        if output.same_buffer(input) {
            return Err(Error::AliasedBuffers {
                output: role,
                input: input_role,
            });
        }
    }
    Ok(())
}

fn physical<'a>(role: &'static str, desc: &MemoryDesc, data: &'a [f32]) -> Result<&'a [f32]> {
    if data.len() < desc.size() {
        return Err(Error::InsufficientExtent {
            role,
            required: desc.size(),
            got: data.len(),
        });
    }
    Ok(data)
}

/// Write logically ordered values to `output` through its descriptor.
fn write_out(role: &'static str, output: &Memory, values: &[f32]) -> Result<()> {
    let desc = output.desc();
    let mut guard = output.write()?;
    let data = typed_mut::<f32>(&mut guard)?;
    if data.len() < desc.size() {
        return Err(Error::InsufficientExtent {
            role,
            required: desc.size(),
            got: data.len(),
        });
    }
    for (i, &v) in values.iter().enumerate() {
        data[desc.offset(i)] = v;
    }
    Ok(())
}

/// `[a, b, c, d]` coordinates of a logical index in a rank-4 shape.
#[inline]
fn unravel4(mut i: usize, dims: [usize; 4]) -> [usize; 4] {
    let mut pos = [0usize; 4];
    for d in (0..4).rev() {
        pos[d] = i % dims[d];
        i /= dims[d];
    }
    pos
}

/// Logical index of a weights element; the same formula serves the grouped
/// `[g, oc/g, ic/g, kh, kw]` and the plain `[oc, ic, kh, kw]` layouts.
#[inline]
fn weights_index(g: &ConvGeometry, grp: usize, oc: usize, ic: usize, ky: usize, kx: usize) -> usize {
    (((grp * g.oc_per_group() + oc) * g.ic_per_group() + ic) * g.kh + ky) * g.kw + kx
}

/// Input coordinate read by output `o` through tap `k`, if inside the image.
#[inline]
fn source(o: usize, k: usize, stride: usize, pad: usize, extent: usize) -> Option<usize> {
    let i = (o * stride + k).checked_sub(pad)?;
    (i < extent).then_some(i)
}

/// Output coordinate fed by input `i` through tap `k`, if it exists.
#[inline]
fn target(i: usize, k: usize, stride: usize, pad: usize, extent: usize) -> Option<usize> {
    let num = (i + pad).checked_sub(k)?;
    if num % stride != 0 {
        return None;
    }
    let o = num / stride;
    (o < extent).then_some(o)
}

/// Reference forward convolution: `dst = conv(src, weights)`.
pub fn conv_fwd(desc: &ConvolutionDesc, src: &Memory, weights: &Memory, dst: &Memory) -> Result<()> {
    let g = *desc.geometry();
    check_shape(src, g.src_shape())?;
    check_shape(weights, g.weights_shape())?;
    check_shape(dst, g.dst_shape())?;
    check_output("dst", dst, [("src", src), ("weights", weights)])?;

    let values: Vec<f32> = {
        let src_guard = src.read()?;
        let w_guard = weights.read()?;
        let src_data = physical("src", src.desc(), typed::<f32>(&src_guard)?)?;
        let w_data = physical("weights", weights.desc(), typed::<f32>(&w_guard)?)?;
        let (src_desc, w_desc) = (src.desc(), weights.desc());
        let (icg, ocg) = (g.ic_per_group(), g.oc_per_group());

        (0..g.mb * g.oc * g.oh * g.ow)
            .into_par_iter()
            .map(|i| {
                let [n, c, oy, ox] = unravel4(i, [g.mb, g.oc, g.oh, g.ow]);
                let (grp, oc) = (c / ocg, c % ocg);
                let mut acc = 0.0f32;
                for ic in 0..icg {
                    for ky in 0..g.kh {
                        let Some(iy) = source(oy, ky, g.strides[0], g.padding_l[0], g.ih) else {
                            continue;
                        };
                        for kx in 0..g.kw {
                            let Some(ix) = source(ox, kx, g.strides[1], g.padding_l[1], g.iw) else {
                                continue;
                            };
                            let s = ((n * g.ic + grp * icg + ic) * g.ih + iy) * g.iw + ix;
                            let w = weights_index(&g, grp, oc, ic, ky, kx);
                            acc += src_data[src_desc.offset(s)] * w_data[w_desc.offset(w)];
                        }
                    }
                }
                acc
            })
            .collect()
    };

    write_out("dst", dst, &values)
}

/// Reference backward-data convolution: `diff_src` from `diff_dst` and `weights`.
pub fn conv_bwd_data(desc: &ConvolutionDesc, diff_dst: &Memory, weights: &Memory, diff_src: &Memory) -> Result<()> {
    let g = *desc.geometry();
    check_shape(diff_dst, g.dst_shape())?;
    check_shape(weights, g.weights_shape())?;
    check_shape(diff_src, g.src_shape())?;
    check_output("diff_src", diff_src, [("diff_dst", diff_dst), ("weights", weights)])?;

    let values: Vec<f32> = {
        let dd_guard = diff_dst.read()?;
        let w_guard = weights.read()?;
        let dd_data = physical("diff_dst", diff_dst.desc(), typed::<f32>(&dd_guard)?)?;
        let w_data = physical("weights", weights.desc(), typed::<f32>(&w_guard)?)?;
        let (dd_desc, w_desc) = (diff_dst.desc(), weights.desc());
        let (icg, ocg) = (g.ic_per_group(), g.oc_per_group());

        (0..g.mb * g.ic * g.ih * g.iw)
            .into_par_iter()
            .map(|i| {
                let [n, c, iy, ix] = unravel4(i, [g.mb, g.ic, g.ih, g.iw]);
                let (grp, ic) = (c / icg, c % icg);
                let mut acc = 0.0f32;
                for oc in 0..ocg {
                    for ky in 0..g.kh {
                        let Some(oy) = target(iy, ky, g.strides[0], g.padding_l[0], g.oh) else {
                            continue;
                        };
                        for kx in 0..g.kw {
                            let Some(ox) = target(ix, kx, g.strides[1], g.padding_l[1], g.ow) else {
                                continue;
                            };
                            let d = ((n * g.oc + grp * ocg + oc) * g.oh + oy) * g.ow + ox;
                            let w = weights_index(&g, grp, oc, ic, ky, kx);
                            acc += dd_data[dd_desc.offset(d)] * w_data[w_desc.offset(w)];
                        }
                    }
                }
                acc
            })
            .collect()
    };

    write_out("diff_src", diff_src, &values)
}

/// Reference backward-weights convolution: `diff_weights` from `src` and `diff_dst`.
pub fn conv_bwd_weights(desc: &ConvolutionDesc, src: &Memory, diff_dst: &Memory, diff_weights: &Memory) -> Result<()> {
    let g = *desc.geometry();
    check_shape(src, g.src_shape())?;
    check_shape(diff_dst, g.dst_shape())?;
    check_shape(diff_weights, g.weights_shape())?;
    check_output("diff_weights", diff_weights, [("src", src), ("diff_dst", diff_dst)])?;

    let values: Vec<f32> = {
        let src_guard = src.read()?;
        let dd_guard = diff_dst.read()?;
        let src_data = physical("src", src.desc(), typed::<f32>(&src_guard)?)?;
        let dd_data = physical("diff_dst", diff_dst.desc(), typed::<f32>(&dd_guard)?)?;
        let (src_desc, dd_desc) = (src.desc(), diff_dst.desc());
        let (icg, ocg) = (g.ic_per_group(), g.oc_per_group());
        let per_tap = g.kh * g.kw;

        (0..g.groups * ocg * icg * per_tap)
            .into_par_iter()
            .map(|i| {
                let (rest, kx) = (i / g.kw, i % g.kw);
                let (rest, ky) = (rest / g.kh, rest % g.kh);
                let (rest, ic) = (rest / icg, rest % icg);
                let (grp, oc) = (rest / ocg, rest % ocg);
                let mut acc = 0.0f32;
                for n in 0..g.mb {
                    for oy in 0..g.oh {
                        let Some(iy) = source(oy, ky, g.strides[0], g.padding_l[0], g.ih) else {
                            continue;
                        };
                        for ox in 0..g.ow {
                            let Some(ix) = source(ox, kx, g.strides[1], g.padding_l[1], g.iw) else {
                                continue;
                            };
                            let d = ((n * g.oc + grp * ocg + oc) * g.oh + oy) * g.ow + ox;
                            let s = ((n * g.ic + grp * icg + ic) * g.ih + iy) * g.iw + ix;
                            acc += dd_data[dd_desc.offset(d)] * src_data[src_desc.offset(s)];
                        }
                    }
                }
                acc
            })
            .collect()
    };

    write_out("diff_weights", diff_weights, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{Algorithm, PaddingKind};
    use vole_core::{DType, Engine, MemoryFormat};

    fn md(dims: Vec<usize>, format: MemoryFormat) -> MemoryDesc {
        MemoryDesc::new(dims, DType::F32, format).unwrap()
    }

    fn bwd_desc(pad: usize, pad_r: usize, oh: usize) -> (MemoryDesc, MemoryDesc, MemoryDesc, ConvolutionDesc) {
        let src = md(vec![1, 1, 3, 3], MemoryFormat::Nchw);
        let w = md(vec![1, 1, 2, 2], MemoryFormat::Oihw);
        let dst = md(vec![1, 1, oh, oh], MemoryFormat::Nchw);
        let desc = ConvolutionDesc::backward_data(
            Algorithm::Direct,
            &src,
            &w,
            &dst,
            [1, 1],
            [pad, pad],
            [pad_r, pad_r],
            PaddingKind::Zero,
        )
        .unwrap();
        (src, w, dst, desc)
    }

    #[test]
    fn test_bwd_data_counts_window_coverage() {
        // all-ones diff_dst and weights: each input pixel sums the number of
        // windows that cover it
        let (src, w, dst, desc) = bwd_desc(0, 0, 2);
        let engine = Engine::cpu();
        let dd = Memory::from_logical(dst, &engine, &[1.0f32; 4]).unwrap();
        let wm = Memory::from_logical(w, &engine, &[1.0f32; 4]).unwrap();
        let ds = Memory::new(src, &engine).unwrap();
        conv_bwd_data(&desc, &dd, &wm, &ds).unwrap();
        assert_eq!(
            ds.to_logical_vec::<f32>().unwrap(),
            vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]
        );
    }

    #[test]
    fn test_fwd_single_tap() {
        // 1x1 kernel of weight 2 doubles the image
        let engine = Engine::cpu();
        let src = md(vec![1, 1, 2, 2], MemoryFormat::Nchw);
        let w = md(vec![1, 1, 1, 1], MemoryFormat::Oihw);
        let dst = md(vec![1, 1, 2, 2], MemoryFormat::Nhwc);
        let desc = ConvolutionDesc::forward(
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
        let s = Memory::from_logical(src, &engine, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let wm = Memory::from_logical(w, &engine, &[2.0f32]).unwrap();
        let d = Memory::new(dst, &engine).unwrap();
        conv_fwd(&desc, &s, &wm, &d).unwrap();
        assert_eq!(d.to_logical_vec::<f32>().unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_bwd_weights_sums_products() {
        // 1x1 kernel: diff_w = Σ src * diff_dst
        let engine = Engine::cpu();
        let src = md(vec![2, 1, 1, 2], MemoryFormat::Nchw);
        let w = md(vec![1, 1, 1, 1], MemoryFormat::Oihw);
        let dst = md(vec![2, 1, 1, 2], MemoryFormat::Nchw);
        let desc = ConvolutionDesc::backward_weights(
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
        let s = Memory::from_logical(src, &engine, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let dd = Memory::from_logical(dst, &engine, &[1.0f32, 1.0, 2.0, 0.5]).unwrap();
        let dw = Memory::new(w, &engine).unwrap();
        conv_bwd_weights(&desc, &s, &dd, &dw).unwrap();
        assert_eq!(dw.get::<f32>(0).unwrap(), 1.0 + 2.0 + 6.0 + 2.0);
    }

    #[test]
    fn test_bwd_data_skips_padding_taps() {
        // pad 1 both sides with kernel 2 gives 4x4 outputs; only taps that
        // land on real pixels contribute, so each pixel sees all 4 taps
        let (src, w, dst, desc) = bwd_desc(1, 1, 4);
        let engine = Engine::cpu();
        let dd = Memory::from_logical(dst, &engine, &[1.0f32; 16]).unwrap();
        let wm = Memory::from_logical(w, &engine, &[1.0f32; 4]).unwrap();
        let ds = Memory::new(src, &engine).unwrap();
        conv_bwd_data(&desc, &dd, &wm, &ds).unwrap();
        assert_eq!(ds.to_logical_vec::<f32>().unwrap(), vec![4.0; 9]);
    }

    #[test]
    fn test_aliasing_rejected() {
        // 1x1 kernel keeps the spatial size, so diff_dst and diff_src
        // have the same shape and one buffer could stand in for both
        let engine = Engine::cpu();
        let act = md(vec![1, 1, 2, 2], MemoryFormat::Nchw);
        let w = md(vec![1, 1, 1, 1], MemoryFormat::Oihw);
        let desc = ConvolutionDesc::backward_data(
            Algorithm::Direct,
            &act,
            &w,
            &act,
            [1, 1],
            [0, 0],
            [0, 0],
            PaddingKind::Zero,
        )
        .unwrap();
        let buf = Memory::new(act, &engine).unwrap();
        let wm = Memory::new(w, &engine).unwrap();
        let e = conv_bwd_data(&desc, &buf, &wm, &buf.clone());
        assert!(matches!(
            e,
            Err(Error::AliasedBuffers {
                output: "diff_src",
                input: "diff_dst"
            })
        ));
    }
}
