// Effective right padding
//
// Callers state input, kernel, stride, left padding and the output size they
// expect. The forward output-size equation
//
//     output = (input + pad_l + pad_r - kernel) / stride + 1
//
// only holds for certain right paddings, and the nominal value a caller
// passes (usually the same as the left padding) is often too small. For
// example input 4, kernel 3, stride 1, no padding, declared output 4 needs
// pad_r = 2.
//
// The search widens pad_r one step at a time. It terminates: the output
// size is non-decreasing in pad_r, grows by at most one per step (floor of
// x / stride with x increasing by one), and is unbounded, so it hits every
// target at or above its starting value. A target below the starting value
// cannot be reached by widening and is reported as an error.
//
// A padded extent smaller than the kernel has no complete window, which
// counts as zero outputs.

use vole_core::error::{Error, Result};

/// Forward output size along one axis.
pub fn output_size(input: usize, kernel: usize, stride: usize, pad_l: usize, pad_r: usize) -> usize {
    let padded = input + pad_l + pad_r;
    if padded < kernel || stride == 0 {
        return 0;
    }
    (padded - kernel) / stride + 1
}

/// Widen `pad_r` until the output size along `axis` equals `output`.
pub fn effective_padding_r(
    axis: usize,
    input: usize,
    kernel: usize,
    stride: usize,
    pad_l: usize,
    pad_r: usize,
    output: usize,
) -> Result<usize> {
    if stride == 0 {
        return Err(Error::InvalidDescriptor(format!("stride on axis {} is zero", axis)));
    }
    let start = output_size(input, kernel, stride, pad_l, pad_r);
    if start > output {
        return Err(Error::OutputSizeUnreachable {
            axis,
            declared: output,
            computed: start,
        });
    }
    let mut pad_r = pad_r;
    while output_size(input, kernel, stride, pad_l, pad_r) < output {
        pad_r += 1;
    }
    Ok(pad_r)
}

/// Effective right padding for both spatial axes (h, w).
pub fn effective_padding(
    input: [usize; 2],
    kernel: [usize; 2],
    stride: [usize; 2],
    pad_l: [usize; 2],
    pad_r: [usize; 2],
    output: [usize; 2],
) -> Result<[usize; 2]> {
    let h = effective_padding_r(0, input[0], kernel[0], stride[0], pad_l[0], pad_r[0], output[0])?;
    let w = effective_padding_r(1, input[1], kernel[1], stride[1], pad_l[1], pad_r[1], output[1])?;
    Ok([h, w])
}
