// Built-in case catalog
//
// Sizes cover the situations a convolution implementation tends to get
// wrong: nominal padding that needs widening on the right, strides that
// skip input pixels, groups, kernels larger than the padded input, and
// channel counts that do or do not fill a SIMD block.

use vole_core::MemoryFormat;

use super::case::{ConvCase, ConvFormats, ConvSizes};

#[allow(clippy::too_many_arguments)]
const fn sizes(
    mb: usize,
    ng: usize,
    ic: usize,
    ih: usize,
    iw: usize,
    oc: usize,
    oh: usize,
    ow: usize,
    kh: usize,
    kw: usize,
    padh: usize,
    padw: usize,
    strh: usize,
    strw: usize,
) -> ConvSizes {
    ConvSizes {
        mb,
        ng,
        ic,
        ih,
        iw,
        oc,
        oh,
        ow,
        kh,
        kw,
        padh,
        padw,
        strh,
        strw,
    }
}

/// 2 images, 4 -> 4 channels, 5x5 input, 3x3 kernel, no padding.
pub const CONCRETE: ConvSizes = sizes(2, 1, 4, 5, 5, 4, 3, 3, 3, 3, 0, 0, 1, 1);

/// Output as large as the input without left padding: right padding 2.
pub const WIDENED: ConvSizes = sizes(2, 1, 4, 4, 4, 4, 4, 4, 3, 3, 0, 0, 1, 1);

/// 5x5 kernel on a 2x2 image with padding 1: no window fits until the
/// right padding grows.
pub const KERNEL_EXCEEDS_INPUT: ConvSizes = sizes(1, 1, 2, 2, 2, 3, 1, 1, 5, 5, 1, 1, 1, 1);

/// Named sizes, all with a single group unless the name says otherwise.
pub fn catalog() -> Vec<(&'static str, ConvSizes)> {
    vec![
        ("concrete", CONCRETE),
        ("simple_pad1", sizes(2, 1, 4, 4, 4, 6, 4, 4, 3, 3, 1, 1, 1, 1)),
        ("widened_pad_r", WIDENED),
        ("strided", sizes(2, 1, 4, 9, 9, 8, 4, 4, 3, 3, 0, 0, 2, 2)),
        ("strided_padded", sizes(1, 1, 3, 13, 13, 4, 7, 7, 3, 3, 1, 1, 2, 2)),
        ("rectangular", sizes(1, 1, 3, 6, 8, 5, 6, 4, 3, 2, 1, 0, 1, 2)),
        ("kernel_exceeds_input", KERNEL_EXCEEDS_INPUT),
        ("grouped", sizes(2, 2, 4, 4, 4, 6, 4, 4, 3, 3, 1, 1, 1, 1)),
        ("grouped_large", sizes(1, 2, 16, 13, 13, 32, 13, 13, 5, 5, 2, 2, 1, 1)),
    ]
}

/// Every catalog entry with row-major formats.
pub fn dense_cases() -> Vec<ConvCase> {
    catalog()
        .into_iter()
        .map(|(name, s)| ConvCase::dense(name, s))
        .collect()
}

/// Cases in SIMD-blocked formats.
///
/// Activations use nChw8c / nChw16c, which pad channels up to the block;
/// weights use the blocked formats whenever the per-group channel counts
/// divide evenly, and dense weights otherwise.
pub fn blocked_cases() -> Vec<ConvCase> {
    let blocked = [
        ("blocked8", sizes(2, 1, 8, 7, 7, 16, 7, 7, 3, 3, 1, 1, 1, 1)),
        ("blocked16", sizes(2, 1, 16, 7, 7, 16, 4, 4, 3, 3, 1, 1, 2, 2)),
        ("blocked8_grouped", sizes(1, 2, 16, 5, 5, 16, 5, 5, 3, 3, 1, 1, 1, 1)),
        ("blocked8_ragged", sizes(2, 1, 3, 6, 6, 5, 6, 6, 3, 3, 0, 0, 1, 1)),
    ];

    let mut out = Vec::new();
    for (name, s) in blocked {
        for block in [8usize, 16] {
            let act = if block == 8 {
                MemoryFormat::NChw8c
            } else {
                MemoryFormat::NChw16c
            };
            let formats = ConvFormats::new(act.clone(), blocked_weights(&s, block), act);
            out.push(ConvCase::new(format!("{}_{}c", name, block), s, formats));
        }
    }
    out
}

fn blocked_weights(s: &ConvSizes, block: usize) -> MemoryFormat {
    let (icg, ocg) = (s.ic / s.ng, s.oc / s.ng);
    let fits = icg % block == 0 && ocg % block == 0;
    match (s.ng > 1, fits, block) {
        (false, true, 8) => MemoryFormat::OIhw8i8o,
        (false, true, _) => MemoryFormat::OIhw16i16o,
        (true, true, 8) => MemoryFormat::GOihw8i8o,
        (true, true, _) => MemoryFormat::GOihw16i16o,
        (false, false, _) => MemoryFormat::Oihw,
        (true, false, _) => MemoryFormat::Goihw,
    }
}

/// The same sizes under every combination of activation and weights
/// format that can hold them.
pub fn layout_cases(name: &str, s: ConvSizes) -> Vec<ConvCase> {
    let activations = [
        MemoryFormat::Nchw,
        MemoryFormat::Nhwc,
        MemoryFormat::Chwn,
        MemoryFormat::NChw8c,
    ];
    let weights: Vec<MemoryFormat> = if s.ng > 1 {
        vec![MemoryFormat::Goihw]
    } else {
        vec![MemoryFormat::Oihw, MemoryFormat::Hwio, MemoryFormat::Ihwo]
    };

    let mut out = Vec::new();
    for src in &activations {
        for w in &weights {
            for dst in &activations {
                let formats = ConvFormats::new(src.clone(), w.clone(), dst.clone());
                out.push(ConvCase::new(
                    format!("{}_{}", name, formats),
                    s,
                    formats,
                ));
            }
        }
    }
    out
}
