// Primitive descriptors — Convolution descriptors resolved against an engine
//
// Resolution is the step between "what to compute" and "something that can
// run". It checks that the engine implements the requested algorithm and
// element type, that the operand shapes are mutually consistent, and that
// the declared output size follows from the stated padding. It also picks
// how the kernels will move data in and out of the operands:
//
//   Dense    — every operand is row-major; kernels read the physical buffer
//              directly as logical data.
//   Gathered — some operand is permuted, blocked or padded; kernels gather
//              through the descriptor's offset mapping into a logical
//              scratch buffer and scatter results back the same way.
//
// The backward directions are resolved *against* a forward primitive
// descriptor. The hint must describe the same convolution (engine,
// geometry, operand descriptors, algorithm) and its implementation choice
// is reused, so a backward pass always runs the same way as the forward
// pass it differentiates.

use vole_core::dtype::DType;
use vole_core::engine::{Engine, EngineKind};
use vole_core::error::{Error, Result};
use vole_core::memory::Memory;
use vole_core::memory_desc::MemoryDesc;

use crate::desc::{Algorithm, ConvGeometry, ConvolutionDesc, Direction};
use crate::padding::output_size;

/// How a resolved convolution moves operand data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Implementation {
    Dense,
    Gathered,
}

impl Implementation {
    fn choose(descs: [&MemoryDesc; 3]) -> Self {
        if descs.iter().all(|d| d.is_dense()) {
            Implementation::Dense
        } else {
            Implementation::Gathered
        }
    }
}

/// Checks shared by every direction; returns nothing, only fails.
fn resolve(desc: &ConvolutionDesc, engine: &Engine, operation: &'static str) -> Result<()> {
    match (engine.kind(), desc.algorithm()) {
        (EngineKind::Cpu, Algorithm::Direct) => {}
        (_, algorithm) => {
            return Err(Error::UnsupportedAlgorithm {
                algorithm: algorithm.to_string(),
                engine: *engine,
            })
        }
    }

    let dtype = desc.src_desc().dtype();
    for other in [desc.weights_desc(), desc.dst_desc()] {
        if other.dtype() != dtype {
            return Err(Error::DTypeMismatch {
                expected: dtype,
                got: other.dtype(),
            });
        }
    }
    if dtype != DType::F32 {
        return Err(Error::UnsupportedDType {
            dtype,
            operation,
            engine: *engine,
        });
    }

    let g = desc.geometry();
    if desc.src_desc().dims()[0] != desc.dst_desc().dims()[0] {
        return Err(Error::ShapeMismatch {
            expected: g.dst_shape(),
            got: desc.dst_desc().shape().clone(),
        });
    }
    let weights_shape = g.weights_shape();
    if desc.weights_desc().shape() != &weights_shape {
        return Err(Error::ShapeMismatch {
            expected: weights_shape,
            got: desc.weights_desc().shape().clone(),
        });
    }

    check_output_size(g)
}

fn check_output_size(g: &ConvGeometry) -> Result<()> {
    let axes = [(g.ih, g.kh, g.oh), (g.iw, g.kw, g.ow)];
    for (axis, &(input, kernel, declared)) in axes.iter().enumerate() {
        let (pad_l, pad_r) = (g.padding_l[axis], g.padding_r[axis]);
        let computed = output_size(input, kernel, g.strides[axis], pad_l, pad_r);
        if computed != declared {
            return Err(Error::OutputSizeMismatch {
                axis,
                declared,
                computed,
                pad_l,
                pad_r,
            });
        }
    }
    Ok(())
}

fn check_direction(desc: &ConvolutionDesc, expected: Direction) -> Result<()> {
    if desc.direction() != expected {
        return Err(Error::InvalidDescriptor(format!(
            "expected a {} descriptor, got {}",
            expected,
            desc.direction()
        )));
    }
    Ok(())
}

fn check_hint(desc: &ConvolutionDesc, engine: &Engine, hint: &ConvolutionForwardPrimitiveDesc) -> Result<()> {
    if hint.engine() != engine {
        return Err(Error::EngineMismatch {
            expected: *engine,
            got: *hint.engine(),
        });
    }
    let fwd = hint.desc();
    if fwd.algorithm() != desc.algorithm() {
        return Err(Error::HintMismatch(format!(
            "algorithm {} vs forward {}",
            desc.algorithm(),
            fwd.algorithm()
        )));
    }
    if fwd.geometry() != desc.geometry() {
        return Err(Error::HintMismatch(format!(
            "geometry {} vs forward {}",
            desc.geometry(),
            fwd.geometry()
        )));
    }
    let pairs = [
        ("src", desc.src_desc(), fwd.src_desc()),
        ("weights", desc.weights_desc(), fwd.weights_desc()),
        ("dst", desc.dst_desc(), fwd.dst_desc()),
    ];
    for (role, ours, theirs) in pairs {
        if ours != theirs {
            return Err(Error::HintMismatch(format!(
                "{} is {} {} vs forward {} {}",
                role,
                ours.shape(),
                ours.format(),
                theirs.shape(),
                theirs.format()
            )));
        }
    }
    Ok(())
}

/// Check one tensor against the descriptor a primitive was resolved with.
pub(crate) fn check_binding(role: &'static str, expected: &MemoryDesc, engine: &Engine, mem: &Memory) -> Result<()> {
    if mem.engine() != engine {
        return Err(Error::EngineMismatch {
            expected: *engine,
            got: *mem.engine(),
        });
    }
    let got = mem.desc();
    if got.shape() != expected.shape() {
        return Err(Error::ShapeMismatch {
            expected: expected.shape().clone(),
            got: got.shape().clone(),
        });
    }
    if got.dtype() != expected.dtype() {
        return Err(Error::DTypeMismatch {
            expected: expected.dtype(),
            got: got.dtype(),
        });
    }
    if got.format() != expected.format() {
        return Err(Error::FormatMismatch {
            expected: expected.format().clone(),
            got: got.format().clone(),
        });
    }
    let len = mem.physical_len()?;
    if len < expected.size() {
        return Err(Error::InsufficientExtent {
            role,
            required: expected.size(),
            got: len,
        });
    }
    Ok(())
}

/// Fail if the output shares a buffer with any input.
pub(crate) fn check_no_alias(output_role: &'static str, output: &Memory, inputs: &[(&'static str, &Memory)]) -> Result<()> {
    for &(role, input) in inputs {
        if output.same_buffer(input) {
            return Err(Error::AliasedBuffers {
                output: output_role,
                input: role,
            });
        }
    }
    Ok(())
}

/// Forward convolution resolved for an engine.
#[derive(Debug, Clone)]
pub struct ConvolutionForwardPrimitiveDesc {
    desc: ConvolutionDesc,
    engine: Engine,
    implementation: Implementation,
}

impl ConvolutionForwardPrimitiveDesc {
    pub fn new(desc: &ConvolutionDesc, engine: &Engine) -> Result<Self> {
        check_direction(desc, Direction::Forward)?;
        resolve(desc, engine, "convolution_forward")?;
        let implementation = Implementation::choose([desc.src_desc(), desc.weights_desc(), desc.dst_desc()]);
        log::debug!(
            "resolved convolution_forward {} on {} ({:?})",
            desc.geometry(),
            engine,
            implementation
        );
        Ok(ConvolutionForwardPrimitiveDesc {
            desc: desc.clone(),
            engine: *engine,
            implementation,
        })
    }

    pub fn desc(&self) -> &ConvolutionDesc {
        &self.desc
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn implementation(&self) -> Implementation {
        self.implementation
    }

    pub fn src_desc(&self) -> &MemoryDesc {
        self.desc.src_desc()
    }

    pub fn weights_desc(&self) -> &MemoryDesc {
        self.desc.weights_desc()
    }

    pub fn dst_desc(&self) -> &MemoryDesc {
        self.desc.dst_desc()
    }
}

/// Backward-data convolution resolved against its forward counterpart.
#[derive(Debug, Clone)]
pub struct ConvolutionBackwardDataPrimitiveDesc {
    desc: ConvolutionDesc,
    engine: Engine,
    hint: ConvolutionForwardPrimitiveDesc,
}

impl ConvolutionBackwardDataPrimitiveDesc {
    pub fn new(desc: &ConvolutionDesc, engine: &Engine, hint: &ConvolutionForwardPrimitiveDesc) -> Result<Self> {
        check_direction(desc, Direction::BackwardData)?;
        resolve(desc, engine, "convolution_backward_data")?;
        check_hint(desc, engine, hint)?;
        log::debug!(
            "resolved convolution_backward_data {} on {} ({:?})",
            desc.geometry(),
            engine,
            hint.implementation()
        );
        Ok(ConvolutionBackwardDataPrimitiveDesc {
            desc: desc.clone(),
            engine: *engine,
            hint: hint.clone(),
        })
    }

    pub fn desc(&self) -> &ConvolutionDesc {
        &self.desc
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The forward primitive descriptor this one was resolved against.
    pub fn hint(&self) -> &ConvolutionForwardPrimitiveDesc {
        &self.hint
    }

    pub fn implementation(&self) -> Implementation {
        self.hint.implementation()
    }

    pub fn diff_src_desc(&self) -> &MemoryDesc {
        self.desc.src_desc()
    }

    pub fn weights_desc(&self) -> &MemoryDesc {
        self.desc.weights_desc()
    }

    pub fn diff_dst_desc(&self) -> &MemoryDesc {
        self.desc.dst_desc()
    }
}

/// Backward-weights convolution resolved against its forward counterpart.
#[derive(Debug, Clone)]
pub struct ConvolutionBackwardWeightsPrimitiveDesc {
    desc: ConvolutionDesc,
    engine: Engine,
    hint: ConvolutionForwardPrimitiveDesc,
}

impl ConvolutionBackwardWeightsPrimitiveDesc {
    pub fn new(desc: &ConvolutionDesc, engine: &Engine, hint: &ConvolutionForwardPrimitiveDesc) -> Result<Self> {
        check_direction(desc, Direction::BackwardWeights)?;
        resolve(desc, engine, "convolution_backward_weights")?;
        check_hint(desc, engine, hint)?;
        log::debug!(
            "resolved convolution_backward_weights {} on {} ({:?})",
            desc.geometry(),
            engine,
            hint.implementation()
        );
        Ok(ConvolutionBackwardWeightsPrimitiveDesc {
            desc: desc.clone(),
            engine: *engine,
            hint: hint.clone(),
        })
    }

    pub fn desc(&self) -> &ConvolutionDesc {
        &self.desc
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn hint(&self) -> &ConvolutionForwardPrimitiveDesc {
        &self.hint
    }

    pub fn implementation(&self) -> Implementation {
        self.hint.implementation()
    }

    pub fn src_desc(&self) -> &MemoryDesc {
        self.desc.src_desc()
    }

    pub fn diff_weights_desc(&self) -> &MemoryDesc {
        self.desc.weights_desc()
    }

    pub fn diff_dst_desc(&self) -> &MemoryDesc {
        self.desc.dst_desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::PaddingKind;
    use vole_core::{ErrorCategory, MemoryFormat};

    struct Descs {
        src: MemoryDesc,
        weights: MemoryDesc,
        dst: MemoryDesc,
    }

    fn descs(src_fmt: MemoryFormat, w_fmt: MemoryFormat, dtype: DType) -> Descs {
        Descs {
            src: MemoryDesc::new(vec![2, 8, 5, 5], dtype, src_fmt.clone()).unwrap(),
            weights: MemoryDesc::new(vec![8, 8, 3, 3], dtype, w_fmt).unwrap(),
            dst: MemoryDesc::new(vec![2, 8, 3, 3], dtype, src_fmt).unwrap(),
        }
    }

    fn fwd(d: &Descs, algorithm: Algorithm, pad_r: [usize; 2]) -> Result<ConvolutionDesc> {
        ConvolutionDesc::forward(
            algorithm,
            &d.src,
            &d.weights,
            &d.dst,
            [1, 1],
            [0, 0],
            pad_r,
            PaddingKind::Zero,
        )
    }

    fn bwd_data(d: &Descs) -> ConvolutionDesc {
        ConvolutionDesc::backward_data(
            Algorithm::Direct,
            &d.src,
            &d.weights,
            &d.dst,
            [1, 1],
            [0, 0],
            [0, 0],
            PaddingKind::Zero,
        )
        .unwrap()
    }

    #[test]
    fn test_dense_implementation_chosen() {
        let d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F32);
        let pd = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Direct, [0, 0]).unwrap(), &Engine::cpu())
            .unwrap();
        assert_eq!(pd.implementation(), Implementation::Dense);
    }

    #[test]
    fn test_blocked_implementation_reused_by_backward() {
        let d = descs(MemoryFormat::NChw8c, MemoryFormat::OIhw8i8o, DType::F32);
        let engine = Engine::cpu();
        let fpd = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Direct, [0, 0]).unwrap(), &engine).unwrap();
        assert_eq!(fpd.implementation(), Implementation::Gathered);
        let bpd = ConvolutionBackwardDataPrimitiveDesc::new(&bwd_data(&d), &engine, &fpd).unwrap();
        assert_eq!(bpd.implementation(), Implementation::Gathered);
        assert_eq!(bpd.diff_src_desc(), fpd.src_desc());
    }

    #[test]
    fn test_winograd_unsupported_on_cpu() {
        let d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F32);
        let e = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Winograd, [0, 0]).unwrap(), &Engine::cpu())
            .unwrap_err();
        assert!(matches!(e, Error::UnsupportedAlgorithm { .. }));
        assert_eq!(e.category(), ErrorCategory::Resolution);
    }

    #[test]
    fn test_f64_unsupported() {
        let d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F64);
        let e = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Direct, [0, 0]).unwrap(), &Engine::cpu())
            .unwrap_err();
        assert!(matches!(e, Error::UnsupportedDType { dtype: DType::F64, .. }));
    }

    #[test]
    fn test_mixed_dtypes_rejected() {
        let mut d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F32);
        d.weights = d.weights.with_dtype(DType::F16);
        let e = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Direct, [0, 0]).unwrap(), &Engine::cpu())
            .unwrap_err();
        assert!(matches!(e, Error::DTypeMismatch { .. }));
    }

    #[test]
    fn test_output_size_must_hold() {
        let d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F32);
        // right padding of 1 would give 4 outputs, dst declares 3
        let e = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Direct, [1, 0]).unwrap(), &Engine::cpu())
            .unwrap_err();
        assert!(matches!(
            e,
            Error::OutputSizeMismatch {
                axis: 0,
                declared: 3,
                computed: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_weights_channels_checked() {
        let mut d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F32);
        d.weights = MemoryDesc::new(vec![8, 4, 3, 3], DType::F32, MemoryFormat::Oihw).unwrap();
        let e = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Direct, [0, 0]).unwrap(), &Engine::cpu())
            .unwrap_err();
        assert!(matches!(e, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_hint_must_match() {
        let engine = Engine::cpu();
        let d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F32);
        let fpd = ConvolutionForwardPrimitiveDesc::new(&fwd(&d, Algorithm::Direct, [0, 0]).unwrap(), &engine).unwrap();

        let other = descs(MemoryFormat::Nhwc, MemoryFormat::Oihw, DType::F32);
        let e = ConvolutionBackwardDataPrimitiveDesc::new(&bwd_data(&other), &engine, &fpd).unwrap_err();
        assert!(matches!(e, Error::HintMismatch(_)));
    }

    #[test]
    fn test_direction_checked() {
        let engine = Engine::cpu();
        let d = descs(MemoryFormat::Nchw, MemoryFormat::Oihw, DType::F32);
        let e = ConvolutionForwardPrimitiveDesc::new(&bwd_data(&d), &engine).unwrap_err();
        assert!(matches!(e, Error::InvalidDescriptor(_)));
    }
}
