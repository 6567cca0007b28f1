// Integration tests for construction, resolution and instantiation errors

use vole::harness::{cases, case_desc, resolve_backward_data, resolve_forward};
use vole::prelude::*;
use vole::ErrorCategory;

fn concrete() -> ConvCase {
    ConvCase::dense("concrete", cases::CONCRETE)
}

// Resolution

#[test]
fn test_winograd_rejected() {
    let case = concrete().with_algorithm(Algorithm::Winograd);
    let err = run_backward_data_case(&case, &Engine::cpu(), &HarnessConfig::default()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm { .. }));
    assert_eq!(err.category(), ErrorCategory::Resolution);
}

#[test]
fn test_bad_group_partition() {
    let mut sizes = cases::CONCRETE;
    sizes.ng = 3;
    sizes.oc = 6;
    // ic = 4 is not a multiple of 3; the weights desc itself is still valid
    let case = ConvCase::dense("bad_groups", sizes);
    let err = resolve_forward(&case, &Engine::cpu()).unwrap_err();
    assert!(matches!(err, Error::InvalidGroups { groups: 3, .. }));
    assert_eq!(err.category(), ErrorCategory::Construction);
}

#[test]
fn test_zero_groups_rejected() {
    let mut sizes = cases::CONCRETE;
    sizes.ng = 0;
    let case = ConvCase::dense("no_groups", sizes);
    let err = run_backward_data_case(&case, &Engine::cpu(), &HarnessConfig::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidGroups { groups: 0, .. }));
    assert_eq!(err.category(), ErrorCategory::Construction);
}

#[test]
fn test_unreachable_output_size() {
    let mut sizes = cases::CONCRETE;
    sizes.oh = 2;
    let err = case_desc(&ConvCase::dense("small_oh", sizes), Direction::BackwardData).unwrap_err();
    assert!(matches!(
        err,
        Error::OutputSizeUnreachable {
            axis: 0,
            declared: 2,
            computed: 3
        }
    ));
    assert_eq!(err.category(), ErrorCategory::Resolution);
}

#[test]
fn test_nominal_padding_rejected_without_widening() -> vole::Result<()> {
    // the descriptor states the nominal right padding; resolution checks it
    let case = ConvCase::dense("widened", cases::WIDENED);
    let src = case.src_desc()?;
    let weights = case.weights_desc()?;
    let dst = case.dst_desc()?;
    let desc = ConvolutionDesc::forward(
        Algorithm::Direct,
        &src,
        &weights,
        &dst,
        [1, 1],
        [0, 0],
        [0, 0],
        PaddingKind::Zero,
    )?;
    let err = ConvolutionForwardPrimitiveDesc::new(&desc, &Engine::cpu()).unwrap_err();
    assert!(matches!(
        err,
        Error::OutputSizeMismatch {
            declared: 4,
            computed: 2,
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_f64_rejected() -> vole::Result<()> {
    let case = concrete();
    let src = case.src_desc()?.with_dtype(DType::F64);
    let weights = case.weights_desc()?.with_dtype(DType::F64);
    let dst = case.dst_desc()?.with_dtype(DType::F64);
    let desc = ConvolutionDesc::forward(
        Algorithm::Direct,
        &src,
        &weights,
        &dst,
        [1, 1],
        [0, 0],
        [0, 0],
        PaddingKind::Zero,
    )?;
    let err = ConvolutionForwardPrimitiveDesc::new(&desc, &Engine::cpu()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedDType { dtype: DType::F64, .. }));
    Ok(())
}

#[test]
fn test_mixed_dtypes_rejected() -> vole::Result<()> {
    let case = concrete();
    let desc = ConvolutionDesc::backward_data(
        Algorithm::Direct,
        &case.src_desc()?,
        &case.weights_desc()?.with_dtype(DType::BF16),
        &case.dst_desc()?,
        [1, 1],
        [0, 0],
        [0, 0],
        PaddingKind::Zero,
    )?;
    let hint = resolve_forward(&case, &Engine::cpu())?;
    let err = ConvolutionBackwardDataPrimitiveDesc::new(&desc, &Engine::cpu(), &hint).unwrap_err();
    assert!(matches!(err, Error::DTypeMismatch { .. }));
    Ok(())
}

#[test]
fn test_hint_with_other_strides_rejected() -> vole::Result<()> {
    let engine = Engine::cpu();
    let hint = resolve_forward(&concrete(), &engine)?;

    // stride 2 on the same input gives a 2x2 output
    let mut sizes = cases::CONCRETE;
    sizes.strh = 2;
    sizes.strw = 2;
    sizes.oh = 2;
    sizes.ow = 2;
    let other = ConvCase::dense("strided", sizes);
    let desc = case_desc(&other, Direction::BackwardData)?;
    let err = ConvolutionBackwardDataPrimitiveDesc::new(&desc, &engine, &hint).unwrap_err();
    assert!(matches!(err, Error::HintMismatch(_)));
    Ok(())
}

#[test]
fn test_hint_with_other_formats_rejected() -> vole::Result<()> {
    let engine = Engine::cpu();
    let hint = resolve_forward(&concrete(), &engine)?;
    let other = concrete().with_formats(ConvFormats::new(
        MemoryFormat::Nhwc,
        MemoryFormat::Oihw,
        MemoryFormat::Nchw,
    ));
    let desc = case_desc(&other, Direction::BackwardData)?;
    let err = ConvolutionBackwardDataPrimitiveDesc::new(&desc, &engine, &hint).unwrap_err();
    assert!(matches!(err, Error::HintMismatch(_)));
    Ok(())
}

// Construction

#[test]
fn test_incompatible_blocked_weights() {
    let case = concrete().with_formats(ConvFormats::new(
        MemoryFormat::Nchw,
        MemoryFormat::OIhw8i8o,
        MemoryFormat::Nchw,
    ));
    let err = case.weights_desc().unwrap_err();
    assert!(matches!(err, Error::IncompatibleFormat { .. }));
    assert_eq!(err.category(), ErrorCategory::Construction);
}

#[test]
fn test_engine_index_checked() {
    assert!(matches!(
        Engine::new(vole::EngineKind::Cpu, 1),
        Err(Error::EngineUnavailable { available: 1, .. })
    ));
}

// Instantiation

struct Bound {
    pd: ConvolutionBackwardDataPrimitiveDesc,
    diff_dst: Memory,
    weights: Memory,
    diff_src: Memory,
}

fn bound() -> vole::Result<Bound> {
    let engine = Engine::cpu();
    let pd = resolve_backward_data(&concrete(), &engine)?;
    Ok(Bound {
        diff_dst: Memory::new(pd.diff_dst_desc().clone(), &engine)?,
        weights: Memory::new(pd.weights_desc().clone(), &engine)?,
        diff_src: Memory::new(pd.diff_src_desc().clone(), &engine)?,
        pd,
    })
}

#[test]
fn test_instantiate_ok() -> vole::Result<()> {
    let b = bound()?;
    let prim = ConvolutionBackwardData::new(&b.pd, &b.diff_dst, &b.weights, &b.diff_src)?;
    let prim = Primitive::from(prim);
    assert_eq!(prim.name(), "convolution_backward_data");
    assert!(prim.outputs()[0].same_buffer(&b.diff_src));
    Ok(())
}

#[test]
fn test_wrong_format_at_instantiation() -> vole::Result<()> {
    let b = bound()?;
    let nhwc = MemoryDesc::new(b.pd.diff_src_desc().shape().clone(), DType::F32, MemoryFormat::Nhwc)?;
    let diff_src = Memory::new(nhwc, &Engine::cpu())?;
    let err = ConvolutionBackwardData::new(&b.pd, &b.diff_dst, &b.weights, &diff_src).unwrap_err();
    assert!(matches!(err, Error::FormatMismatch { .. }));
    Ok(())
}

#[test]
fn test_wrong_shape_at_instantiation() -> vole::Result<()> {
    let b = bound()?;
    let diff_src = Memory::new(MemoryDesc::new((2, 4, 6, 6), DType::F32, MemoryFormat::Nchw)?, &Engine::cpu())?;
    let err = ConvolutionBackwardData::new(&b.pd, &b.diff_dst, &b.weights, &diff_src).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert_eq!(err.category(), ErrorCategory::Execution);
    Ok(())
}

#[test]
fn test_short_buffer_at_instantiation() -> vole::Result<()> {
    let b = bound()?;
    let short = Memory::from_vec(b.pd.weights_desc().clone(), &Engine::cpu(), vec![0.0f32; 10])?;
    let err = ConvolutionBackwardData::new(&b.pd, &b.diff_dst, &short, &b.diff_src).unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientExtent {
            role: "weights",
            required: 144,
            got: 10
        }
    ));
    Ok(())
}

#[test]
fn test_aliased_output_rejected() -> vole::Result<()> {
    // 1x1 kernel, stride 1: diff_dst and diff_src share a descriptor
    let sizes = ConvSizes {
        mb: 1,
        ng: 1,
        ic: 4,
        ih: 3,
        iw: 3,
        oc: 4,
        oh: 3,
        ow: 3,
        kh: 1,
        kw: 1,
        padh: 0,
        padw: 0,
        strh: 1,
        strw: 1,
    };
    let engine = Engine::cpu();
    let pd = resolve_backward_data(&ConvCase::dense("pointwise", sizes), &engine)?;
    let buf = Memory::new(pd.diff_src_desc().clone(), &engine)?;
    let weights = Memory::new(pd.weights_desc().clone(), &engine)?;
    let err = ConvolutionBackwardData::new(&pd, &buf, &weights, &buf).unwrap_err();
    assert!(matches!(
        err,
        Error::AliasedBuffers {
            output: "diff_src",
            input: "diff_dst"
        }
    ));
    Ok(())
}

// Execution

#[test]
fn test_resized_buffer_fails_at_wait() -> vole::Result<()> {
    // a buffer that shrinks after instantiation is caught when the
    // primitive runs and reported by wait
    let b = bound()?;
    let prim = ConvolutionBackwardData::new(&b.pd, &b.diff_dst, &b.weights, &b.diff_src)?;
    *b.weights.write()? = vole::Storage::zeros(DType::F32, 3);

    let stream = Stream::new(StreamKind::Lazy)?;
    stream.submit([Primitive::from(prim)])?;
    let err = stream.wait().unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed { .. }));
    assert!(err.to_string().contains("convolution_backward_data"));
    // reported once
    stream.wait()?;
    Ok(())
}
