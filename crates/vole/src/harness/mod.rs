// Verification harness
//
// Runs one convolution case through the full execution model and checks
// the primitive's output against the reference computer:
//
//   1. build src / weights / dst descriptors from the case
//   2. derive the effective right padding
//   3. resolve the forward primitive descriptor, then the requested
//      direction against it
//   4. allocate tensors and fill the inputs from seeded generators
//   5. instantiate the primitive, submit it on a stream, wait
//   6. run the reference into a dense tensor
//   7. compare elementwise within the configured tolerance
//   8. report
//
// Construction, resolution and execution errors propagate as `Err`; a
// numerical mismatch is a result, not an error, and lands in the report.

pub mod case;
pub mod cases;
pub mod compare;
pub mod config;
pub mod fill;

use std::fmt;

use vole_core::error::Result;
use vole_core::{DType, Engine, Memory, MemoryDesc, Primitive, Stream};
use vole_conv::{
    effective_padding, reference, ConvolutionBackwardData, ConvolutionBackwardDataPrimitiveDesc,
    ConvolutionBackwardWeights, ConvolutionBackwardWeightsPrimitiveDesc, ConvolutionDesc,
    ConvolutionForward, ConvolutionForwardPrimitiveDesc, Direction, PaddingKind,
};

pub use case::{ConvCase, ConvFormats, ConvSizes};
pub use compare::{compare, Comparison, Mismatch};
pub use config::{FillDistribution, HarnessConfig};

/// Outcome of one case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub case: String,
    pub direction: Direction,
    /// Right padding the case ran with, per spatial axis.
    pub padding_r: [usize; 2],
    pub comparison: Comparison,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.comparison.passed()
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        write!(
            f,
            "{} {} {} (padding_r {:?}): {}",
            verdict, self.direction, self.case, self.padding_r, self.comparison
        )
    }
}

/// Effective right padding for a case's sizes.
pub fn case_padding_r(case: &ConvCase) -> Result<[usize; 2]> {
    let s = &case.sizes;
    effective_padding(
        [s.ih, s.iw],
        [s.kh, s.kw],
        [s.strh, s.strw],
        [s.padh, s.padw],
        [s.padh, s.padw],
        [s.oh, s.ow],
    )
}

/// Build the convolution descriptor of a case for one direction.
pub fn case_desc(case: &ConvCase, direction: Direction) -> Result<ConvolutionDesc> {
    let src = case.src_desc()?;
    let weights = case.weights_desc()?;
    let dst = case.dst_desc()?;
    let strides = [case.sizes.strh, case.sizes.strw];
    let padding_l = [case.sizes.padh, case.sizes.padw];
    let padding_r = case_padding_r(case)?;
    let ctor = match direction {
        Direction::Forward => ConvolutionDesc::forward,
        Direction::BackwardData => ConvolutionDesc::backward_data,
        Direction::BackwardWeights => ConvolutionDesc::backward_weights,
    };
    ctor(
        case.algorithm,
        &src,
        &weights,
        &dst,
        strides,
        padding_l,
        padding_r,
        PaddingKind::Zero,
    )
}

/// Resolve a case's forward primitive descriptor.
pub fn resolve_forward(case: &ConvCase, engine: &Engine) -> Result<ConvolutionForwardPrimitiveDesc> {
    ConvolutionForwardPrimitiveDesc::new(&case_desc(case, Direction::Forward)?, engine)
}

/// Resolve a case's backward-data primitive descriptor against its forward one.
pub fn resolve_backward_data(case: &ConvCase, engine: &Engine) -> Result<ConvolutionBackwardDataPrimitiveDesc> {
    let hint = resolve_forward(case, engine)?;
    ConvolutionBackwardDataPrimitiveDesc::new(&case_desc(case, Direction::BackwardData)?, engine, &hint)
}

/// Resolve a case's backward-weights primitive descriptor against its forward one.
pub fn resolve_backward_weights(
    case: &ConvCase,
    engine: &Engine,
) -> Result<ConvolutionBackwardWeightsPrimitiveDesc> {
    let hint = resolve_forward(case, engine)?;
    ConvolutionBackwardWeightsPrimitiveDesc::new(&case_desc(case, Direction::BackwardWeights)?, engine, &hint)
}

fn allocate_filled(desc: &MemoryDesc, engine: &Engine, config: &HarnessConfig, seed: u64) -> Result<Memory> {
    let mem = Memory::new(desc.clone(), engine)?;
    fill::fill(&mem, &config.distribution, seed)?;
    Ok(mem)
}

fn dense_like(desc: &MemoryDesc, engine: &Engine) -> Result<Memory> {
    Memory::new(MemoryDesc::dense(desc.shape().clone(), DType::F32)?, engine)
}

fn run_on_stream(config: &HarnessConfig, primitive: Primitive) -> Result<()> {
    let stream = Stream::new(config.stream_kind)?;
    stream.submit([primitive])?;
    stream.wait()
}

fn report(case: &ConvCase, direction: Direction, padding_r: [usize; 2], comparison: Comparison) -> CaseReport {
    let report = CaseReport {
        case: case.to_string(),
        direction,
        padding_r,
        comparison,
    };
    if report.passed() {
        log::info!("{}", report);
    } else {
        log::warn!("{}", report);
    }
    report
}

/// Backward-data: primitive `diff_src` versus the reference.
pub fn run_backward_data_case(case: &ConvCase, engine: &Engine, config: &HarnessConfig) -> Result<CaseReport> {
    let pd = resolve_backward_data(case, engine)?;

    let diff_src = Memory::new(pd.diff_src_desc().clone(), engine)?;
    let weights = allocate_filled(pd.weights_desc(), engine, config, config.weights_seed)?;
    let diff_dst = allocate_filled(pd.diff_dst_desc(), engine, config, config.diff_dst_seed)?;

    let primitive = ConvolutionBackwardData::new(&pd, &diff_dst, &weights, &diff_src)?;
    run_on_stream(config, primitive.into())?;

    let expected = dense_like(pd.diff_src_desc(), engine)?;
    reference::conv_bwd_data(pd.desc(), &diff_dst, &weights, &expected)?;

    let comparison = compare(&expected, &diff_src, config.tolerance)?;
    Ok(report(case, Direction::BackwardData, pd.desc().padding_r(), comparison))
}

/// Forward: primitive `dst` versus the reference.
pub fn run_forward_case(case: &ConvCase, engine: &Engine, config: &HarnessConfig) -> Result<CaseReport> {
    let pd = resolve_forward(case, engine)?;

    let src = allocate_filled(pd.src_desc(), engine, config, config.src_seed)?;
    let weights = allocate_filled(pd.weights_desc(), engine, config, config.weights_seed)?;
    let dst = Memory::new(pd.dst_desc().clone(), engine)?;

    let primitive = ConvolutionForward::new(&pd, &src, &weights, &dst)?;
    run_on_stream(config, primitive.into())?;

    let expected = dense_like(pd.dst_desc(), engine)?;
    reference::conv_fwd(pd.desc(), &src, &weights, &expected)?;

    let comparison = compare(&expected, &dst, config.tolerance)?;
    Ok(report(case, Direction::Forward, pd.desc().padding_r(), comparison))
}

/// Backward-weights: primitive `diff_weights` versus the reference.
pub fn run_backward_weights_case(case: &ConvCase, engine: &Engine, config: &HarnessConfig) -> Result<CaseReport> {
    let pd = resolve_backward_weights(case, engine)?;

    let src = allocate_filled(pd.src_desc(), engine, config, config.src_seed)?;
    let diff_dst = allocate_filled(pd.diff_dst_desc(), engine, config, config.diff_dst_seed)?;
    let diff_weights = Memory::new(pd.diff_weights_desc().clone(), engine)?;

    let primitive = ConvolutionBackwardWeights::new(&pd, &src, &diff_dst, &diff_weights)?;
    run_on_stream(config, primitive.into())?;

    let expected = dense_like(pd.diff_weights_desc(), engine)?;
    reference::conv_bwd_weights(pd.desc(), &src, &diff_dst, &expected)?;

    let comparison = compare(&expected, &diff_weights, config.tolerance)?;
    Ok(report(case, Direction::BackwardWeights, pd.desc().padding_r(), comparison))
}

/// Run one case in the given direction.
pub fn run_case(case: &ConvCase, direction: Direction, engine: &Engine, config: &HarnessConfig) -> Result<CaseReport> {
    match direction {
        Direction::Forward => run_forward_case(case, engine, config),
        Direction::BackwardData => run_backward_data_case(case, engine, config),
        Direction::BackwardWeights => run_backward_weights_case(case, engine, config),
    }
}

/// Run a list of cases, stopping at the first error (not the first mismatch).
pub fn run_suite(
    cases: &[ConvCase],
    direction: Direction,
    engine: &Engine,
    config: &HarnessConfig,
) -> Result<Vec<CaseReport>> {
    let reports = cases
        .iter()
        .map(|case| run_case(case, direction, engine, config))
        .collect::<Result<Vec<_>>>()?;
    let failed = reports.iter().filter(|r| !r.passed()).count();
    log::info!(
        "{} suite: {} cases, {} failed",
        direction,
        reports.len(),
        failed
    );
    Ok(reports)
}
