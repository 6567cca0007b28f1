use vole_core::StreamKind;

/// How the harness generates input values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillDistribution {
    /// Uniform on `[low, high)`.
    Uniform { low: f32, high: f32 },
    /// Gaussian with the given mean and standard deviation.
    Normal { mean: f32, std_dev: f32 },
    /// Integers in `[-radius, radius]` divided by `2^shift`.
    ///
    /// Products and sums of such values stay exact in f32 as long as the
    /// number of accumulated terms is small, so results do not depend on
    /// summation order.
    Dyadic { radius: i32, shift: u32 },
}

impl Default for FillDistribution {
    fn default() -> Self {
        FillDistribution::Dyadic { radius: 8, shift: 3 }
    }
}

/// Configuration for running verification cases.
///
/// Each input role gets its own seed so that, for example, the weights of
/// a case stay the same when only the diff_dst seed changes.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Seed for `src` (forward, backward-weights).
    pub src_seed: u64,
    /// Seed for `weights` (forward, backward-data).
    pub weights_seed: u64,
    /// Seed for `diff_dst` (backward-data, backward-weights).
    pub diff_dst_seed: u64,
    pub distribution: FillDistribution,
    /// Largest accepted relative error (absolute for reference values near zero).
    pub tolerance: f32,
    pub stream_kind: StreamKind,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            src_seed: 1,
            weights_seed: 2,
            diff_dst_seed: 3,
            distribution: FillDistribution::default(),
            tolerance: 1e-4,
            stream_kind: StreamKind::Lazy,
        }
    }
}

impl HarnessConfig {
    /// Derive all three seeds from one base value.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.src_seed = seed;
        self.weights_seed = seed.wrapping_add(1);
        self.diff_dst_seed = seed.wrapping_add(2);
        self
    }

    pub fn with_distribution(mut self, distribution: FillDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_stream_kind(mut self, kind: StreamKind) -> Self {
        self.stream_kind = kind;
        self
    }
}
