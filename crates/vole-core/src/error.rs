use crate::dtype::DType;
use crate::engine::Engine;
use crate::format::MemoryFormat;
use crate::shape::Shape;

/// All errors that can occur within vole.
///
/// Each variant belongs to one [`ErrorCategory`]: descriptor construction,
/// primitive-descriptor resolution, or execution (instantiation and stream
/// work). Verification mismatches are not errors; the harness reports them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between a bound tensor and what a descriptor requires.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// DType mismatch between operands.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// A shape with a zero-sized dimension, or no dimensions where some are needed.
    #[error("invalid shape {shape}: {reason}")]
    InvalidShape { shape: Shape, reason: String },

    /// The memory format cannot describe a tensor of this shape.
    #[error("format {format} is incompatible with shape {shape}: {reason}")]
    IncompatibleFormat {
        format: MemoryFormat,
        shape: Shape,
        reason: String,
    },

    /// A bound tensor's format differs from the resolved one.
    #[error("format mismatch: expected {expected}, got {got}")]
    FormatMismatch {
        expected: MemoryFormat,
        got: MemoryFormat,
    },

    /// Logical index outside `[0, elem_count)`.
    #[error("logical index {index} out of range for {count} elements")]
    IndexOutOfRange { index: usize, count: usize },

    /// Group count does not evenly partition a channel count.
    #[error("{groups} groups do not evenly partition {channels} {role} channels")]
    InvalidGroups {
        groups: usize,
        channels: usize,
        role: &'static str,
    },

    /// Malformed operation hyperparameters (zero stride, bad padding rank, ...).
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The engine has no implementation of the requested algorithm.
    #[error("algorithm {algorithm} is not supported on engine {engine}")]
    UnsupportedAlgorithm { algorithm: String, engine: Engine },

    /// The engine has no implementation for this element type.
    #[error("dtype {dtype} is not supported by {operation} on engine {engine}")]
    UnsupportedDType {
        dtype: DType,
        operation: &'static str,
        engine: Engine,
    },

    /// Declared output size does not follow from input, kernel, stride and padding.
    #[error(
        "output size mismatch on axis {axis}: declared {declared}, \
         padding {pad_l}/{pad_r} gives {computed}"
    )]
    OutputSizeMismatch {
        axis: usize,
        declared: usize,
        computed: usize,
        pad_l: usize,
        pad_r: usize,
    },

    /// No amount of extra right padding yields the declared output size.
    #[error(
        "output size {declared} unreachable on axis {axis}: \
         nominal padding already yields {computed}"
    )]
    OutputSizeUnreachable {
        axis: usize,
        declared: usize,
        computed: usize,
    },

    /// A dependent primitive descriptor disagrees with the forward descriptor it was given.
    #[error("forward hint mismatch: {0}")]
    HintMismatch(String),

    /// Operands are bound to different engines.
    #[error("engine mismatch: expected {expected}, got {got}")]
    EngineMismatch { expected: Engine, got: Engine },

    /// Engine index does not exist for this kind.
    #[error("no engine {engine}: {available} available")]
    EngineUnavailable { engine: Engine, available: usize },

    /// The bound buffer is smaller than the descriptor's physical extent.
    #[error("insufficient extent for {role}: required {required} elements, buffer has {got}")]
    InsufficientExtent {
        role: &'static str,
        required: usize,
        got: usize,
    },

    /// An output buffer is also bound as an input of the same primitive.
    #[error("{output} aliases {input}: a primitive may not read and write the same buffer")]
    AliasedBuffers {
        output: &'static str,
        input: &'static str,
    },

    /// Work submitted to a stream failed; surfaced by `Stream::wait`.
    #[error("primitive {primitive} failed: {reason}")]
    ExecutionFailed { primitive: String, reason: String },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

/// Which stage of the execution model an error comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed shapes, layouts, or group partitions.
    Construction,
    /// Engine capability, dtype or shape consistency checks on descriptors.
    Resolution,
    /// Instantiation, allocation, and queued execution.
    Execution,
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::RankMismatch { .. }
            | Error::InvalidShape { .. }
            | Error::IncompatibleFormat { .. }
            | Error::IndexOutOfRange { .. }
            | Error::InvalidGroups { .. }
            | Error::InvalidDescriptor(_)
            | Error::EngineUnavailable { .. } => ErrorCategory::Construction,
            Error::UnsupportedAlgorithm { .. }
            | Error::UnsupportedDType { .. }
            | Error::OutputSizeMismatch { .. }
            | Error::OutputSizeUnreachable { .. }
            | Error::DTypeMismatch { .. }
            | Error::HintMismatch(_) => ErrorCategory::Resolution,
            Error::ShapeMismatch { .. }
            | Error::FormatMismatch { .. }
            | Error::EngineMismatch { .. }
            | Error::InsufficientExtent { .. }
            | Error::AliasedBuffers { .. }
            | Error::ExecutionFailed { .. }
            | Error::Msg(_) => ErrorCategory::Execution,
        }
    }
}

/// Convenience Result type used throughout vole.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
