//! # vole
//!
//! Tensor memory descriptors, convolution primitives, and a harness that
//! verifies those primitives against brute-force references.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ```rust
//! use vole::prelude::*;
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `vole-core` | MemoryDesc and formats, Engine, Memory, Primitive, Stream |
//! | `vole-conv` | Convolution descriptors, primitive descriptors, primitives, reference |
//!
//! ## Modules
//!
//! - [`harness`] — case catalog, seeded fill, tolerance comparison, runners

/// Re-export core types.
pub use vole_core::{
    bail, BlockSpec, BlockingDesc, DType, Engine, EngineKind, Error, ErrorCategory, Execute, Memory,
    MemoryDesc, MemoryFormat, Primitive, Result, Shape, Storage, Stream, StreamKind,
    WithDType,
};

/// Re-export convolution.
pub mod conv {
    pub use vole_conv::*;
}

/// Verification harness — drive primitives through the execution model and
/// compare against the reference computer.
pub mod harness;

/// Convenience imports.
pub mod prelude {
    pub use crate::conv::{
        reference, Algorithm, ConvolutionBackwardData, ConvolutionBackwardDataPrimitiveDesc,
        ConvolutionBackwardWeights, ConvolutionBackwardWeightsPrimitiveDesc, ConvolutionDesc,
        ConvolutionForward, ConvolutionForwardPrimitiveDesc, Direction, PaddingKind,
    };
    pub use crate::harness::{
        run_backward_data_case, run_backward_weights_case, run_case, run_forward_case, CaseReport,
        ConvCase, ConvFormats, ConvSizes, FillDistribution, HarnessConfig,
    };
    pub use crate::{
        DType, Engine, Error, Memory, MemoryDesc, MemoryFormat, Primitive, Result, Stream, StreamKind,
    };
}
