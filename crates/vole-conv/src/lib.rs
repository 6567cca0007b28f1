//! # vole-conv
//!
//! 2D convolution for vole: descriptors, resolved primitive descriptors,
//! executable primitives for all three directions, and brute-force
//! reference implementations.
//!
//! Construction follows a fixed sequence of immutable stages:
//!
//! ```text
//! ConvolutionDesc ──(Engine)──▶ *PrimitiveDesc ──(Memory…)──▶ primitive ──▶ Stream
//! ```
//!
//! Backward-data and backward-weights primitive descriptors are resolved
//! against the forward primitive descriptor of the same convolution.

pub mod backward_data;
pub mod backward_weights;
pub mod desc;
pub mod forward;
pub(crate) mod kernels;
pub mod padding;
pub mod primitive_desc;
pub mod reference;

pub use backward_data::ConvolutionBackwardData;
pub use backward_weights::ConvolutionBackwardWeights;
pub use desc::{Algorithm, ConvGeometry, ConvolutionDesc, Direction, PaddingKind};
pub use forward::ConvolutionForward;
pub use padding::{effective_padding, effective_padding_r, output_size};
pub use primitive_desc::{
    ConvolutionBackwardDataPrimitiveDesc, ConvolutionBackwardWeightsPrimitiveDesc,
    ConvolutionForwardPrimitiveDesc, Implementation,
};
