//! # vole-core
//!
//! Memory model and execution scaffolding for vole.
//!
//! This crate provides:
//! - [`MemoryDesc`] — logical shape + dtype + physical [`MemoryFormat`], with
//!   the logical-index → physical-offset mapping every consumer goes through
//! - [`Engine`] — capability token for a compute device
//! - [`Memory`] — a descriptor bound to an engine and backed by a buffer
//! - [`Primitive`] / [`Execute`] — type-erased executable operations
//! - [`Stream`] — ordered (eager or lazy) execution queue
// - Shape: logical N-d extent, unravel/ravel of flat indices
// - DType / WithDType: element types and their typed buffer access
// - Storage: the physical buffer enum behind a Memory
// - Error: one error enum, classified by ErrorCategory

pub mod dtype;
pub mod engine;
pub mod error;
pub mod format;
pub mod memory;
pub mod memory_desc;
pub mod primitive;
pub mod shape;
pub mod storage;
pub mod stream;

pub use dtype::{DType, WithDType};
pub use engine::{Engine, EngineKind};
pub use error::{Error, ErrorCategory, Result};
pub use format::{BlockSpec, MemoryFormat};
pub use memory::{typed, typed_mut, Memory};
pub use memory_desc::{BlockingDesc, MemoryDesc, Offsets};
pub use primitive::{Execute, Primitive};
pub use shape::Shape;
pub use storage::Storage;
pub use stream::{Stream, StreamKind};
