use std::fmt;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::Result;
use crate::memory::Memory;

// Primitive — An executable, engine-bound operation instance
//
// A Primitive is the last immutable stage before execution: a resolved
// primitive descriptor with concrete tensors bound to it. Operation crates
// implement `Execute` for their bound form and wrap it with
// `Primitive::new`; streams only ever see the type-erased handle.
//
// Instantiation is where shape, dtype, format, extent and aliasing checks
// happen, so `execute` can assume its operands are consistent. A
// `Primitive` has no public way to run; it only runs once submitted to a
// `Stream`.

/// The behavior every bound operation provides to a stream.
pub trait Execute: Send + Sync + fmt::Debug {
    /// Short operation name, e.g. "convolution_backward_data".
    fn name(&self) -> &str;

    /// The engine all operands are bound to.
    fn engine(&self) -> &Engine;

    /// Tensors the operation writes.
    fn outputs(&self) -> Vec<&Memory>;

    /// Run the operation to completion on the calling thread.
    ///
    /// Streams call this when the primitive reaches the head of their
    /// queue; submit a [`Primitive`] rather than calling it directly.
    fn execute(&self) -> Result<()>;
}

/// A type-erased, cheaply clonable executable operation.
#[derive(Clone)]
pub struct Primitive {
    op: Arc<dyn Execute>,
}

impl Primitive {
    pub fn new(op: impl Execute + 'static) -> Self {
        Primitive { op: Arc::new(op) }
    }

    pub fn name(&self) -> &str {
        self.op.name()
    }

    pub fn engine(&self) -> &Engine {
        self.op.engine()
    }

    pub fn outputs(&self) -> Vec<&Memory> {
        self.op.outputs()
    }

    /// Run synchronously. Only a `Stream` runs primitives.
    pub(crate) fn execute(&self) -> Result<()> {
        self.op.execute()
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primitive({:?})", self.op)
    }
}
