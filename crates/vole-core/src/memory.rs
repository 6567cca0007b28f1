use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::{DType, WithDType};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::memory_desc::MemoryDesc;
use crate::shape::Shape;
use crate::storage::Storage;

// Memory — A MemoryDesc bound to an Engine, backed by a buffer
//
// This is the unit primitives read and write. Binding a descriptor to an
// engine allocates `desc.size()` physical elements, zero-initialized, so
// padding regions of blocked formats always hold zeros.
//
// MEMORY MODEL:
//
//   The descriptor, engine and buffer live in one inner value behind an Arc.
//   Cloning a Memory clones the handle, not the data: a primitive keeps
//   handles to its operands while it sits in a stream's queue, and the
//   caller keeps its own handle to read the result after `wait()`.
//
//   The buffer sits behind a RwLock so a running primitive holds read
//   guards on its inputs and one write guard on its output. The buffer is
//   released when the last handle drops.

struct MemoryInner {
    desc: MemoryDesc,
    engine: Engine,
    storage: RwLock<Storage>,
}

/// A tensor: descriptor + engine + buffer.
#[derive(Clone)]
pub struct Memory {
    inner: Arc<MemoryInner>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Memory(shape={}, dtype={}, format={}, engine={})",
            self.inner.desc.shape(),
            self.inner.desc.dtype(),
            self.inner.desc.format(),
            self.inner.engine,
        )
    }
}

impl Memory {
    /// Allocate a zeroed buffer for `desc` on `engine`.
    pub fn new(desc: MemoryDesc, engine: &Engine) -> Result<Self> {
        let storage = Storage::zeros(desc.dtype(), desc.size());
        Ok(Self::from_parts(desc, *engine, storage))
    }

    /// Bind an existing physical buffer to `desc`.
    ///
    /// The buffer's element type must match the descriptor; its length is
    /// not checked here. Primitives check it against the extent they need
    /// when they are instantiated.
    pub fn from_vec<T: WithDType>(desc: MemoryDesc, engine: &Engine, data: Vec<T>) -> Result<Self> {
        if T::DTYPE != desc.dtype() {
            return Err(Error::DTypeMismatch {
                expected: desc.dtype(),
                got: T::DTYPE,
            });
        }
        Ok(Self::from_parts(desc, *engine, T::into_storage(data)))
    }

    /// Allocate a buffer for `desc` and fill it from logically ordered values.
    pub fn from_logical<T: WithDType>(desc: MemoryDesc, engine: &Engine, data: &[T]) -> Result<Self> {
        let mem = Self::new(desc, engine)?;
        mem.write_logical(data)?;
        Ok(mem)
    }

    fn from_parts(desc: MemoryDesc, engine: Engine, storage: Storage) -> Self {
        Memory {
            inner: Arc::new(MemoryInner {
                desc,
                engine,
                storage: RwLock::new(storage),
            }),
        }
    }

    pub fn desc(&self) -> &MemoryDesc {
        &self.inner.desc
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn shape(&self) -> &Shape {
        self.inner.desc.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.desc.dims()
    }

    pub fn dtype(&self) -> DType {
        self.inner.desc.dtype()
    }

    /// Number of logical elements.
    pub fn elem_count(&self) -> usize {
        self.inner.desc.elem_count()
    }

    /// Length of the bound buffer in elements.
    pub fn physical_len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Whether two handles refer to the same buffer.
    pub fn same_buffer(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Acquire a read lock on the buffer.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Storage>> {
        self.inner
            .storage
            .read()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    /// Acquire a write lock on the buffer.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Storage>> {
        self.inner
            .storage
            .write()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    /// Read the element at a logical flat index.
    pub fn get<T: WithDType>(&self, logical: usize) -> Result<T> {
        let offset = self.inner.desc.try_offset(logical)?;
        let guard = self.read()?;
        let data = typed(&guard)?;
        data.get(offset).copied().ok_or(Error::InsufficientExtent {
            role: "memory",
            required: offset + 1,
            got: data.len(),
        })
    }

    /// Write the element at a logical flat index.
    pub fn set<T: WithDType>(&self, logical: usize, value: T) -> Result<()> {
        let offset = self.inner.desc.try_offset(logical)?;
        let mut guard = self.write()?;
        let data = typed_mut(&mut guard)?;
        let len = data.len();
        let slot = data.get_mut(offset).ok_or(Error::InsufficientExtent {
            role: "memory",
            required: offset + 1,
            got: len,
        })?;
        *slot = value;
        Ok(())
    }

    /// Copy all logical elements out, in logical order.
    pub fn to_logical_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        let guard = self.read()?;
        let data = typed::<T>(&guard)?;
        self.check_extent(data.len())?;
        Ok(self.inner.desc.gather(data))
    }

    /// Logical elements converted to f64, in logical order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let guard = self.read()?;
        self.check_extent(guard.len())?;
        self.inner
            .desc
            .offsets()
            .map(|o| guard.get_f64(o).ok_or_else(|| Error::msg("offset out of range")))
            .collect()
    }

    /// Overwrite all logical elements from a logically ordered slice.
    pub fn write_logical<T: WithDType>(&self, data: &[T]) -> Result<()> {
        let count = self.elem_count();
        if data.len() != count {
            return Err(Error::msg(format!(
                "write_logical: expected {} elements, got {}",
                count,
                data.len()
            )));
        }
        let mut guard = self.write()?;
        let physical = typed_mut::<T>(&mut guard)?;
        self.check_extent(physical.len())?;
        self.inner.desc.scatter(data, physical);
        Ok(())
    }

    fn check_extent(&self, len: usize) -> Result<()> {
        let required = self.inner.desc.size();
        if len < required {
            return Err(Error::InsufficientExtent {
                role: "memory",
                required,
                got: len,
            });
        }
        Ok(())
    }
}

/// Borrow a storage as `&[T]`, failing on dtype mismatch.
pub fn typed<T: WithDType>(storage: &Storage) -> Result<&[T]> {
    T::slice(storage).ok_or(Error::DTypeMismatch {
        expected: T::DTYPE,
        got: storage.dtype(),
    })
}

/// Borrow a storage as `&mut [T]`, failing on dtype mismatch.
pub fn typed_mut<T: WithDType>(storage: &mut Storage) -> Result<&mut [T]> {
    let got = storage.dtype();
    T::slice_mut(storage).ok_or(Error::DTypeMismatch {
        expected: T::DTYPE,
        got,
    })
}
