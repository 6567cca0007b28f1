use crate::dtype::DType;

/// A host buffer holding the *physical* elements of one tensor.
///
/// The length is the descriptor's physical extent, which may exceed the
/// logical element count when the format pads or blocks dimensions.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    F16(Vec<half::f16>),
    BF16(Vec<half::bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Storage {
    /// Allocate `len` zero-initialized elements of `dtype`.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F16 => Storage::F16(vec![half::f16::ZERO; len]),
            DType::BF16 => Storage::BF16(vec![half::bf16::ZERO; len]),
            DType::F32 => Storage::F32(vec![0.0; len]),
            DType::F64 => Storage::F64(vec![0.0; len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Storage::F16(_) => DType::F16,
            Storage::BF16(_) => DType::BF16,
            Storage::F32(_) => DType::F32,
            Storage::F64(_) => DType::F64,
        }
    }

    /// Number of physical elements.
    pub fn len(&self) -> usize {
        match self {
            Storage::F16(v) => v.len(),
            Storage::BF16(v) => v.len(),
            Storage::F32(v) => v.len(),
            Storage::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one physical element as f64.
    pub fn get_f64(&self, offset: usize) -> Option<f64> {
        match self {
            Storage::F16(v) => v.get(offset).map(|x| x.to_f32() as f64),
            Storage::BF16(v) => v.get(offset).map(|x| x.to_f32() as f64),
            Storage::F32(v) => v.get(offset).map(|&x| x as f64),
            Storage::F64(v) => v.get(offset).copied(),
        }
    }

    /// Write one physical element from f64. Returns false when out of range.
    pub fn set_f64(&mut self, offset: usize, value: f64) -> bool {
        match self {
            Storage::F16(v) => v.get_mut(offset).map(|x| *x = half::f16::from_f64(value)),
            Storage::BF16(v) => v
                .get_mut(offset)
                .map(|x| *x = half::bf16::from_f64(value)),
            Storage::F32(v) => v.get_mut(offset).map(|x| *x = value as f32),
            Storage::F64(v) => v.get_mut(offset).map(|x| *x = value),
        }
        .is_some()
    }

    /// Copy every physical element to f64, in physical order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Storage::F16(v) => v.iter().map(|x| x.to_f32() as f64).collect(),
            Storage::BF16(v) => v.iter().map(|x| x.to_f32() as f64).collect(),
            Storage::F32(v) => v.iter().map(|&x| x as f64).collect(),
            Storage::F64(v) => v.clone(),
        }
    }
}
