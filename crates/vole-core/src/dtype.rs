use std::fmt;

use crate::storage::Storage;

// DType — Element types a buffer can hold
//
//   F16  — 16-bit IEEE half float
//   BF16 — 16-bit brain float
//   F32  — 32-bit float, the only type convolution primitives accept
//   F64  — 64-bit float
//
// Half and double storage exist so descriptors of those types can be built,
// bound, filled and compared; primitive resolution then rejects them with
// an UnsupportedDType error instead of silently converting.

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::BF16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — Trait that connects Rust types to DType enum
//
// Besides the DType tag and f64 conversions, each implementor knows which
// Storage variant holds it, so typed access to a buffer is a single match:
//
//   let data: &[f32] = f32::slice(&storage)?;

/// Trait implemented by Rust types that can be stored in a tensor buffer.
pub trait WithDType:
    Copy + Send + Sync + 'static + num_traits::NumCast + fmt::Debug + PartialEq
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// Borrow the storage as a typed slice, if it holds this type.
    fn slice(storage: &Storage) -> Option<&[Self]>;

    /// Mutably borrow the storage as a typed slice, if it holds this type.
    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]>;

    /// Wrap a typed vector as storage.
    fn into_storage(data: Vec<Self>) -> Storage;
}

macro_rules! with_dtype {
    ($ty:ty, $variant:ident, $to:expr, $from:expr) => {
        impl WithDType for $ty {
            const DTYPE: DType = DType::$variant;

            fn to_f64(self) -> f64 {
                $to(self)
            }

            fn from_f64(v: f64) -> Self {
                $from(v)
            }

            fn slice(storage: &Storage) -> Option<&[Self]> {
                match storage {
                    Storage::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
                match storage {
                    Storage::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn into_storage(data: Vec<Self>) -> Storage {
                Storage::$variant(data)
            }
        }
    };
}

with_dtype!(f32, F32, |v: f32| v as f64, |v: f64| v as f32);
with_dtype!(f64, F64, |v: f64| v, |v: f64| v);
with_dtype!(
    half::f16,
    F16,
    |v: half::f16| v.to_f32() as f64,
    half::f16::from_f64
);
with_dtype!(
    half::bf16,
    BF16,
    |v: half::bf16| v.to_f32() as f64,
    half::bf16::from_f64
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::BF16.size_in_bytes(), 2);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn test_with_dtype_f32() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(f32::from_f64(3.14).to_f64(), 3.140000104904175); // f32 precision
    }

    #[test]
    fn test_typed_slices() {
        let mut s = f32::into_storage(vec![1.0, 2.0]);
        assert_eq!(f32::slice(&s), Some(&[1.0f32, 2.0][..]));
        assert!(f64::slice(&s).is_none());
        f32::slice_mut(&mut s).unwrap()[1] = 5.0;
        assert_eq!(s.to_f64_vec(), vec![1.0, 5.0]);
    }

    #[test]
    fn test_half_roundtrip() {
        let h = half::f16::from_f64(0.5);
        assert_eq!(h.to_f64(), 0.5);
        assert_eq!(half::bf16::DTYPE, DType::BF16);
    }
}
