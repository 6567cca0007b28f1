// Deterministic tensor fill
//
// Values are drawn from a seeded StdRng in logical order and written
// through the tensor's descriptor, so the same seed gives the same logical
// tensor in every format. Padding elements of blocked formats are left as
// allocated (zero).

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

use vole_core::error::{Error, Result};
use vole_core::memory::Memory;

use super::config::FillDistribution;

/// Generate `count` values from `distribution` with a fixed seed.
pub fn values(count: usize, distribution: &FillDistribution, seed: u64) -> Result<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let out = match *distribution {
        FillDistribution::Uniform { low, high } => {
            if !(low < high) {
                return Err(Error::msg(format!(
                    "uniform fill needs low < high, got [{}, {})",
                    low, high
                )));
            }
            let dist = Uniform::new(low, high);
            (0..count).map(|_| dist.sample(&mut rng)).collect()
        }
        FillDistribution::Normal { mean, std_dev } => {
            if !(std_dev >= 0.0) {
                return Err(Error::msg(format!(
                    "normal fill needs std_dev >= 0, got {}",
                    std_dev
                )));
            }
            let dist = Normal::new(mean, std_dev)
                .map_err(|e| Error::msg(format!("normal fill: {}", e)))?;
            (0..count).map(|_| dist.sample(&mut rng)).collect()
        }
        FillDistribution::Dyadic { radius, shift } => {
            if radius < 0 || shift >= 24 {
                return Err(Error::msg(format!(
                    "dyadic fill needs radius >= 0 and shift < 24, got {} and {}",
                    radius, shift
                )));
            }
            let dist = Uniform::new_inclusive(-radius, radius);
            let scale = (1u32 << shift) as f32;
            (0..count)
                .map(|_| dist.sample(&mut rng) as f32 / scale)
                .collect()
        }
    };
    Ok(out)
}

/// Overwrite every logical element of an f32 tensor with seeded values.
pub fn fill(mem: &Memory, distribution: &FillDistribution, seed: u64) -> Result<()> {
    let data = values(mem.elem_count(), distribution, seed)?;
    mem.write_logical(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vole_core::{DType, Engine, MemoryDesc, MemoryFormat};

    #[test]
    fn test_same_seed_same_values() {
        let d = FillDistribution::default();
        assert_eq!(values(32, &d, 7).unwrap(), values(32, &d, 7).unwrap());
        assert_ne!(values(32, &d, 7).unwrap(), values(32, &d, 8).unwrap());
    }

    #[test]
    fn test_uniform_range() {
        let d = FillDistribution::Uniform {
            low: -0.5,
            high: 0.5,
        };
        assert!(values(1000, &d, 1)
            .unwrap()
            .iter()
            .all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn test_dyadic_grid() {
        let d = FillDistribution::Dyadic { radius: 8, shift: 3 };
        for v in values(500, &d, 3).unwrap() {
            assert!((-1.0..=1.0).contains(&v));
            assert_eq!((v * 8.0).fract(), 0.0);
        }
    }

    #[test]
    fn test_bad_parameters() {
        let d = FillDistribution::Uniform { low: 1.0, high: 1.0 };
        assert!(values(4, &d, 0).is_err());
        let d = FillDistribution::Normal {
            mean: 0.0,
            std_dev: -1.0,
        };
        assert!(values(4, &d, 0).is_err());
        let d = FillDistribution::Normal {
            mean: 0.0,
            std_dev: f32::NAN,
        };
        assert!(values(4, &d, 0).is_err());
        let d = FillDistribution::Dyadic { radius: -1, shift: 0 };
        assert!(values(4, &d, 0).is_err());
    }

    #[test]
    fn test_normal_zero_std_dev_is_constant() {
        let d = FillDistribution::Normal {
            mean: 0.25,
            std_dev: 0.0,
        };
        assert!(values(8, &d, 0).unwrap().iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_fill_is_layout_independent() {
        let engine = Engine::cpu();
        let d = FillDistribution::default();
        let dense = MemoryDesc::new(vec![2, 3, 2, 2], DType::F32, MemoryFormat::Nchw).unwrap();
        let blocked = MemoryDesc::new(vec![2, 3, 2, 2], DType::F32, MemoryFormat::NChw8c).unwrap();
        let a = Memory::new(dense, &engine).unwrap();
        let b = Memory::new(blocked, &engine).unwrap();
        fill(&a, &d, 11).unwrap();
        fill(&b, &d, 11).unwrap();
        assert_eq!(
            a.to_logical_vec::<f32>().unwrap(),
            b.to_logical_vec::<f32>().unwrap()
        );
    }
}
