//! Named, reproducible random number streams.
//!
//! Each consumer of randomness (transmission draws, infection seeding, trajectory selection,
//! leisure choices) declares its own stream with [`define_rng!`]. Every stream is seeded from
//! the run's base seed plus a hash of its name, so adding draws to one stream never perturbs
//! the others and a run is fully determined by its base seed.
use std::any::{Any, TypeId};
use std::hash::Hasher;

use log::trace;
use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::distr::weighted::{Weight, WeightedIndex};
use rand::distr::Distribution;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHasher;

use crate::HashMap;

/// Use this to define a unique type which will be used as a key to retrieve
/// an independent rng instance from a [`RandomSource`].
#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        #[derive(Copy, Clone)]
        pub struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::StdRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }
    };
}
pub use define_rng;

pub trait RngId: Copy + Clone + 'static {
    type RngType: SeedableRng + Rng + 'static;
    fn get_name() -> &'static str;
}

/// Deterministic hash of a stream name, used as the seed offset.
fn hash_str(data: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_bytes());
    hasher.finish()
}

// This is a wrapper that allows for different types of random number
// generators (anything that implements SeedableRng is valid).
struct RngHolder {
    rng: Box<dyn Any>,
}

/// The single per-run source of randomness. Streams are created lazily.
pub struct RandomSource {
    base_seed: u64,
    rng_holders: HashMap<TypeId, RngHolder>,
}

impl RandomSource {
    #[must_use]
    pub fn new(base_seed: u64) -> RandomSource {
        RandomSource {
            base_seed,
            rng_holders: HashMap::default(),
        }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Reseeds every stream. Streams are recreated on their next use.
    pub fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random source with seed {base_seed}");
        self.base_seed = base_seed;
        self.rng_holders.clear();
    }

    /// Gets a mutable reference to the generator associated with `R`, creating it if needed.
    pub fn get_rng<R: RngId>(&mut self) -> &mut R::RngType {
        let base_seed = self.base_seed;
        self.rng_holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!("creating new RNG (seed={base_seed}) for {}", R::get_name());
                let seed_offset = hash_str(R::get_name());
                RngHolder {
                    rng: Box::new(R::RngType::seed_from_u64(
                        base_seed.wrapping_add(seed_offset),
                    )),
                }
            })
            .rng
            .downcast_mut::<R::RngType>()
            .unwrap()
    }

    /// Applies `sampler` to the generator associated with `R`.
    pub fn sample<R: RngId, T>(
        &mut self,
        _rng_type: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        sampler(self.get_rng::<R>())
    }

    /// Draws a sample from `distribution` with the generator associated with `R`.
    pub fn sample_distr<R: RngId, T>(&mut self, _rng_type: R, distribution: impl Distribution<T>) -> T {
        distribution.sample(self.get_rng::<R>())
    }

    pub fn sample_range<R: RngId, S, T>(&mut self, rng_id: R, range: S) -> T
    where
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    /// Returns true with probability `p`. `p` is clamped to `[0, 1]`.
    pub fn sample_bool<R: RngId>(&mut self, rng_id: R, p: f64) -> bool {
        let p = p.clamp(0.0, 1.0);
        self.sample(rng_id, |rng| rng.random_bool(p))
    }

    /// Draws an index into `weights` with probability proportional to its weight.
    ///
    /// # Panics
    ///
    /// Panics if the weights are empty, negative or all zero.
    pub fn sample_weighted<R: RngId, T>(&mut self, _rng_id: R, weights: &[T]) -> usize
    where
        T: Clone + Default + SampleUniform + for<'a> std::ops::AddAssign<&'a T> + PartialOrd + Weight,
    {
        let index = WeightedIndex::new(weights).unwrap();
        index.sample(self.get_rng::<R>())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::RngCore;
    use rand_distr::Exp;

    define_rng!(FooRng);
    define_rng!(BarRng);

    #[test]
    fn get_rng_basic() {
        let mut random = RandomSource::new(42);
        assert_ne!(
            random.sample(FooRng, RngCore::next_u64),
            random.sample(FooRng, RngCore::next_u64)
        );
    }

    #[test]
    fn multiple_rng_types() {
        let mut random = RandomSource::new(42);
        assert_ne!(
            random.sample(FooRng, RngCore::next_u64),
            random.sample(BarRng, RngCore::next_u64)
        );
    }

    #[test]
    fn reset_seed() {
        let mut random = RandomSource::new(42);
        let run_0 = random.sample(FooRng, RngCore::next_u64);
        let run_1 = random.sample(FooRng, RngCore::next_u64);

        random.init_random(42);
        assert_eq!(run_0, random.sample(FooRng, RngCore::next_u64));
        assert_eq!(run_1, random.sample(FooRng, RngCore::next_u64));

        random.init_random(88);
        assert_ne!(run_0, random.sample(FooRng, RngCore::next_u64));
        assert_ne!(run_1, random.sample(FooRng, RngCore::next_u64));
    }

    #[test]
    fn streams_are_independent() {
        let mut a = RandomSource::new(7);
        let mut b = RandomSource::new(7);
        // Drawing from BarRng in `b` must not shift FooRng.
        let _ = b.sample(BarRng, RngCore::next_u64);
        assert_eq!(
            a.sample(FooRng, RngCore::next_u64),
            b.sample(FooRng, RngCore::next_u64)
        );
    }

    #[test]
    fn usage_with_distribution() {
        let mut random = RandomSource::new(42);
        let dist = Exp::new(1.0).unwrap();
        assert_ne!(
            random.sample_distr(FooRng, dist),
            random.sample_distr(FooRng, dist)
        );
    }

    #[test]
    fn sample_bool_extremes() {
        let mut random = RandomSource::new(42);
        assert!(random.sample_bool(FooRng, 1.0));
        assert!(!random.sample_bool(FooRng, 0.0));
        assert!(random.sample_bool(FooRng, 1.5));
    }

    #[test]
    fn sample_range_and_weighted() {
        let mut random = RandomSource::new(42);
        let result = random.sample_range(FooRng, 0..10);
        assert!((0..10).contains(&result));
        let r: usize = random.sample_weighted(FooRng, &[0.0, 0.0, 1.0]);
        assert_eq!(r, 2);
    }
}
