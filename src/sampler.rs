//! Price sampling for round triggers.
//!
//! Each trigger carries a pseudo-random price. Start and end prices are
//! drawn independently on every call; nothing is cached between draws.

use rand::Rng;

/// Source of bounded pseudo-random prices.
#[cfg_attr(test, mockall::automock)]
pub trait PriceSampler: Send + Sync {
    /// Draw a price uniformly from `[1, max]`.
    fn sample(&self, max: u64) -> u64;
}

/// Thread-local RNG backed sampler.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPriceSampler;

impl PriceSampler for RandomPriceSampler {
    fn sample(&self, max: u64) -> u64 {
        rand::thread_rng().gen_range(1..=max.max(1))
    }
}
