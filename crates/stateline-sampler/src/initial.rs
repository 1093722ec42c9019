use rand::SeedableRng;
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;

/// `init`'s `prior` callback (`original_source/python/stateline/mcmc.py::init`):
/// draws chain `i`'s starting sample, submitted to the worker pool before
/// any chain is initialised (spec §3, "States are created at `initialise`
/// time").
pub trait InitialSampler: Send {
    fn sample(&mut self, i: usize) -> Vec<f64>;
}

/// The Python default, `lambda _: np.random.randn(ndims)`: an independent
/// standard normal draw per dimension, the same for every chain.
pub struct StandardNormalInitial {
    rng: Xoshiro256PlusPlus,
    ndims: usize,
}

impl StandardNormalInitial {
    pub fn new(ndims: usize, seed: u64) -> Self {
        Self { rng: Xoshiro256PlusPlus::seed_from_u64(seed), ndims }
    }
}

impl InitialSampler for StandardNormalInitial {
    fn sample(&mut self, _i: usize) -> Vec<f64> {
        (0..self.ndims).map(|_| rand::Rng::sample(&mut self.rng, StandardNormal)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_one_value_per_dimension() {
        let mut sampler = StandardNormalInitial::new(4, 0);
        assert_eq!(sampler.sample(0).len(), 4);
    }
}
