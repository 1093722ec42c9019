use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;
use stateline_adapters::{gaussian_proposal, BlockAdapter, CovarianceAdapter};

/// `proposal_fn(i, sample, sigma) → sample` (spec §9 REDESIGN FLAGS):
/// kept as a small capability object so the sampler can be driven by a
/// custom proposal without becoming generic over it.
pub trait Propose: Send {
    fn propose(&mut self, i: usize, sample: &[f64], sigma: f64) -> Vec<f64>;

    /// Called once per step with the state chain `i` ended up on (after
    /// accept/reject, before any swap), so a proposal that keeps a running
    /// estimate over visited samples (e.g. [`CovarianceProposal`]) can fold
    /// it in. The default proposal has no such state, hence the no-op.
    fn observe(&mut self, _i: usize, _sample: &[f64]) {}
}

/// The default proposal: an independent Gaussian perturbation per
/// dimension, scaled by the chain's current sigma.
pub struct GaussianProposal {
    rng: Xoshiro256PlusPlus,
}

impl GaussianProposal {
    pub fn new(seed: u64) -> Self {
        Self { rng: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }
}

impl Propose for GaussianProposal {
    fn propose(&mut self, _i: usize, sample: &[f64], sigma: f64) -> Vec<f64> {
        gaussian_proposal(sample, sigma, &mut self.rng)
    }
}

/// The covariance-adapter proposal variant (spec §4.5, "Covariance adapter"):
/// draws from a multivariate normal whose covariance is the running
/// second-moment matrix over every sample chain `i` has visited, scaled by
/// its sigma.
pub struct CovarianceProposal {
    adapter: CovarianceAdapter,
    rng: Xoshiro256PlusPlus,
}

impl CovarianceProposal {
    pub fn new(ntotal: usize, ndims: usize, seed: u64) -> Self {
        Self { adapter: CovarianceAdapter::new(ntotal, ndims), rng: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }
}

impl Propose for CovarianceProposal {
    fn propose(&mut self, i: usize, sample: &[f64], sigma: f64) -> Vec<f64> {
        self.adapter.propose(i, sample, sigma, &mut self.rng)
    }

    fn observe(&mut self, i: usize, sample: &[f64]) {
        self.adapter.update(i, sample);
    }
}

/// The block-update proposal variant (spec §4.5, "Block adapter"): each step
/// perturbs a single coordinate, rotating through dimensions modulo `ndims`.
pub struct BlockProposal {
    adapter: BlockAdapter,
    rng: Xoshiro256PlusPlus,
}

impl BlockProposal {
    pub fn new(ntotal: usize, ndims: usize, seed: u64) -> Self {
        Self { adapter: BlockAdapter::new(ntotal, ndims), rng: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }
}

impl Propose for BlockProposal {
    fn propose(&mut self, i: usize, sample: &[f64], sigma: f64) -> Vec<f64> {
        let dim = self.adapter.next_dim(i);
        let mut next = sample.to_vec();
        next[dim] += sigma * self.rng.sample::<f64, _>(StandardNormal);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_proposal_perturbs_one_dimension_at_a_time() {
        let mut proposal = BlockProposal::new(1, 3, 0);
        let sample = vec![0.0, 0.0, 0.0];
        for expected_dim in [0, 1, 2, 0] {
            let next = proposal.propose(0, &sample, 1.0);
            let changed: Vec<usize> = next.iter().enumerate().filter(|(_, &v)| v != 0.0).map(|(i, _)| i).collect();
            assert_eq!(changed, vec![expected_dim]);
        }
    }

    #[test]
    fn covariance_proposal_observe_updates_distinct_chains_independently() {
        let mut proposal = CovarianceProposal::new(2, 2, 0);
        proposal.observe(0, &[1.0, 1.0]);
        proposal.observe(0, &[3.0, 3.0]);
        // Chain 1 has no observed history: its covariance is still zero, so
        // its proposal step collapses to the identity regardless of sigma.
        let unmoved = proposal.propose(1, &[0.0, 0.0], 5.0);
        assert_eq!(unmoved, vec![0.0, 0.0]);
        // Chain 0 has a nonzero running covariance, so its step is nonzero.
        let moved = proposal.propose(0, &[0.0, 0.0], 5.0);
        assert_ne!(moved, vec![0.0, 0.0]);
    }
}
