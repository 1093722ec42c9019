use rand::Rng;
use rand_distr::StandardNormal;

/// Independent Gaussian proposal: each coordinate is perturbed by an
/// independent `N(0, sigma^2)` draw.
pub fn gaussian_proposal<R: Rng + ?Sized>(sample: &[f64], sigma: f64, rng: &mut R) -> Vec<f64> {
    sample.iter().map(|x| x + sigma * rng.sample::<f64, _>(StandardNormal)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn zero_sigma_is_a_noop() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let sample = vec![1.0, 2.0, 3.0];
        let proposed = gaussian_proposal(&sample, 0.0, &mut rng);
        assert_eq!(proposed, sample);
    }

    #[test]
    fn proposal_preserves_dimensionality() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let sample = vec![0.0; 5];
        let proposed = gaussian_proposal(&sample, 1.0, &mut rng);
        assert_eq!(proposed.len(), 5);
    }
}
