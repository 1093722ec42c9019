use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

/// Per-chain running covariance estimator (Welford's online algorithm) and
/// the multivariate-normal proposal drawn from it (spec §4.5, "Covariance
/// adapter").
pub struct CovarianceAdapter {
    ndims: usize,
    means: Vec<DVector<f64>>,
    m2: Vec<DMatrix<f64>>,
    counts: Vec<u64>,
}

impl CovarianceAdapter {
    pub fn new(ntotal: usize, ndims: usize) -> Self {
        Self {
            ndims,
            means: vec![DVector::zeros(ndims); ntotal],
            m2: vec![DMatrix::zeros(ndims, ndims); ntotal],
            counts: vec![0; ntotal],
        }
    }

    /// Folds `sample` into chain `i`'s running mean and second moment.
    pub fn update(&mut self, i: usize, sample: &[f64]) {
        debug_assert_eq!(sample.len(), self.ndims);
        let x = DVector::from_row_slice(sample);
        self.counts[i] += 1;
        let n = self.counts[i] as f64;
        let delta = &x - &self.means[i];
        self.means[i] += &delta / n;
        let delta2 = &x - &self.means[i];
        self.m2[i] += &delta * delta2.transpose();
    }

    /// The biased sample covariance accumulated so far for chain `i`.
    pub fn cov(&self, i: usize) -> DMatrix<f64> {
        let n = self.counts[i].max(1) as f64;
        &self.m2[i] / n
    }

    /// Draws a proposal `sample + scale * L*z` where `L` is the Cholesky
    /// factor of the running covariance and `z` is standard-normal noise.
    /// Falls back to an identity step while too few samples have been seen
    /// to estimate a factorisable covariance.
    pub fn propose<R: Rng + ?Sized>(&self, i: usize, sample: &[f64], scale: f64, rng: &mut R) -> Vec<f64> {
        let z = DVector::from_iterator(self.ndims, (0..self.ndims).map(|_| rng.sample(StandardNormal)));
        let cov = self.cov(i);
        let step = match Cholesky::new(cov) {
            Some(chol) => chol.l() * z,
            None => z,
        };
        sample.iter().zip(step.iter()).map(|(x, d)| x + scale * d).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_cov_matches_biased_covariance() {
        let samples = [[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0]];
        let mut adapter = CovarianceAdapter::new(1, 2);
        for s in &samples {
            adapter.update(0, s);
        }
        let mean = [2.5, 2.5];
        let mut expected = DMatrix::zeros(2, 2);
        for s in &samples {
            let d = DVector::from_row_slice(&[s[0] - mean[0], s[1] - mean[1]]);
            expected += &d * d.transpose();
        }
        expected /= samples.len() as f64;

        let cov = adapter.cov(0);
        for r in 0..2 {
            for c in 0..2 {
                assert!((cov[(r, c)] - expected[(r, c)]).abs() < 1e-9);
            }
        }
    }
}
