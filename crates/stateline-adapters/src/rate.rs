/// Shared rate-limited scale update (spec §4.5): multiply the current
/// scale by `clip(1 + adapt_rate·(r − target), min, max)`, where
/// `adapt_rate` itself decays with the chain's total step count so
/// adaptation dies off and the chain becomes time-homogeneous.
pub fn adapt_factor(
    rate: f64,
    target: f64,
    adapt_rate: f64,
    total_steps: u64,
    adaption_length: u64,
    min_adapt_factor: f64,
    max_adapt_factor: f64,
) -> f64 {
    let decayed_rate = adapt_rate / (1.0 + total_steps as f64 / adaption_length as f64);
    (1.0 + decayed_rate * (rate - target)).clamp(min_adapt_factor, max_adapt_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_is_one_when_rate_matches_target() {
        let factor = adapt_factor(0.24, 0.24, 0.2, 0, 100_000, 0.8, 1.25);
        assert!((factor - 1.0).abs() < 1e-12);
    }

    #[test]
    fn factor_is_clamped() {
        let factor = adapt_factor(1.0, 0.0, 10.0, 0, 100_000, 0.8, 1.25);
        assert_eq!(factor, 1.25);
    }

    #[test]
    fn decay_shrinks_the_effective_adapt_rate() {
        let early = adapt_factor(0.5, 0.24, 0.2, 0, 100_000, 0.8, 1.25);
        let late = adapt_factor(0.5, 0.24, 0.2, 900_000, 100_000, 0.8, 1.25);
        assert!((late - 1.0).abs() < (early - 1.0).abs());
    }
}
