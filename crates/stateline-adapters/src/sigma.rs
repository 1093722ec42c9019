use stateline_proto::settings::SigmaAdapterSettings;

use crate::rate::adapt_factor;
use crate::window::Window;

/// Per-chain sliding-window sigma adapter (spec §4.5).
///
/// Initial sigmas follow the stack ladder `cold_sigma * sigma_factor^k`
/// where `k` is the chain's position within its stack.
pub struct SlidingWindowSigmaAdapter {
    settings: SigmaAdapterSettings,
    nchains: usize,
    windows: Vec<Window>,
    sigmas: Vec<f64>,
    steps_since_adapt: Vec<u64>,
    total_steps: Vec<u64>,
}

impl SlidingWindowSigmaAdapter {
    pub fn new(nstacks: usize, nchains: usize, settings: SigmaAdapterSettings) -> Self {
        let ntotal = nstacks * nchains;
        let sigmas = (0..ntotal)
            .map(|i| {
                let k = i % nchains;
                settings.cold_sigma * settings.sigma_factor.powi(k as i32)
            })
            .collect();
        Self {
            windows: (0..ntotal).map(|_| Window::new(settings.window_size)).collect(),
            sigmas,
            steps_since_adapt: vec![0; ntotal],
            total_steps: vec![0; ntotal],
            nchains,
            settings,
        }
    }

    pub fn nchains(&self) -> usize {
        self.nchains
    }

    /// Records whether chain `i`'s last proposal was accepted. Returns the
    /// chain's new sigma if this call triggered an adapt tick.
    pub fn update(&mut self, i: usize, accepted: bool) -> Option<f64> {
        self.windows[i].push(accepted);
        self.total_steps[i] += 1;
        self.steps_since_adapt[i] += 1;
        if self.steps_since_adapt[i] < self.settings.nsteps_per_adapt {
            return None;
        }
        self.steps_since_adapt[i] = 0;
        let rate = self.windows[i].rate();
        let factor = adapt_factor(
            rate,
            self.settings.optimal_accept_rate,
            self.settings.adapt_rate,
            self.total_steps[i],
            self.settings.adaption_length,
            self.settings.min_adapt_factor,
            self.settings.max_adapt_factor,
        );
        self.sigmas[i] *= factor;
        Some(self.sigmas[i])
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    pub fn accept_rates(&self) -> Vec<f64> {
        self.windows.iter().map(Window::rate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SigmaAdapterSettings {
        SigmaAdapterSettings::default()
    }

    #[test]
    fn initial_sigma_ladder_matches_stack_formula() {
        let mut s = settings();
        s.cold_sigma = 2.0;
        s.sigma_factor = 1.5;
        let adapter = SlidingWindowSigmaAdapter::new(1, 4, s);
        assert_eq!(adapter.sigmas(), &[2.0, 3.0, 4.5, 6.75]);
    }

    #[test]
    fn accept_rate_reflects_recent_outcomes() {
        let mut adapter = SlidingWindowSigmaAdapter::new(1, 1, settings());
        for outcome in [true, true, true, false] {
            adapter.update(0, outcome);
        }
        assert_eq!(adapter.accept_rates()[0], 0.75);
    }

    #[test]
    fn sigma_unchanged_before_adapt_tick() {
        let mut s = settings();
        s.nsteps_per_adapt = 5;
        let mut adapter = SlidingWindowSigmaAdapter::new(1, 1, s);
        let initial = adapter.sigmas()[0];
        for _ in 0..4 {
            assert!(adapter.update(0, true).is_none());
        }
        assert_eq!(adapter.sigmas()[0], initial);
        assert!(adapter.update(0, true).is_some());
    }
}
