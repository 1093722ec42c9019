use stateline_proto::settings::BetaAdapterSettings;

use crate::rate::adapt_factor;
use crate::window::Window;

/// Per-chain sliding-window beta (inverse temperature) adapter (spec §4.5).
///
/// Initial betas follow the descending ladder `beta_factor^(-k)`, so
/// `beta` decreases (hotter) as the chain's position `k` within its stack
/// increases.
pub struct SlidingWindowBetaAdapter {
    settings: BetaAdapterSettings,
    nchains: usize,
    windows: Vec<Window>,
    betas: Vec<f64>,
    steps_since_adapt: Vec<u64>,
    total_steps: Vec<u64>,
}

impl SlidingWindowBetaAdapter {
    pub fn new(nstacks: usize, nchains: usize, settings: BetaAdapterSettings) -> Self {
        let ntotal = nstacks * nchains;
        let betas = (0..ntotal)
            .map(|i| {
                let k = i % nchains;
                settings.beta_factor.powi(-(k as i32))
            })
            .collect();
        Self {
            windows: (0..ntotal).map(|_| Window::new(settings.window_size)).collect(),
            betas,
            steps_since_adapt: vec![0; ntotal],
            total_steps: vec![0; ntotal],
            nchains,
            settings,
        }
    }

    pub fn nchains(&self) -> usize {
        self.nchains
    }

    /// Records whether chain `i`'s last swap attempt was accepted. Returns
    /// the chain's new beta if this call triggered an adapt tick.
    pub fn update(&mut self, i: usize, swap_accepted: bool) -> Option<f64> {
        self.windows[i].push(swap_accepted);
        self.total_steps[i] += 1;
        self.steps_since_adapt[i] += 1;
        if self.steps_since_adapt[i] < self.settings.nsteps_per_adapt {
            return None;
        }
        self.steps_since_adapt[i] = 0;
        let rate = self.windows[i].rate();
        let factor = adapt_factor(
            rate,
            self.settings.optimal_swap_rate,
            self.settings.adapt_rate,
            self.total_steps[i],
            self.settings.adaption_length,
            self.settings.min_adapt_factor,
            self.settings.max_adapt_factor,
        );
        self.betas[i] *= factor;
        Some(self.betas[i])
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn swap_rates(&self) -> Vec<f64> {
        self.windows.iter().map(Window::rate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BetaAdapterSettings {
        BetaAdapterSettings::default()
    }

    #[test]
    fn initial_beta_ladder_is_descending() {
        let mut s = settings();
        s.beta_factor = 2.0;
        let adapter = SlidingWindowBetaAdapter::new(1, 4, s);
        assert_eq!(adapter.betas(), &[1.0, 0.5, 0.25, 0.125]);
    }

    #[test]
    fn swap_rate_reflects_recent_outcomes() {
        let mut adapter = SlidingWindowBetaAdapter::new(1, 1, settings());
        for outcome in [true, false, true, false] {
            adapter.update(0, outcome);
        }
        assert_eq!(adapter.swap_rates()[0], 0.5);
    }
}
