use serde::{Deserialize, Serialize};

/// The outcome of the swap attempt (if any) that produced this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapType {
    NoAttempt,
    Accept,
    Reject,
}

/// One point in a chain's history.
///
/// Invariant: `accepted == false` implies `sample` equals the preceding
/// in-chain state's sample (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub sample: Vec<f64>,
    pub energy: f64,
    pub sigma: f64,
    pub beta: f64,
    pub accepted: bool,
    pub swap_type: SwapType,
}

impl State {
    pub fn new(
        sample: Vec<f64>,
        energy: f64,
        sigma: f64,
        beta: f64,
        accepted: bool,
        swap_type: SwapType,
    ) -> Self {
        Self { sample, energy, sigma, beta, accepted, swap_type }
    }
}
