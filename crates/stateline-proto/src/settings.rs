//! The settings object exposed to callers (spec §6). Every field is
//! optional and defaulted so the aggregate can be built from a partial
//! TOML file plus CLI overrides.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub rate_ms: u64,
    pub poll_rate_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self { rate_ms: 1000, poll_rate_ms: 500, timeout_ms: 3000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainStoreSettings {
    pub database_path: String,
    pub recover_from_disk: bool,
    pub chain_cache_length: usize,
    pub database_cache_size_mb: u64,
}

impl Default for ChainStoreSettings {
    fn default() -> Self {
        Self {
            database_path: "chainDB".to_string(),
            recover_from_disk: false,
            chain_cache_length: 1000,
            database_cache_size_mb: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaAdapterSettings {
    pub window_size: usize,
    pub cold_sigma: f64,
    pub sigma_factor: f64,
    pub adaption_length: u64,
    pub nsteps_per_adapt: u64,
    pub optimal_accept_rate: f64,
    pub adapt_rate: f64,
    pub min_adapt_factor: f64,
    pub max_adapt_factor: f64,
}

impl Default for SigmaAdapterSettings {
    fn default() -> Self {
        Self {
            window_size: 10_000,
            cold_sigma: 1.0,
            sigma_factor: 1.5,
            adaption_length: 100_000,
            nsteps_per_adapt: 2_500,
            optimal_accept_rate: 0.24,
            adapt_rate: 0.2,
            min_adapt_factor: 0.8,
            max_adapt_factor: 1.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaAdapterSettings {
    pub window_size: usize,
    pub beta_factor: f64,
    pub adaption_length: u64,
    pub nsteps_per_adapt: u64,
    pub optimal_swap_rate: f64,
    pub adapt_rate: f64,
    pub min_adapt_factor: f64,
    pub max_adapt_factor: f64,
}

impl Default for BetaAdapterSettings {
    fn default() -> Self {
        Self {
            window_size: 10_000,
            beta_factor: 1.5,
            adaption_length: 100_000,
            nsteps_per_adapt: 2_500,
            optimal_swap_rate: 0.24,
            adapt_rate: 0.2,
            min_adapt_factor: 0.8,
            max_adapt_factor: 1.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    pub swap_interval: u64,
    /// Consecutive `EvaluationError`s tolerated for one chain before the
    /// error is surfaced to the caller instead of retried (spec §7).
    /// Defaults to the "retry once, then surface" policy spec §7 names.
    pub max_evaluation_retries: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self { swap_interval: 10, max_evaluation_retries: 1 }
    }
}

/// The full settings aggregate. `nstacks`/`nchains`/`ndims` have no
/// sensible default and are required at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub nstacks: usize,
    pub nchains: usize,
    pub ndims: usize,
    pub heartbeat: HeartbeatSettings,
    pub chain_store: ChainStoreSettings,
    pub sigma_adapter: SigmaAdapterSettings,
    pub beta_adapter: BetaAdapterSettings,
    pub sampler: SamplerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nstacks: 1,
            nchains: 1,
            ndims: 1,
            heartbeat: HeartbeatSettings::default(),
            chain_store: ChainStoreSettings::default(),
            sigma_adapter: SigmaAdapterSettings::default(),
            beta_adapter: BetaAdapterSettings::default(),
            sampler: SamplerSettings::default(),
        }
    }
}

impl Settings {
    pub fn ntotal(&self) -> usize {
        self.nstacks * self.nchains
    }
}
