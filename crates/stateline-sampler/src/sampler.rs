use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use stateline_adapters::{SlidingWindowBetaAdapter, SlidingWindowSigmaAdapter};
use stateline_proto::settings::SamplerSettings;
use stateline_proto::{Result, StatelineError};
use stateline_store::{ChainArray, SwapType};
use stateline_worker::{JobChannel, WorkerInterface};
use tracing::{info, warn};

use crate::initial::InitialSampler;
use crate::propose::Propose;

/// The scheduling core (spec §4.4): runs the per-iteration
/// retrieve/accept-reject/swap/adapt/submit protocol and `flush()`.
///
/// Single-threaded and cooperative: every public method runs to
/// completion on the caller's thread; the only blocking point is
/// `WorkerInterface::retrieve`'s poll on the message bus.
pub struct Sampler<C: JobChannel> {
    channel: C,
    worker: WorkerInterface,
    chains: ChainArray,
    sigma_adapter: SlidingWindowSigmaAdapter,
    beta_adapter: SlidingWindowBetaAdapter,
    propose: Box<dyn Propose>,
    nchains: usize,
    swap_interval: u64,
    max_evaluation_retries: u32,
    evaluation_retries: Vec<u32>,
    step_counters: Vec<u64>,
    /// The sample each chain last submitted for evaluation, held outside
    /// `WorkerInterface` so it survives past `retrieve` (spec §4.4, "the
    /// proposed-sample `x_prop` held in a side table keyed by i").
    pending_x: Vec<Option<Vec<f64>>>,
    rng: Xoshiro256PlusPlus,
    shutdown: Arc<AtomicBool>,
}

impl<C: JobChannel> Sampler<C> {
    pub fn new(
        channel: C,
        worker: WorkerInterface,
        chains: ChainArray,
        sigma_adapter: SlidingWindowSigmaAdapter,
        beta_adapter: SlidingWindowBetaAdapter,
        propose: Box<dyn Propose>,
        nchains: usize,
        settings: SamplerSettings,
        seed: u64,
    ) -> Self {
        let ntotal = chains.ntotal();
        Self {
            channel,
            worker,
            chains,
            sigma_adapter,
            beta_adapter,
            propose,
            nchains,
            swap_interval: settings.swap_interval,
            max_evaluation_retries: settings.max_evaluation_retries,
            evaluation_retries: vec![0; ntotal],
            step_counters: vec![0; ntotal],
            pending_x: vec![None; ntotal],
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clonable flag a SIGINT handler can set to stop the loop between
    /// retrieves (spec §4, "Cancellation").
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Number of chains with an evaluation currently in flight.
    pub fn pending_count(&self) -> usize {
        self.worker.pending_count()
    }

    /// Runs the channel's orderly-shutdown hook (GOODBYE broadcast for the
    /// bus-backed channel; a no-op for the in-process mock used in tests).
    pub fn shutdown_channel(&mut self) -> Result<()> {
        self.channel.shutdown()
    }

    /// Read-only access to the chain array, for a caller that wants to
    /// inspect chain lengths, sigmas or betas between steps.
    pub fn chains(&self) -> &ChainArray {
        &self.chains
    }

    pub fn sigma_adapter(&self) -> &SlidingWindowSigmaAdapter {
        &self.sigma_adapter
    }

    pub fn beta_adapter(&self) -> &SlidingWindowBetaAdapter {
        &self.beta_adapter
    }

    /// Read-only access to the underlying channel, for a caller that wants
    /// transport-specific stats (e.g. `DelegatorChannel::worker_count`).
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Submits chain `i`'s first proposal. Used once per chain right
    /// after `ChainArray::initialise`.
    pub fn prime(&mut self, i: usize, x0: Vec<f64>) -> Result<()> {
        self.pending_x[i] = Some(x0.clone());
        self.worker.submit(&mut self.channel, i, x0)
    }

    /// Computes chain `i`'s first proposal from its just-initialised state
    /// and primes it (`propose_fn(i, sample, sigma)`, spec §6).
    fn prime_from_state(&mut self, i: usize) -> Result<()> {
        let last = self.chains.last_state(i)?;
        let sigma = self.chains.sigma(i)?;
        let x0 = self.propose.propose(i, &last.sample, sigma);
        self.prime(i, x0)
    }

    /// The chain-initialisation sequence (spec §3, "States are created at
    /// `initialise` time"; `original_source/python/stateline/mcmc.py::init`):
    /// submits `initial_sampler`'s draw for every chain, waits for all
    /// `ntotal` evaluations to complete, seeds each chain with its drawn
    /// sample, evaluated energy, and the adapters' initial sigma/beta
    /// ladder, then primes every chain with its first real proposal so the
    /// caller's first `step()` has something to retrieve.
    pub fn init(&mut self, initial_sampler: &mut dyn InitialSampler) -> Result<()> {
        let ntotal = self.chains.ntotal();
        let mut samples: Vec<Option<Vec<f64>>> = vec![None; ntotal];
        for i in 0..ntotal {
            let x0 = initial_sampler.sample(i);
            self.worker.submit(&mut self.channel, i, x0.clone())?;
            samples[i] = Some(x0);
        }
        for _ in 0..ntotal {
            let (i, energy) = self.worker.retrieve(&mut self.channel)?;
            let sample = samples[i]
                .take()
                .expect("every chain id retrieved during init was submitted exactly once above");
            let sigma = self.sigma_adapter.sigmas()[i];
            let beta = self.beta_adapter.betas()[i];
            self.chains.initialise(i, sample, energy, sigma, beta)?;
        }
        for i in 0..ntotal {
            self.prime_from_state(i)?;
        }
        Ok(())
    }

    /// Runs iterations until the shutdown flag is set or `n` iterations
    /// have completed, whichever comes first. Returns the number of
    /// iterations actually completed.
    pub fn run(&mut self, n: u64) -> Result<u64> {
        let mut completed = 0;
        while completed < n && !self.shutdown.load(Ordering::Relaxed) {
            self.step()?;
            completed += 1;
        }
        Ok(completed)
    }

    /// One iteration of the per-iteration protocol (spec §4.4, steps
    /// 1-6): retrieve, accept/reject, append, conditionally swap, adapt,
    /// submit the next proposal.
    pub fn step(&mut self) -> Result<()> {
        self.process_one(true)
    }

    /// Drains every outstanding evaluation, completing steps 2-5 for each
    /// without submitting a replacement, so every chain ends with no
    /// pending evaluation (spec §4.4, `flush()`).
    pub fn flush(&mut self) -> Result<()> {
        while self.worker.pending_count() > 0 {
            self.process_one(false)?;
        }
        Ok(())
    }

    fn process_one(&mut self, submit_next: bool) -> Result<()> {
        let (chain_id, energy_new) = match self.worker.retrieve(&mut self.channel) {
            Ok(v) => v,
            Err(StatelineError::Evaluation { chain_id }) => {
                let i = chain_id as usize;
                self.evaluation_retries[i] += 1;
                if self.evaluation_retries[i] > self.max_evaluation_retries {
                    return Err(StatelineError::Evaluation { chain_id });
                }
                warn!(
                    chain_id,
                    attempt = self.evaluation_retries[i],
                    max = self.max_evaluation_retries,
                    "evaluation failed, retrying with the same proposal"
                );
                self.worker.resubmit(&mut self.channel, i)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.evaluation_retries[chain_id] = 0;
        let prev = self.chains.last_state(chain_id)?;
        let x_prop = self.pending_x[chain_id]
            .take()
            .expect("a completed retrieve implies a recorded proposal for this chain");
        let beta = self.chains.beta(chain_id)?;
        let log_ratio = -beta * (energy_new - prev.energy);
        let u: f64 = self.rng.random();
        let accepted = u.ln() < log_ratio;

        let (sample, energy) = if accepted { (x_prop, energy_new) } else { (prev.sample.clone(), prev.energy) };
        self.chains.append_step(chain_id, sample.clone(), energy, accepted)?;
        self.propose.observe(chain_id, &sample);

        if let Some(new_sigma) = self.sigma_adapter.update(chain_id, accepted) {
            self.chains.set_sigma(chain_id, new_sigma)?;
        }

        self.step_counters[chain_id] += 1;
        let k = chain_id % self.nchains;
        let is_hottest = k + 1 == self.nchains;
        let mut final_sample = sample;
        if !is_hottest && self.step_counters[chain_id] % self.swap_interval == 0 {
            let stack = chain_id / self.nchains;
            let partner = stack * self.nchains + k + 1;
            final_sample = self.attempt_swap(chain_id, partner)?;
        }

        if submit_next {
            let sigma = self.chains.sigma(chain_id)?;
            let x_next = self.propose.propose(chain_id, &final_sample, sigma);
            self.pending_x[chain_id] = Some(x_next.clone());
            self.worker.submit(&mut self.channel, chain_id, x_next)?;
        }

        Ok(())
    }

    /// Proposes a swap between `i` (colder) and `j` (hotter, the next
    /// chain up its stack). Returns `i`'s resulting sample, which is what
    /// the next proposal should perturb.
    fn attempt_swap(&mut self, i: usize, j: usize) -> Result<Vec<f64>> {
        let si = self.chains.last_state(i)?;
        let sj = self.chains.last_state(j)?;
        let beta_i = self.chains.beta(i)?;
        let beta_j = self.chains.beta(j)?;

        let log_ratio = (beta_i - beta_j) * (si.energy - sj.energy);
        let u: f64 = self.rng.random();
        let accept = u.ln() < log_ratio;

        let result_sample = if accept {
            self.chains.append_swap(i, sj.sample.clone(), sj.energy, SwapType::Accept)?;
            self.chains.append_swap(j, si.sample.clone(), si.energy, SwapType::Accept)?;
            info!(i, j, "swap accepted");
            sj.sample
        } else {
            self.chains.append_swap(i, si.sample.clone(), si.energy, SwapType::Reject)?;
            self.chains.append_swap(j, sj.sample.clone(), sj.energy, SwapType::Reject)?;
            si.sample
        };

        if let Some(new_beta) = self.beta_adapter.update(i, accept) {
            self.chains.set_beta(i, new_beta)?;
        }
        if let Some(new_beta) = self.beta_adapter.update(j, accept) {
            self.chains.set_beta(j, new_beta)?;
        }

        Ok(result_sample)
    }
}
