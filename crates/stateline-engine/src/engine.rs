use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use stateline_adapters::{SlidingWindowBetaAdapter, SlidingWindowSigmaAdapter};
use stateline_bus::{Delegator, DelegatorChannel};
use stateline_proto::settings::Settings;
use stateline_proto::{JobType, Result, StatelineError};
use stateline_sampler::{InitialSampler, Propose, Sampler, StandardNormalInitial};
use stateline_store::ChainArray;
use stateline_worker::{Combine, Construct, DefaultCombine, DefaultConstruct, JobChannel, WorkerInterface};

fn validate(settings: &Settings) -> Result<()> {
    if settings.nstacks == 0 {
        return Err(StatelineError::Config("nstacks must be at least 1".into()));
    }
    if settings.nchains == 0 {
        return Err(StatelineError::Config("nchains must be at least 1".into()));
    }
    if settings.ndims == 0 {
        return Err(StatelineError::Config("ndims must be at least 1".into()));
    }
    if settings.chain_store.database_path.trim().is_empty() {
        return Err(StatelineError::Config("chain_store.database_path must not be empty".into()));
    }
    Ok(())
}

/// Assembles bus/worker-interface/chain-array/adapters/sampler from one
/// [`Settings`] aggregate (spec §6) plus the three dependency-injected
/// capability objects (spec §9, REDESIGN FLAGS): `Construct`, `Combine`
/// and `Propose`.
///
/// Defaults (overridable before `bind`/`build_with_channel`): one job per
/// sample (`DefaultConstruct`/`DefaultCombine`) and an independent
/// Gaussian proposal seeded with `0`.
pub struct EngineBuilder {
    settings: Settings,
    construct: Box<dyn Construct>,
    combine: Box<dyn Combine>,
    propose: Box<dyn Propose>,
    seed: u64,
}

impl EngineBuilder {
    pub fn new(settings: Settings) -> Result<Self> {
        validate(&settings)?;
        Ok(Self {
            settings,
            construct: Box::new(DefaultConstruct),
            combine: Box::new(DefaultCombine),
            propose: Box::new(stateline_sampler::GaussianProposal::new(0)),
            seed: 0,
        })
    }

    pub fn construct(mut self, construct: Box<dyn Construct>) -> Self {
        self.construct = construct;
        self
    }

    pub fn combine(mut self, combine: Box<dyn Combine>) -> Self {
        self.combine = combine;
        self
    }

    pub fn propose(mut self, propose: Box<dyn Propose>) -> Self {
        self.propose = propose;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Binds a ROUTER-socket delegator at `addr` and assembles the engine
    /// over it (spec §4.1).
    pub fn bind(self, addr: &str) -> Result<Engine<DelegatorChannel>> {
        let timeout = Duration::from_millis(self.settings.heartbeat.timeout_ms);
        let rate = Duration::from_millis(self.settings.heartbeat.rate_ms);
        let poll_rate = Duration::from_millis(self.settings.heartbeat.poll_rate_ms);
        let delegator = Delegator::bind(addr, rate, timeout)?;
        let channel = DelegatorChannel::new(delegator, poll_rate);
        self.build_with_channel(channel)
    }

    /// Assembles the engine over an arbitrary [`JobChannel`] — the bus
    /// client in production, an in-process mock in tests.
    pub fn build_with_channel<C: JobChannel>(self, channel: C) -> Result<Engine<C>> {
        validate(&self.settings)?;
        let ntotal = self.settings.ntotal();

        let chains = ChainArray::open(
            &self.settings.chain_store.database_path,
            ntotal,
            self.settings.chain_store.chain_cache_length,
            self.settings.chain_store.database_cache_size_mb,
            self.settings.chain_store.recover_from_disk,
        )?;
        let worker = WorkerInterface::new(ntotal, self.construct, self.combine);
        let sigma_adapter =
            SlidingWindowSigmaAdapter::new(self.settings.nstacks, self.settings.nchains, self.settings.sigma_adapter.clone());
        let beta_adapter =
            SlidingWindowBetaAdapter::new(self.settings.nstacks, self.settings.nchains, self.settings.beta_adapter.clone());

        let sampler = Sampler::new(
            channel,
            worker,
            chains,
            sigma_adapter,
            beta_adapter,
            self.propose,
            self.settings.nchains,
            self.settings.sampler.clone(),
            self.seed,
        );

        Ok(Engine {
            sampler,
            nstacks: self.settings.nstacks,
            nchains: self.settings.nchains,
            ndims: self.settings.ndims,
        })
    }
}

/// A snapshot of the engine's running statistics, read by the CLI's
/// metrics-reporting loop (the `metrics`/`metrics-exporter-prometheus`
/// crates themselves stay out of this crate — only `stateline-cli` turns
/// these numbers into Prometheus gauges).
pub struct EngineStats {
    pub accept_rates: Vec<f64>,
    pub swap_rates: Vec<f64>,
    pub pending_count: usize,
}

/// The assembled sampling engine: bus client, worker interface, chain
/// array, adapters and sampler behind one handle.
pub struct Engine<C: JobChannel> {
    sampler: Sampler<C>,
    nstacks: usize,
    nchains: usize,
    ndims: usize,
}

impl<C: JobChannel> Engine<C> {
    /// Seeds every chain from `initial_sampler`'s draws and primes each
    /// chain's first real proposal (spec §3; `Sampler::init`).
    pub fn init(&mut self, initial_sampler: &mut dyn InitialSampler) -> Result<()> {
        self.sampler.init(initial_sampler)
    }

    /// `init` using the Python default prior: an independent standard
    /// normal draw per dimension.
    pub fn init_with_standard_normal_prior(&mut self, seed: u64) -> Result<()> {
        let mut prior = StandardNormalInitial::new(self.ndims, seed);
        self.sampler.init(&mut prior)
    }

    /// Runs iterations until `n` complete or the shutdown flag is set.
    /// Returns the number of iterations actually completed.
    pub fn run(&mut self, n: u64) -> Result<u64> {
        self.sampler.run(n)
    }

    /// A single iteration of the per-chain protocol (spec §4.4).
    pub fn step(&mut self) -> Result<()> {
        self.sampler.step()
    }

    /// Drains every outstanding evaluation (spec §4.4, `flush()`).
    pub fn flush(&mut self) -> Result<()> {
        self.sampler.flush()
    }

    /// A clonable flag a SIGINT handler can set to stop `run` between
    /// retrieves.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.sampler.shutdown_flag()
    }

    /// Orderly shutdown: drains in-flight evaluations, then tells the
    /// channel to say goodbye (GOODBYE broadcast for the bus-backed
    /// engine).
    pub fn shutdown(&mut self) -> Result<()> {
        self.sampler.flush()?;
        self.sampler.shutdown_channel()
    }

    /// The coldest chain's samples for stack `s` (`mcmc.py::cold_samples`).
    pub fn cold_samples(&self, s: usize, burnin: usize, thin: usize) -> Result<Vec<Vec<f64>>> {
        self.sampler.chains().cold_samples(s, self.nchains, burnin, thin)
    }

    pub fn length(&self, i: usize) -> Result<u64> {
        self.sampler.chains().length(i)
    }

    pub fn nstacks(&self) -> usize {
        self.nstacks
    }

    pub fn nchains(&self) -> usize {
        self.nchains
    }

    pub fn ndims(&self) -> usize {
        self.ndims
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            accept_rates: self.sampler.sigma_adapter().accept_rates(),
            swap_rates: self.sampler.beta_adapter().swap_rates(),
            pending_count: self.sampler.pending_count(),
        }
    }
}

impl Engine<DelegatorChannel> {
    pub fn worker_count(&self) -> usize {
        self.sampler.channel().worker_count()
    }

    pub fn queue_depth(&self, job_type: JobType) -> usize {
        self.sampler.channel().queue_depth(job_type)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use stateline_proto::{JobData, ResultData};

    use super::*;

    struct MockChannel {
        inbox: VecDeque<(u64, JobData)>,
        outbox: VecDeque<(u64, ResultData)>,
    }

    impl MockChannel {
        fn new() -> Self {
            Self { inbox: VecDeque::new(), outbox: VecDeque::new() }
        }
    }

    impl JobChannel for MockChannel {
        fn send_job(&mut self, batch_id: u64, job: JobData) -> Result<()> {
            let echoed = f64::from_le_bytes(job.payload[..8].try_into().unwrap());
            self.outbox.push_back((batch_id, ResultData::new(job.job_type, echoed.to_le_bytes().to_vec())));
            self.inbox.push_back((batch_id, job));
            Ok(())
        }

        fn recv_result(&mut self) -> Result<(u64, ResultData)> {
            self.outbox.pop_front().ok_or_else(|| StatelineError::Transport("no results queued".into()))
        }
    }

    fn settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.nstacks = 1;
        settings.nchains = 2;
        settings.ndims = 3;
        settings.chain_store.database_path = dir.join("db").to_str().unwrap().to_string();
        settings.sampler.swap_interval = 1;
        settings
    }

    #[test]
    fn init_seeds_every_chain_and_primes_the_first_proposal() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = EngineBuilder::new(settings(dir.path())).unwrap().build_with_channel(MockChannel::new()).unwrap();
        engine.init_with_standard_normal_prior(0).unwrap();
        assert_eq!(engine.length(0).unwrap(), 1);
        assert_eq!(engine.length(1).unwrap(), 1);
    }

    #[test]
    fn run_advances_chain_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = EngineBuilder::new(settings(dir.path())).unwrap().build_with_channel(MockChannel::new()).unwrap();
        engine.init_with_standard_normal_prior(1).unwrap();
        let completed = engine.run(5).unwrap();
        assert_eq!(completed, 5);
        assert!(engine.length(0).unwrap() >= 1);
    }

    /// Answers the first `retrieve` (the `init` evaluation) with a finite
    /// energy, then every `retrieve` after that with a non-finite one, so a
    /// test can drive `init` to completion and then exercise the bounded
    /// evaluation-retry path from `step`.
    struct NanAfterInitChannel {
        retrieves: u32,
        last_batch_id: u64,
    }

    impl JobChannel for NanAfterInitChannel {
        fn send_job(&mut self, batch_id: u64, _job: JobData) -> Result<()> {
            self.last_batch_id = batch_id;
            Ok(())
        }

        fn recv_result(&mut self) -> Result<(u64, ResultData)> {
            self.retrieves += 1;
            let energy = if self.retrieves == 1 { 1.0 } else { f64::NAN };
            Ok((self.last_batch_id, ResultData::new(0, energy.to_le_bytes().to_vec())))
        }
    }

    #[test]
    fn evaluation_error_surfaces_after_bounded_retries() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad_settings = settings(dir.path());
        bad_settings.nchains = 1;
        bad_settings.sampler.max_evaluation_retries = 2;
        let mut engine = EngineBuilder::new(bad_settings)
            .unwrap()
            .build_with_channel(NanAfterInitChannel { retrieves: 0, last_batch_id: 0 })
            .unwrap();
        engine.init_with_standard_normal_prior(0).unwrap();

        // The first `max_evaluation_retries` failing retrievals retry
        // silently; the one after that surfaces the error.
        for _ in 0..2 {
            engine.step().unwrap();
        }
        let err = engine.step().unwrap_err();
        assert!(matches!(err, StatelineError::Evaluation { chain_id: 0 }));
    }

    #[test]
    fn zero_nchains_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = settings(dir.path());
        bad.nchains = 0;
        let err = EngineBuilder::new(bad).unwrap_err();
        assert!(matches!(err, StatelineError::Config(_)));
    }
}
