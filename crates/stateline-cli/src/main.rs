//! Delegator binary (spec §6): binds the message bus, loads `Settings`
//! from an optional TOML file layered under CLI flags, initialises
//! tracing and (optionally) a Prometheus metrics endpoint, then drives
//! the sampler loop until `--steps` complete or SIGINT is received.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use stateline_engine::{Engine, EngineBuilder};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "parallel-tempered MCMC sampling engine delegator")]
struct Cli {
    /// Path to a stateline.toml config file. CLI flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// ROUTER-socket bind address workers connect to.
    #[arg(long, default_value = "tcp://0.0.0.0:5555")]
    bind: String,

    /// Number of temperature stacks.
    #[arg(long)]
    nstacks: Option<usize>,

    /// Number of chains per stack.
    #[arg(long)]
    nchains: Option<usize>,

    /// Dimensionality of the target distribution.
    #[arg(long)]
    ndims: Option<usize>,

    /// Directory backing the persisted chain store.
    #[arg(long)]
    database_path: Option<String>,

    /// Recover chain state from an existing database at `database_path`.
    #[arg(long)]
    recover: bool,

    /// Attempt a swap every this many accepted steps of a chain.
    #[arg(long)]
    swap_interval: Option<u64>,

    /// Number of sampling steps to run before exiting.
    #[arg(long, default_value_t = 100_000)]
    steps: u64,

    /// Seed for the proposal/accept-reject RNG and the default initial-sample prior.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Sampling steps between metrics/log progress reports.
    #[arg(long, default_value_t = 1_000)]
    report_interval: u64,

    /// `tracing-subscriber` env-filter, e.g. "info" or "stateline_sampler=debug".
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional address to expose Prometheus metrics on (disabled if unset).
    #[arg(long)]
    metrics_bind: Option<SocketAddr>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Some(addr) = cli.metrics_bind {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install the Prometheus metrics exporter")?;
        tracing::info!(%addr, "metrics endpoint listening");
    }

    let mut settings = config::load(cli.config.as_deref())?;
    config::apply_overrides(&mut settings, &cli);

    let mut engine = EngineBuilder::new(settings)
        .context("invalid settings")?
        .seed(cli.seed)
        .bind(&cli.bind)
        .with_context(|| format!("failed to bind the delegator socket at {}", cli.bind))?;

    let shutdown = engine.shutdown_flag();
    ctrlc::set_handler(move || {
        tracing::info!("received interrupt, stopping after the in-flight step");
        shutdown.store(true, Ordering::Relaxed);
    })
    .context("failed to install the SIGINT handler")?;

    tracing::info!(
        nstacks = engine.nstacks(),
        nchains = engine.nchains(),
        ndims = engine.ndims(),
        bind = %cli.bind,
        "initialising chains"
    );
    engine.init_with_standard_normal_prior(cli.seed)?;

    let mut completed = 0u64;
    while completed < cli.steps {
        let batch = cli.report_interval.min(cli.steps - completed);
        let ran = engine.run(batch)?;
        completed += ran;
        report(&engine, completed);
        if ran < batch {
            tracing::info!(completed, "shutdown requested, stopping early");
            break;
        }
    }

    tracing::info!(completed, "sampling loop finished, flushing in-flight evaluations");
    engine.shutdown()?;
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Emits a progress log line and, if a recorder was installed via
/// `--metrics-bind`, Prometheus gauges for worker count, pending
/// evaluations, and per-chain accept/swap rates. `metrics::gauge!` is a
/// no-op when no recorder is installed, so this is safe to call
/// unconditionally.
fn report(engine: &Engine<stateline_engine::DelegatorChannel>, completed: u64) {
    let stats = engine.stats();
    tracing::info!(
        completed,
        pending = stats.pending_count,
        workers = engine.worker_count(),
        "progress"
    );

    metrics::gauge!("stateline_worker_count").set(engine.worker_count() as f64);
    metrics::gauge!("stateline_pending_evaluations").set(stats.pending_count as f64);
    for (chain_id, rate) in stats.accept_rates.iter().enumerate() {
        metrics::gauge!("stateline_accept_rate", "chain" => chain_id.to_string()).set(*rate);
    }
    for (chain_id, rate) in stats.swap_rates.iter().enumerate() {
        metrics::gauge!("stateline_swap_rate", "chain" => chain_id.to_string()).set(*rate);
    }
}
