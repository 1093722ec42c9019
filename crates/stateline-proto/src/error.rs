use thiserror::Error;

/// The engine's error taxonomy.
///
/// `Transport`, `WorkerTimeout` and a first-retry `Evaluation` are
/// recoverable and absorbed by the component that raises them; the rest
/// surface to the caller of `retrieve`/`step`.
#[derive(Debug, Error)]
pub enum StatelineError {
    /// Bus send/receive failure. Retried by the bus client; surfaced only
    /// if retries are exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// A worker's heartbeat expired. Non-fatal: its jobs are re-queued.
    #[error("worker {worker_id} timed out (no heartbeat for {elapsed_ms}ms)")]
    WorkerTimeout { worker_id: String, elapsed_ms: u64 },

    /// `result_energy`/`Combine::combine` produced a non-finite value or
    /// raised, tagged with the chain that was evaluating.
    #[error("chain {chain_id}: evaluation did not produce a finite energy")]
    Evaluation { chain_id: u32 },

    /// The persisted chain store failed a write. Fatal: the engine drains
    /// in-flight submits and halts.
    #[error("persistence error on chain {chain_id}: {message}")]
    Persistence { chain_id: u32, message: String },

    /// Invalid construction parameters (nstacks/nchains/ndims/path).
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StatelineError>;
