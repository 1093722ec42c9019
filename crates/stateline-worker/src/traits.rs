use stateline_proto::{JobData, Result};

/// `job_construct(x)`: splits one proposal into an ordered list of jobs
/// (spec §4.2). The default implementation is one job carrying the raw
/// parameter vector.
pub trait Construct: Send {
    fn construct(&self, x: &[f64]) -> Vec<JobData>;
}

/// `result_energy([sub_result])`: combines a batch's sub-results into a
/// single scalar energy. Must return a finite value; anything else is an
/// `EvaluationError` tagged with the owning chain by the caller.
pub trait Combine: Send {
    fn combine(&self, results: &[stateline_proto::ResultData]) -> Result<f64>;
}

/// The default one-job-per-sample construction: the raw parameter vector,
/// little-endian `f64` payload, sent under job type `0`.
pub struct DefaultConstruct;

impl Construct for DefaultConstruct {
    fn construct(&self, x: &[f64]) -> Vec<JobData> {
        let mut payload = Vec::with_capacity(x.len() * 8);
        for v in x {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        vec![JobData::new(0, payload)]
    }
}

/// The default single-job combine: decode one `f64` back out of the lone
/// sub-result's payload.
pub struct DefaultCombine;

impl Combine for DefaultCombine {
    fn combine(&self, results: &[stateline_proto::ResultData]) -> Result<f64> {
        let result = results.first().ok_or_else(|| {
            stateline_proto::StatelineError::Evaluation { chain_id: u32::MAX }
        })?;
        let bytes: [u8; 8] = result.payload[..8]
            .try_into()
            .map_err(|_| stateline_proto::StatelineError::Evaluation { chain_id: u32::MAX })?;
        Ok(f64::from_le_bytes(bytes))
    }
}

/// A summing combine for fan-out jobs: sums each sub-result's lone `f64`
/// payload (the "fan-out job" end-to-end scenario, spec §8).
pub struct SumCombine;

impl Combine for SumCombine {
    fn combine(&self, results: &[stateline_proto::ResultData]) -> Result<f64> {
        let mut total = 0.0;
        for result in results {
            let bytes: [u8; 8] = result.payload[..8]
                .try_into()
                .map_err(|_| stateline_proto::StatelineError::Evaluation { chain_id: u32::MAX })?;
            total += f64::from_le_bytes(bytes);
        }
        Ok(total)
    }
}

/// A decoupled send/receive channel to the message bus. Implemented by
/// `stateline-bus`'s delegator client; kept as a trait here so the worker
/// interface's fan-out/fan-in logic is testable without a live socket
/// (mirrors how a subprocess's stdout reader thread is kept behind a
/// channel rather than polled directly).
pub trait JobChannel: Send {
    /// Sends `job` tagged with `batch_id`, the identity the bus threads
    /// through to the eventual `RESULT` frame.
    fn send_job(&mut self, batch_id: u64, job: JobData) -> Result<()>;

    /// Blocks until one result is available, or returns `WorkerTimeout`/
    /// `Transport` if the bus detects a disconnect.
    fn recv_result(&mut self) -> Result<(u64, stateline_proto::ResultData)>;

    /// Orderly shutdown hook (spec §6, GOODBYE on delegator stop). The
    /// mock channel used in tests has nothing to notify, so this defaults
    /// to a no-op.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
