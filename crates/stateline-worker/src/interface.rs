use std::collections::HashMap;

use stateline_proto::{Result, ResultData, StatelineError};

use crate::traits::{Combine, Construct, JobChannel};

struct PendingJob {
    x_prop: Vec<f64>,
    expected: usize,
    received: Vec<Option<ResultData>>,
}

/// The submit/retrieve contract (spec §4.2). The pending-job table is a
/// contiguous `Vec` indexed by chain id rather than a hash map, since every
/// chain has at most one outstanding evaluation at a time.
pub struct WorkerInterface {
    construct: Box<dyn Construct>,
    combine: Box<dyn Combine>,
    pending: Vec<Option<PendingJob>>,
    batch_to_chain: HashMap<u64, usize>,
    next_batch_id: u64,
}

impl WorkerInterface {
    pub fn new(ntotal: usize, construct: Box<dyn Construct>, combine: Box<dyn Combine>) -> Self {
        Self {
            construct,
            combine,
            pending: (0..ntotal).map(|_| None).collect(),
            batch_to_chain: HashMap::new(),
            next_batch_id: 0,
        }
    }

    pub fn is_pending(&self, i: usize) -> bool {
        self.pending[i].is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.iter().filter(|p| p.is_some()).count()
    }

    /// Constructs `job_construct(x)`'s jobs, sends each over `channel`
    /// under a fresh batch id, and records chain `i` as having an
    /// outstanding evaluation. Submitting while `i` already has one
    /// outstanding is a config error (spec's one-outstanding-per-chain
    /// invariant).
    pub fn submit<C: JobChannel>(&mut self, channel: &mut C, i: usize, x: Vec<f64>) -> Result<()> {
        if self.pending[i].is_some() {
            return Err(StatelineError::Config(format!(
                "chain {i} already has an outstanding evaluation"
            )));
        }
        let jobs = self.construct.construct(&x);
        let expected = jobs.len();
        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;

        for job in jobs {
            channel.send_job(batch_id, job)?;
        }

        self.pending[i] = Some(PendingJob { x_prop: x, expected, received: vec![None; expected] });
        self.batch_to_chain.insert(batch_id, i);
        Ok(())
    }

    /// Blocks on `channel` until one submitted batch completes, combining
    /// its sub-results with `result_energy`. Results for batches the
    /// interface no longer tracks (already retried or flushed) are
    /// silently dropped. A combine failure or a non-finite combined energy
    /// both surface as `EvaluationError` (spec §4.2); either way the
    /// chain's pending entry is kept (with its original `x_prop`) so the
    /// caller can `resubmit` it.
    pub fn retrieve<C: JobChannel>(&mut self, channel: &mut C) -> Result<(usize, f64)> {
        loop {
            let (batch_id, result) = channel.recv_result()?;
            let Some(&chain_id) = self.batch_to_chain.get(&batch_id) else {
                continue;
            };

            let complete = {
                let pending = self.pending[chain_id]
                    .as_mut()
                    .expect("batch_to_chain entry implies a live pending slot");
                if let Some(slot) = pending.received.iter_mut().find(|r| r.is_none()) {
                    *slot = Some(result);
                }
                pending.received.iter().all(Option::is_some)
            };

            if !complete {
                continue;
            }

            self.batch_to_chain.remove(&batch_id);
            let pending = self.pending[chain_id]
                .as_mut()
                .expect("batch_to_chain entry implies a live pending slot");
            let results: Vec<ResultData> = pending.received.drain(..).map(|r| r.unwrap()).collect();

            match self.combine.combine(&results) {
                Ok(energy) if energy.is_finite() => {
                    self.pending[chain_id] = None;
                    return Ok((chain_id, energy));
                }
                Ok(_) | Err(_) => {
                    pending.received = vec![None; pending.expected];
                    return Err(StatelineError::Evaluation { chain_id: chain_id as u32 });
                }
            }
        }
    }

    /// Re-submits chain `i`'s last proposal with a fresh batch id
    /// (deterministic retry after an `EvaluationError`, spec §4.3).
    pub fn resubmit<C: JobChannel>(&mut self, channel: &mut C, i: usize) -> Result<()> {
        let x_prop = self.pending[i]
            .take()
            .map(|p| p.x_prop)
            .ok_or_else(|| StatelineError::Config(format!("chain {i} has no pending evaluation to retry")))?;
        self.submit(channel, i, x_prop)
    }
}
