use serde::{Deserialize, Serialize};

pub type JobType = u32;

/// One unit of work dispatched to a worker: `job_construct(x)` returns an
/// ordered list of these (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobData {
    pub job_type: JobType,
    pub payload: Vec<u8>,
}

impl JobData {
    pub fn new(job_type: JobType, payload: Vec<u8>) -> Self {
        Self { job_type, payload }
    }
}

/// One worker's reply to a `JobData`. `result_energy` combines a batch's
/// `ResultData`s into a single scalar energy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultData {
    pub job_type: JobType,
    pub payload: Vec<u8>,
}

impl ResultData {
    pub fn new(job_type: JobType, payload: Vec<u8>) -> Self {
        Self { job_type, payload }
    }
}
