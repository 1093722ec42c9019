//! The ROUTER/DEALER message bus (spec §4.1): delegator-side job dispatch
//! and the client a worker process uses to talk back to it.

mod delegator;
mod worker_client;

pub use delegator::{Delegator, DelegatorChannel};
pub use worker_client::{Evaluate, WorkerClient};
