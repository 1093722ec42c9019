//! The submit/retrieve worker interface (spec §4.2): job fan-out,
//! result fan-in, and the per-chain pending-job table.

mod interface;
mod traits;

pub use interface::WorkerInterface;
pub use traits::{Combine, Construct, DefaultCombine, DefaultConstruct, JobChannel, SumCombine};

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use stateline_proto::{JobData, ResultData};

    use super::*;

    /// An in-process channel standing in for the bus, used to exercise
    /// submit/retrieve/resubmit without a live socket.
    struct MockChannel {
        inbox: VecDeque<JobData>,
        outbox: VecDeque<(u64, ResultData)>,
    }

    impl MockChannel {
        fn new() -> Self {
            Self { inbox: VecDeque::new(), outbox: VecDeque::new() }
        }
    }

    impl JobChannel for MockChannel {
        fn send_job(&mut self, batch_id: u64, job: JobData) -> stateline_proto::Result<()> {
            self.inbox.push_back(job.clone());
            let echoed = f64::from_le_bytes(job.payload[..8].try_into().unwrap()) * 2.0;
            self.outbox.push_back((batch_id, ResultData::new(job.job_type, echoed.to_le_bytes().to_vec())));
            Ok(())
        }

        fn recv_result(&mut self) -> stateline_proto::Result<(u64, ResultData)> {
            self.outbox
                .pop_front()
                .ok_or_else(|| stateline_proto::StatelineError::Transport("no results queued".into()))
        }
    }

    #[test]
    fn submit_then_retrieve_round_trips() {
        let mut channel = MockChannel::new();
        let mut iface = WorkerInterface::new(1, Box::new(DefaultConstruct), Box::new(DefaultCombine));
        iface.submit(&mut channel, 0, vec![3.0]).unwrap();
        let (chain_id, energy) = iface.retrieve(&mut channel).unwrap();
        assert_eq!(chain_id, 0);
        assert_eq!(energy, 6.0);
        assert!(!iface.is_pending(0));
    }

    #[test]
    fn double_submit_without_retrieve_is_rejected() {
        let mut channel = MockChannel::new();
        let mut iface = WorkerInterface::new(1, Box::new(DefaultConstruct), Box::new(DefaultCombine));
        iface.submit(&mut channel, 0, vec![1.0]).unwrap();
        let err = iface.submit(&mut channel, 0, vec![2.0]).unwrap_err();
        assert!(matches!(err, stateline_proto::StatelineError::Config(_)));
    }

    #[test]
    fn non_finite_energy_surfaces_as_evaluation_error_and_can_be_resubmitted() {
        struct NanConstruct;
        impl Construct for NanConstruct {
            fn construct(&self, x: &[f64]) -> Vec<JobData> {
                vec![JobData::new(0, x[0].to_le_bytes().to_vec())]
            }
        }
        struct NanChannel;
        impl JobChannel for NanChannel {
            fn send_job(&mut self, _batch_id: u64, _job: JobData) -> stateline_proto::Result<()> {
                Ok(())
            }
            fn recv_result(&mut self) -> stateline_proto::Result<(u64, ResultData)> {
                Ok((0, ResultData::new(0, f64::NAN.to_le_bytes().to_vec())))
            }
        }

        let mut channel = NanChannel;
        let mut iface = WorkerInterface::new(1, Box::new(NanConstruct), Box::new(DefaultCombine));
        iface.submit(&mut channel, 0, vec![1.0]).unwrap();
        let err = iface.retrieve(&mut channel).unwrap_err();
        assert!(matches!(err, stateline_proto::StatelineError::Evaluation { chain_id: 0 }));
        assert!(iface.is_pending(0));
        iface.resubmit(&mut channel, 0).unwrap();
        assert!(iface.is_pending(0));
    }

    #[test]
    fn fan_out_sums_sub_results() {
        struct FanOutFour;
        impl Construct for FanOutFour {
            fn construct(&self, x: &[f64]) -> Vec<JobData> {
                (0..4).map(|_| JobData::new(0, x[0].to_le_bytes().to_vec())).collect()
            }
        }

        let mut channel = MockChannel::new();
        let mut iface = WorkerInterface::new(1, Box::new(FanOutFour), Box::new(SumCombine));
        iface.submit(&mut channel, 0, vec![1.5]).unwrap();
        let (chain_id, energy) = iface.retrieve(&mut channel).unwrap();
        assert_eq!(chain_id, 0);
        assert_eq!(energy, 4.0 * 3.0);
    }
}
