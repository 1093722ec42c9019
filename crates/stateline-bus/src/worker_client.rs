use std::time::Duration;

use stateline_proto::{JobData, Message, Result, StatelineError, Subject};
use tracing::{info, warn};
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend};

/// A single job-type handler run by a worker process: decodes a job's
/// payload and returns the result's.
pub trait Evaluate: Send {
    fn evaluate(&mut self, payload: &[u8]) -> Vec<u8>;
}

/// The worker-process side of the bus (spec §4.1, "Worker" in the
/// original protocol): connects a DEALER socket, announces the job types
/// it accepts, and loops receiving JOB frames and replying with RESULT
/// frames, sending a HEARTBEAT whenever it has gone `heartbeat_rate`
/// without otherwise talking to the delegator.
pub struct WorkerClient {
    socket: DealerSocket,
    rt: tokio::runtime::Runtime,
    poll_rate: Duration,
    heartbeat_rate: Duration,
}

impl WorkerClient {
    pub fn connect(addr: &str, job_types: &[u32], poll_rate: Duration, heartbeat_rate: Duration) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StatelineError::Transport(e.to_string()))?;

        let mut socket = DealerSocket::new();
        rt.block_on(socket.connect(addr)).map_err(|e| StatelineError::Transport(e.to_string()))?;

        let mut client = Self { socket, rt, poll_rate, heartbeat_rate };
        client.send(Message::hello(job_types))?;
        info!(%addr, ?job_types, "worker connected");
        Ok(client)
    }

    fn send(&mut self, msg: Message) -> Result<()> {
        let mut iter = msg.into_parts().into_iter();
        let mut multipart = zeromq::ZmqMessage::from(iter.next().expect("subject frame always present"));
        for part in iter {
            multipart.push_back(part.into());
        }
        self.rt
            .block_on(self.socket.send(multipart))
            .map_err(|e| StatelineError::Transport(e.to_string()))
    }

    /// Runs forever: for each JOB received, dispatches it to the handler
    /// registered for that job type and replies with a RESULT. Sends
    /// HEARTBEAT on the configured cadence between jobs so the delegator
    /// doesn't consider this worker stale while idle.
    pub fn run(&mut self, mut handlers: std::collections::HashMap<u32, Box<dyn Evaluate>>) -> Result<()> {
        let mut last_talk = std::time::Instant::now();
        loop {
            let recv = self.rt.block_on(async {
                tokio::time::timeout(self.poll_rate, self.socket.recv()).await
            });

            match recv {
                Ok(Ok(multipart)) => {
                    let parts: Vec<Vec<u8>> = multipart.into_vec().into_iter().map(|b| b.to_vec()).collect();
                    let msg = Message::from_parts(parts)?;
                    match msg.subject {
                        Subject::Job => {
                            let job_type = msg.job_type()?;
                            let batch_id = msg.batch_id(1)?;
                            let payload = msg.frames.get(2).cloned().unwrap_or_default();
                            let job = JobData::new(job_type, payload);
                            let reply = match handlers.get_mut(&job_type) {
                                Some(handler) => handler.evaluate(&job.payload),
                                None => {
                                    warn!(job_type, "no handler registered for job type");
                                    Vec::new()
                                }
                            };
                            self.send(Message::result(batch_id, reply))?;
                            last_talk = std::time::Instant::now();
                        }
                        Subject::Goodbye => {
                            info!("delegator said goodbye, shutting down");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                Ok(Err(e)) => return Err(StatelineError::Transport(e.to_string())),
                Err(_) => {} // poll timeout
            }

            if last_talk.elapsed() >= self.heartbeat_rate {
                self.send(Message::heartbeat())?;
                last_talk = std::time::Instant::now();
            }
        }
    }
}
