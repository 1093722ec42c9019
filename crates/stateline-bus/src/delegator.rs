use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use stateline_proto::{JobType, Message, ResultData, Result, StatelineError, Subject};
use stateline_worker::JobChannel;
use tracing::{debug, info, warn};
use zeromq::{RouterSocket, Socket, SocketRecv, SocketSend};

/// How often `poll_once` checks for workers that have gone silent past
/// their heartbeat timeout.
const STALE_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

struct InFlight {
    batch_id: u64,
    job_type: JobType,
    payload: Vec<u8>,
}

struct WorkerState {
    job_types: Vec<JobType>,
    last_seen: Instant,
    current: Option<InFlight>,
}

/// The delegator side of the bus (spec §4.1): binds a ROUTER socket,
/// tracks connected workers, and runs a per-job-type FIFO idle-worker
/// queue against a per-job-type FIFO pending-job queue.
///
/// Runs on the sampler's single thread: every public method blocks on a
/// small current-thread runtime rather than handing control to a
/// background task, so the sampler's "blocks only on retrieve" invariant
/// holds even though the socket itself is async.
pub struct Delegator {
    socket: RouterSocket,
    rt: tokio::runtime::Runtime,
    workers: HashMap<Vec<u8>, WorkerState>,
    idle: HashMap<JobType, VecDeque<Vec<u8>>>,
    pending: HashMap<JobType, VecDeque<(u64, Vec<u8>)>>,
    completed: VecDeque<(u64, ResultData)>,
    heartbeat_timeout: Duration,
    heartbeat_rate: Duration,
    last_sweep: Instant,
    last_heartbeat: Instant,
}

impl Delegator {
    /// `heartbeat_rate` is how often this delegator broadcasts HEARTBEAT to
    /// every connected worker; `heartbeat_timeout` is how long a worker may
    /// go silent before `sweep_stale_workers` drops it (spec §4.1,
    /// "Heartbeat: the delegator sends HEARTBEAT at `rate` ms...
    /// symmetrically on the worker side").
    pub fn bind(addr: &str, heartbeat_rate: Duration, heartbeat_timeout: Duration) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StatelineError::Transport(e.to_string()))?;

        let mut socket = RouterSocket::new();
        rt.block_on(socket.bind(addr))
            .map_err(|e| StatelineError::Transport(e.to_string()))?;

        info!(%addr, "delegator bound");

        Ok(Self {
            socket,
            rt,
            workers: HashMap::new(),
            idle: HashMap::new(),
            pending: HashMap::new(),
            completed: VecDeque::new(),
            heartbeat_timeout,
            heartbeat_rate,
            last_sweep: Instant::now(),
            last_heartbeat: Instant::now(),
        })
    }

    /// Enqueues `payload` under `job_type`/`batch_id`, dispatching
    /// immediately to an idle worker if one is registered for that type.
    pub fn queue_job(&mut self, job_type: JobType, batch_id: u64, payload: Vec<u8>) -> Result<()> {
        self.pending.entry(job_type).or_default().push_back((batch_id, payload));
        self.try_dispatch(job_type)
    }

    fn try_dispatch(&mut self, job_type: JobType) -> Result<()> {
        loop {
            let Some(idle_queue) = self.idle.get_mut(&job_type) else { return Ok(()) };
            let Some(identity) = idle_queue.pop_front() else { return Ok(()) };
            let Some(pending_queue) = self.pending.get_mut(&job_type) else {
                idle_queue.push_front(identity);
                return Ok(());
            };
            let Some((batch_id, payload)) = pending_queue.pop_front() else {
                idle_queue.push_front(identity);
                return Ok(());
            };

            let msg = Message::job(job_type, batch_id, payload.clone());
            self.send_to(&identity, msg)?;

            if let Some(worker) = self.workers.get_mut(&identity) {
                worker.current = Some(InFlight { batch_id, job_type, payload });
            }
        }
    }

    /// ROUTER sends `[identity, ...msg frames]` — no REQ/REP-style empty
    /// delimiter frame (zeromq-rs's ROUTER/DEALER pair doesn't carry one;
    /// matches `casparian_sentinel::Sentinel`'s `[identity, header,
    /// payload]` framing).
    fn send_to(&mut self, identity: &[u8], msg: Message) -> Result<()> {
        let mut multipart = zeromq::ZmqMessage::from(identity.to_vec());
        for part in msg.into_parts() {
            multipart.push_back(part.into());
        }
        self.rt
            .block_on(self.socket.send(multipart))
            .map_err(|e| StatelineError::Transport(e.to_string()))
    }

    /// Pops one completed result, if any is already buffered.
    pub fn pop_completed(&mut self) -> Option<(u64, ResultData)> {
        self.completed.pop_front()
    }

    /// Blocks up to `timeout` for the next inbound frame, processes it,
    /// then runs the periodic stale-worker sweep.
    pub fn poll_once(&mut self, timeout: Duration) -> Result<()> {
        let recv = self.rt.block_on(async {
            tokio::time::timeout(timeout, self.socket.recv()).await
        });

        match recv {
            Ok(Ok(multipart)) => self.handle_multipart(multipart)?,
            Ok(Err(e)) => return Err(StatelineError::Transport(e.to_string())),
            Err(_) => {} // timed out, nothing arrived
        }

        if self.last_sweep.elapsed() >= STALE_SWEEP_INTERVAL {
            self.last_sweep = Instant::now();
            self.sweep_stale_workers();
        }
        if self.last_heartbeat.elapsed() >= self.heartbeat_rate {
            self.last_heartbeat = Instant::now();
            self.broadcast_heartbeat()?;
        }
        Ok(())
    }

    /// Sends HEARTBEAT to every connected worker so idle workers don't time
    /// each other's silence out as staleness (spec §4.1, symmetric to
    /// `WorkerClient::run`'s own heartbeat-on-idle loop).
    fn broadcast_heartbeat(&mut self) -> Result<()> {
        let identities: Vec<Vec<u8>> = self.workers.keys().cloned().collect();
        for identity in identities {
            self.send_to(&identity, Message::heartbeat())?;
        }
        Ok(())
    }

    fn handle_multipart(&mut self, multipart: zeromq::ZmqMessage) -> Result<()> {
        let mut parts: Vec<Vec<u8>> = multipart.into_vec().into_iter().map(|b| b.to_vec()).collect();
        if parts.len() < 2 {
            warn!("dropped malformed multipart: fewer than [identity, subject, ...] frames");
            return Ok(());
        }
        let identity = parts.remove(0);
        let msg = Message::from_parts(parts)?;
        self.handle_message(identity, msg)
    }

    fn handle_message(&mut self, identity: Vec<u8>, msg: Message) -> Result<()> {
        match msg.subject {
            Subject::Hello => {
                let list = String::from_utf8_lossy(&msg.frames[0]).to_string();
                let job_types: Vec<JobType> = list
                    .split(':')
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| s.parse().ok())
                    .collect();
                info!(worker = ?identity, ?job_types, "worker registered");
                for &jt in &job_types {
                    self.idle.entry(jt).or_default().push_back(identity.clone());
                }
                self.workers.insert(identity, WorkerState { job_types: job_types.clone(), last_seen: Instant::now(), current: None });
                for jt in job_types {
                    self.try_dispatch(jt)?;
                }
            }
            Subject::Heartbeat => {
                if let Some(worker) = self.workers.get_mut(&identity) {
                    worker.last_seen = Instant::now();
                } else {
                    debug!(worker = ?identity, "heartbeat from unknown worker");
                }
            }
            Subject::Result => {
                let batch_id = msg.batch_id(0)?;
                let payload = msg.frames.get(1).cloned().unwrap_or_default();
                let job_type = self
                    .workers
                    .get(&identity)
                    .and_then(|w| w.current.as_ref())
                    .map(|c| c.job_type)
                    .unwrap_or(0);
                self.completed.push_back((batch_id, ResultData::new(job_type, payload)));

                let job_types = if let Some(worker) = self.workers.get_mut(&identity) {
                    worker.last_seen = Instant::now();
                    worker.current = None;
                    worker.job_types.clone()
                } else {
                    Vec::new()
                };
                for jt in &job_types {
                    self.idle.entry(*jt).or_default().push_back(identity.clone());
                }
                for jt in job_types {
                    self.try_dispatch(jt)?;
                }
            }
            Subject::Goodbye => {
                info!(worker = ?identity, "worker disconnected");
                self.remove_worker(&identity);
            }
            Subject::Job => {
                warn!("delegator received a JOB frame, which only it should send");
            }
        }
        Ok(())
    }

    fn remove_worker(&mut self, identity: &[u8]) {
        if let Some(worker) = self.workers.remove(identity) {
            for jt in &worker.job_types {
                if let Some(queue) = self.idle.get_mut(jt) {
                    queue.retain(|id| id != identity);
                }
            }
            if let Some(in_flight) = worker.current {
                self.pending
                    .entry(in_flight.job_type)
                    .or_default()
                    .push_front((in_flight.batch_id, in_flight.payload));
            }
        }
    }

    /// Drops workers that haven't sent a HELLO/HEARTBEAT/RESULT within
    /// `heartbeat_timeout` and re-queues whatever job they were holding.
    fn sweep_stale_workers(&mut self) {
        let cutoff = Instant::now() - self.heartbeat_timeout;
        let stale: Vec<Vec<u8>> = self
            .workers
            .iter()
            .filter(|(_, w)| w.last_seen < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for identity in stale {
            warn!(worker = ?identity, "worker timed out, re-queueing its job");
            self.remove_worker(&identity);
        }
    }

    /// Number of workers currently registered (connected and not yet
    /// swept as stale).
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of jobs of `job_type` waiting for an idle worker.
    pub fn queue_depth(&self, job_type: JobType) -> usize {
        self.pending.get(&job_type).map_or(0, VecDeque::len)
    }

    /// Broadcasts GOODBYE to every connected worker (orderly shutdown,
    /// spec §6).
    pub fn broadcast_goodbye(&mut self) -> Result<()> {
        let identities: Vec<Vec<u8>> = self.workers.keys().cloned().collect();
        for identity in identities {
            self.send_to(&identity, Message::goodbye())?;
        }
        Ok(())
    }
}

/// Adapts a [`Delegator`] to the [`JobChannel`] the worker interface
/// drives its fan-out/fan-in over.
pub struct DelegatorChannel {
    delegator: Delegator,
    poll_timeout: Duration,
}

impl DelegatorChannel {
    pub fn new(delegator: Delegator, poll_timeout: Duration) -> Self {
        Self { delegator, poll_timeout }
    }

    pub fn broadcast_goodbye(&mut self) -> Result<()> {
        self.delegator.broadcast_goodbye()
    }

    pub fn worker_count(&self) -> usize {
        self.delegator.worker_count()
    }

    pub fn queue_depth(&self, job_type: stateline_proto::JobType) -> usize {
        self.delegator.queue_depth(job_type)
    }
}

impl JobChannel for DelegatorChannel {
    fn send_job(&mut self, batch_id: u64, job: stateline_proto::JobData) -> Result<()> {
        self.delegator.queue_job(job.job_type, batch_id, job.payload)
    }

    fn recv_result(&mut self) -> Result<(u64, ResultData)> {
        loop {
            if let Some(item) = self.delegator.pop_completed() {
                return Ok(item);
            }
            self.delegator.poll_once(self.poll_timeout)?;
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.delegator.broadcast_goodbye()
    }
}
