//! The message bus wire protocol (spec §6).
//!
//! A frame on the wire is `[routing identity, subject byte, ...payload
//! frames]` — zeromq-rs's ROUTER/DEALER pair prepends only the identity
//! frame (no REQ/REP-style empty delimiter); everything from the subject
//! byte on is ours.

use crate::error::StatelineError;

pub type Frame = Vec<u8>;

/// The five message subjects of the bus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Subject {
    /// worker -> delegator: colon-separated job-type list.
    Hello = 0,
    /// both ways: no payload frames.
    Heartbeat = 1,
    /// delegator -> worker: job-type, batch-id, payload.
    Job = 3,
    /// worker -> delegator: batch-id, payload.
    Result = 4,
    /// either direction: no payload frames.
    Goodbye = 5,
}

impl Subject {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Subject {
    type Error = StatelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Subject::Hello),
            1 => Ok(Subject::Heartbeat),
            3 => Ok(Subject::Job),
            4 => Ok(Subject::Result),
            5 => Ok(Subject::Goodbye),
            other => Err(StatelineError::Transport(format!("unknown subject byte {other}"))),
        }
    }
}

/// A decoded message, without its ROUTER envelope.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: Subject,
    pub frames: Vec<Frame>,
}

impl Message {
    pub fn new(subject: Subject, frames: Vec<Frame>) -> Self {
        Self { subject, frames }
    }

    pub fn hello(job_types: &[u32]) -> Self {
        let list = job_types.iter().map(u32::to_string).collect::<Vec<_>>().join(":");
        Self::new(Subject::Hello, vec![list.into_bytes()])
    }

    pub fn heartbeat() -> Self {
        Self::new(Subject::Heartbeat, Vec::new())
    }

    pub fn goodbye() -> Self {
        Self::new(Subject::Goodbye, Vec::new())
    }

    pub fn job(job_type: u32, batch_id: u64, payload: Frame) -> Self {
        Self::new(
            Subject::Job,
            vec![job_type.to_be_bytes().to_vec(), batch_id.to_be_bytes().to_vec(), payload],
        )
    }

    pub fn result(batch_id: u64, payload: Frame) -> Self {
        Self::new(Subject::Result, vec![batch_id.to_be_bytes().to_vec(), payload])
    }

    /// Serialise into the wire's frame order, *without* the leading ROUTER
    /// identity frame (the bus client adds that).
    pub fn into_parts(self) -> Vec<Frame> {
        let mut parts = Vec::with_capacity(1 + self.frames.len());
        parts.push(vec![self.subject.as_byte()]);
        parts.extend(self.frames);
        parts
    }

    /// Parse the subject-and-payload portion of a multipart message (the
    /// leading ROUTER identity frame must already have been stripped by
    /// the caller).
    pub fn from_parts(mut parts: Vec<Frame>) -> Result<Self, StatelineError> {
        if parts.is_empty() {
            return Err(StatelineError::Transport("empty message".into()));
        }
        let subject_frame = parts.remove(0);
        let subject_byte = *subject_frame
            .first()
            .ok_or_else(|| StatelineError::Transport("empty subject frame".into()))?;
        let subject = Subject::try_from(subject_byte)?;
        Ok(Self { subject, frames: parts })
    }

    pub fn job_type(&self) -> Result<u32, StatelineError> {
        self.frames
            .first()
            .and_then(|f| f.as_slice().try_into().ok())
            .map(u32::from_be_bytes)
            .ok_or_else(|| StatelineError::Transport("JOB frame missing job-type".into()))
    }

    pub fn batch_id(&self, index: usize) -> Result<u64, StatelineError> {
        self.frames
            .get(index)
            .and_then(|f| f.as_slice().try_into().ok())
            .map(u64::from_be_bytes)
            .ok_or_else(|| StatelineError::Transport("message missing batch-id frame".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips_job_type_list() {
        let msg = Message::hello(&[0, 1, 2]);
        assert_eq!(msg.subject, Subject::Hello);
        assert_eq!(msg.frames[0], b"0:1:2".to_vec());
    }

    #[test]
    fn job_round_trips_job_type_and_batch_id() {
        let msg = Message::job(3, 42, vec![9, 9]);
        let parts = msg.into_parts();
        let decoded = Message::from_parts(parts).unwrap();
        assert_eq!(decoded.subject, Subject::Job);
        assert_eq!(decoded.job_type().unwrap(), 3);
        assert_eq!(decoded.batch_id(1).unwrap(), 42);
        assert_eq!(decoded.frames[2], vec![9, 9]);
    }

    #[test]
    fn unknown_subject_byte_is_rejected() {
        let err = Subject::try_from(200u8).unwrap_err();
        assert!(matches!(err, StatelineError::Transport(_)));
    }
}
