//! Wire types, settings objects and the error taxonomy shared by every
//! `stateline-*` crate.
//!
//! Nothing in this crate talks to a socket or a disk; it only defines the
//! shapes that the crates that do (`stateline-bus`, `stateline-store`, ...)
//! pass across their boundaries.

pub mod error;
pub mod job;
pub mod settings;
pub mod wire;

pub use error::StatelineError;
pub use job::{JobData, JobType, ResultData};
pub use settings::Settings;
pub use wire::{Frame, Message, Subject};
