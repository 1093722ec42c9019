//! Glue crate: assembles the bus, worker interface, chain array, adapters
//! and sampler into one `Engine`, driven by a single `Settings` aggregate
//! (spec §6).

mod engine;

pub use engine::{Engine, EngineBuilder, EngineStats};
pub use stateline_bus::DelegatorChannel;
pub use stateline_proto::settings::Settings;
pub use stateline_proto::{Result, StatelineError};
pub use stateline_sampler::{GaussianProposal, InitialSampler, Propose, StandardNormalInitial};
pub use stateline_worker::{Combine, Construct, DefaultCombine, DefaultConstruct};
