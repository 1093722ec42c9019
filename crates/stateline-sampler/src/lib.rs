//! The scheduling core (spec §4.4): the per-iteration retrieve/accept-
//! reject/swap/adapt/submit protocol, `flush()`, and the chain
//! initialisation sequence that seeds every chain before the first step.

mod initial;
mod propose;
mod sampler;

pub use initial::{InitialSampler, StandardNormalInitial};
pub use propose::{BlockProposal, CovarianceProposal, GaussianProposal, Propose};
pub use sampler::Sampler;
