//! Online estimators that turn observed accept/swap outcomes into proposal
//! scales and temperature ladders (spec §4.5).

mod beta;
mod block;
mod covariance;
mod proposal;
mod rate;
mod sigma;
mod window;

pub use beta::SlidingWindowBetaAdapter;
pub use block::BlockAdapter;
pub use covariance::CovarianceAdapter;
pub use proposal::gaussian_proposal;
pub use sigma::SlidingWindowSigmaAdapter;
pub use window::Window;
