//! The persisted, cached per-chain state store (spec §4.3).

mod chain_array;
mod state;

pub use chain_array::ChainArray;
pub use state::{State, SwapType};
