//! Protocol-agnostic domain types shared by the event normalization pipeline
//! and the fill-path planner.

pub mod events;
pub mod order;
pub mod triggers;

pub use alloy_primitives::{Address, B256, U256};
