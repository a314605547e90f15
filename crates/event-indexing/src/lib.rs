//! Event normalization pipeline: classifies raw chain logs by protocol
//! signature, resolves transaction-scoped ambiguities and persists canonical
//! events with idempotent, reorg-safe semantics.

pub mod abi;
pub mod attribution;
mod context;
pub mod handlers;
pub mod normalizer;
pub mod orphans;
pub mod parser;
pub mod registry;
pub mod storage;
pub mod triggers;
pub mod updater;

pub use {
    normalizer::{Normalizer, OnChainData, OrderResolving, ResolvedOrder},
    orphans::{BlockFetching, OrphanWatcher},
    parser::{BlockRange, RawLog},
    registry::{Registry, RegistryConfig},
    storage::EventStoring,
    updater::{EventUpdater, LogRetrieving, RangeInclusive},
};
