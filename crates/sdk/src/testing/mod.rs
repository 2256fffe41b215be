//! Local testing environment: an in-memory chain with scripted swap history
//! and a background indexer driving a live view.

mod chain;
pub mod fixtures;
mod indexer;

pub use chain::MemoryChain;
pub use indexer::{IndexedSwaps, Indexer};
