//! In-memory reference implementation of [`modelsync_api::GraphStore`].
//!
//! Topology lives in a petgraph `StableDiGraph`. A transaction keeps an undo
//! log of its own writes and replays it backwards on rollback, so its cost
//! follows the writes rather than the store size. The store can be persisted
//! to a zstd-compressed MessagePack file.

mod index;
mod memory;
mod persist;

pub use memory::{MemoryGraphStore, StoreStats};
pub use persist::STORE_FORMAT_VERSION;
