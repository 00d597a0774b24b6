//! Writing one file's model elements into the graph.
//!
//! A change is first classified against what the graph holds
//! ([`delta::compute`]), then applied as a bulk insert, a rebuild or a
//! node-by-node patch by the [`UpdateOrchestrator`].

pub mod delta;
pub mod deletion;
pub mod insert;
pub mod normalize;
pub mod orchestrator;
pub mod patch;

pub use delta::{Delta, DuplicateFilter, FileDelta, StoredElement};
pub use insert::ElementWriter;
pub use normalize::normalize;
pub use orchestrator::{SyncOutcome, UpdateOrchestrator};
