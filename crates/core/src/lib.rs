//! Incremental synchronization of model files into a property graph.
//!
//! Key features:
//! - **Delta sync**: per-file patch or rebuild chosen from the change ratio
//! - **Proxies**: cross-file references kept pending until their target exists
//! - **Derived attributes**: values computed from expressions, invalidated by
//!   the accesses they recorded
//! - **Indexed attributes**: value lookups through store indexes

pub mod cache;
pub mod change;
pub mod chunk;
pub mod config;
pub mod derive;
pub mod engine;
pub mod error;
pub mod graph;
pub mod indexed;
pub mod logging;
pub mod proxy;
pub mod sync;
pub mod tx;

pub use change::{ChangeLog, ListenerSet, SyncStats, SyncStrategy, TracingListener};
pub use config::SyncConfig;
pub use derive::{DerivationReport, ExpressionRegistry, PATH_LANGUAGE, PathEngine};
pub use engine::{GraphStats, SyncEngine};
pub use error::{Result, SyncError};
pub use graph::{DerivedState, RegisteredMetamodel};
pub use proxy::ResolveReport;
