pub mod error;
pub mod expr;
pub mod listener;
pub mod models;
pub mod resource;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use error::{EvaluationError, StoreError, StoreResult};
pub use expr::{AccessRecord, ExpressionEngine, ModelAccess};
pub use listener::{ChangeEvent, ChangeListener};
pub use models::*;
pub use resource::{ModelResource, ParsedResource};
pub use store::{EdgeRecord, GraphStore, StoreMode};
