use crate::models::{EdgeId, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),
    #[error("no transaction is open")]
    NoTransaction,
    #[error("a transaction is already open")]
    TransactionActive,
    #[error("cannot switch store mode while a transaction is open")]
    ModeSwitchInTransaction,
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure of a single derived-attribute evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("syntax error in `{logic}`: {message}")]
    Syntax { logic: String, message: String },
    #[error("type error: {0}")]
    Type(String),
    #[error("derived attribute `{0}` depends on itself")]
    Cycle(String),
    #[error("derived attribute `{0}` is not derived yet")]
    Pending(String),
    #[error("store access failed: {0}")]
    Store(String),
    #[error("evaluation failed: {0}")]
    Failed(String),
}

impl From<StoreError> for EvaluationError {
    fn from(err: StoreError) -> Self {
        EvaluationError::Store(err.to_string())
    }
}
