use modelsync_api::{EvaluationError, StoreError, TypeRef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("no metamodel registered for type {0}")]
    MissingMetamodel(TypeRef),
    #[error("store transaction failed: {0}")]
    Store(#[from] StoreError),
    #[error("malformed resource: {0}")]
    MalformedResource(String),
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("no expression engine registered for language `{0}`")]
    UnknownLanguage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt graph: {0}")]
    Corrupt(String),
    #[error("pass cancelled")]
    Cancelled,
}

impl SyncError {
    /// Errors that abort a single element without failing the whole file.
    pub fn is_element_local(&self) -> bool {
        matches!(
            self,
            SyncError::MissingMetamodel(_) | SyncError::MalformedResource(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
