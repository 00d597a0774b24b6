use crate::error::EvaluationError;
use crate::models::{NodeId, PropertyValue, TypeRef};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One read performed while evaluating a derived attribute.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccessRecord {
    pub node: NodeId,
    pub property: SmolStr,
}

impl AccessRecord {
    pub fn new(node: NodeId, property: impl Into<SmolStr>) -> Self {
        Self {
            node,
            property: property.into(),
        }
    }
}

/// Read-only view of the graph handed to an expression engine.
///
/// Implementations record every read so the caller learns what the
/// evaluation depended on.
pub trait ModelAccess {
    /// The element owning the derived attribute being evaluated.
    fn self_node(&self) -> NodeId;
    fn attribute(
        &mut self,
        node: NodeId,
        name: &str,
    ) -> Result<Option<PropertyValue>, EvaluationError>;
    fn references(&mut self, node: NodeId, name: &str) -> Result<Vec<NodeId>, EvaluationError>;
    fn instances_of(&mut self, type_ref: &TypeRef) -> Result<Vec<NodeId>, EvaluationError>;
    fn identifier(&mut self, node: NodeId) -> Result<SmolStr, EvaluationError>;
}

/// Evaluates derivation logic written in one language.
pub trait ExpressionEngine: Send + Sync {
    fn language(&self) -> &str;
    fn evaluate(
        &self,
        logic: &str,
        access: &mut dyn ModelAccess,
    ) -> Result<PropertyValue, EvaluationError>;
}
