use crate::models::{FileChange, NodeId, PropertyValue};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A single graph mutation caused by synchronizing a file.
///
/// `transient` marks bookkeeping edges (`typeOf`, `kindOf`, `file`) as
/// opposed to edges that mirror model references.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    ElementAdded {
        node: NodeId,
        identifier: SmolStr,
        type_node: NodeId,
    },
    ElementRemoved {
        node: NodeId,
        identifier: SmolStr,
        type_node: NodeId,
    },
    AttributeUpdated {
        node: NodeId,
        attribute: SmolStr,
        value: PropertyValue,
    },
    AttributeRemoved {
        node: NodeId,
        attribute: SmolStr,
    },
    ReferenceAdded {
        source: NodeId,
        target: NodeId,
        label: SmolStr,
        transient: bool,
    },
    ReferenceRemoved {
        source: NodeId,
        target: NodeId,
        label: SmolStr,
        transient: bool,
    },
}

impl ChangeEvent {
    pub fn is_transient(&self) -> bool {
        match self {
            ChangeEvent::ReferenceAdded { transient, .. }
            | ChangeEvent::ReferenceRemoved { transient, .. } => *transient,
            _ => false,
        }
    }
}

/// Observer of synchronization changes.
///
/// Events arrive in order between `change_start` and either `change_success`
/// (after the store committed) or `change_failure` (after a rollback, in which
/// case the events of that bracket never became durable).
pub trait ChangeListener: Send + Sync {
    fn name(&self) -> &str;

    fn change_start(&self) {}
    fn change_success(&self) {}
    fn change_failure(&self) {}

    fn element_added(
        &self,
        _change: &FileChange,
        _node: NodeId,
        _identifier: &str,
        _type_node: NodeId,
    ) {
    }
    fn element_removed(
        &self,
        _change: &FileChange,
        _node: NodeId,
        _identifier: &str,
        _type_node: NodeId,
    ) {
    }
    fn attribute_updated(
        &self,
        _change: &FileChange,
        _node: NodeId,
        _attribute: &str,
        _value: &PropertyValue,
    ) {
    }
    fn attribute_removed(&self, _change: &FileChange, _node: NodeId, _attribute: &str) {}
    fn reference_added(
        &self,
        _change: &FileChange,
        _source: NodeId,
        _target: NodeId,
        _label: &str,
        _transient: bool,
    ) {
    }
    fn reference_removed(
        &self,
        _change: &FileChange,
        _source: NodeId,
        _target: NodeId,
        _label: &str,
        _transient: bool,
    ) {
    }

    /// Dispatches an event to the matching callback.
    fn on_event(&self, change: &FileChange, event: &ChangeEvent) {
        match event {
            ChangeEvent::ElementAdded {
                node,
                identifier,
                type_node,
            } => self.element_added(change, *node, identifier, *type_node),
            ChangeEvent::ElementRemoved {
                node,
                identifier,
                type_node,
            } => self.element_removed(change, *node, identifier, *type_node),
            ChangeEvent::AttributeUpdated {
                node,
                attribute,
                value,
            } => self.attribute_updated(change, *node, attribute, value),
            ChangeEvent::AttributeRemoved { node, attribute } => {
                self.attribute_removed(change, *node, attribute)
            }
            ChangeEvent::ReferenceAdded {
                source,
                target,
                label,
                transient,
            } => self.reference_added(change, *source, *target, label, *transient),
            ChangeEvent::ReferenceRemoved {
                source,
                target,
                label,
                transient,
            } => self.reference_removed(change, *source, *target, label, *transient),
        }
    }
}
