//! Cached derived attributes and their dependency tracking.
//!
//! Every derived attribute of an element is a node holding the cached value
//! and a state. Evaluations record what they read; the reads are indexed in
//! reverse (`<node>##<property>` to derived node) so that graph changes can
//! flip exactly the affected values back to dirty.

pub mod access;
pub mod path;

pub use access::RecordingAccess;
pub use path::{PATH_LANGUAGE, PathEngine};

use crate::cache::TypeCache;
use crate::chunk::ChunkedPass;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::graph::{AttributeDecl, DerivedDecl, DerivedNode, DerivedState, ElementNode, TypeNode};
use crate::sync::normalize;
use crate::tx::StoreTx;
use modelsync_api::schema::*;
use modelsync_api::{
    AccessRecord, ChangeEvent, DerivedDeclaration, EvaluationError, ExpressionEngine, GraphStore,
    NodeId, PropertyValue,
};
use serde::Serialize;
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Rounds of a recompute pass before giving up on a derivation chain that
/// keeps changing.
const MAX_ROUNDS: usize = 64;

pub fn access_key(node: NodeId, property: &str) -> String {
    format!("{}##{}", node, property)
}

/// Expression engines by language.
#[derive(Clone, Default)]
pub struct ExpressionRegistry {
    engines: BTreeMap<SmolStr, Arc<dyn ExpressionEngine>>,
}

impl ExpressionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `path` language.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PathEngine));
        registry
    }

    pub fn register(&mut self, engine: Arc<dyn ExpressionEngine>) {
        let language = SmolStr::new(engine.language());
        tracing::debug!("Registered expression engine for `{}`", language);
        self.engines.insert(language, engine);
    }

    pub fn get(&self, language: &str) -> Option<&Arc<dyn ExpressionEngine>> {
        self.engines.get(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(|k| k.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DerivationReport {
    pub computed: usize,
    /// Evaluations that failed; those nodes stay dirty.
    pub failed: usize,
    /// Evaluations waiting on another dirty derived attribute at the end.
    pub deferred: usize,
    /// Fresh values flipped to dirty because a value they read changed.
    pub invalidated: usize,
    /// Dirty nodes of the language left after the pass.
    pub remaining: usize,
    pub cancelled: bool,
}

/// Invalidation keys touched by a list of change events.
fn keys_of(events: &[ChangeEvent]) -> (BTreeSet<String>, BTreeSet<NodeId>) {
    let mut keys = BTreeSet::new();
    let mut removed = BTreeSet::new();
    for event in events {
        match event {
            ChangeEvent::AttributeUpdated {
                node, attribute, ..
            }
            | ChangeEvent::AttributeRemoved { node, attribute } => {
                keys.insert(access_key(*node, attribute));
            }
            ChangeEvent::ReferenceAdded {
                source,
                target,
                label,
                ..
            }
            | ChangeEvent::ReferenceRemoved {
                source,
                target,
                label,
                ..
            } => {
                if label == EDGE_TYPE_OF || label == EDGE_KIND_OF {
                    keys.insert(access_key(*target, INSTANCES_PROPERTY));
                } else if label != EDGE_FILE {
                    keys.insert(access_key(*source, label));
                }
            }
            ChangeEvent::ElementAdded { type_node, .. } => {
                keys.insert(access_key(*type_node, INSTANCES_PROPERTY));
            }
            ChangeEvent::ElementRemoved { node, type_node, .. } => {
                keys.insert(access_key(*type_node, INSTANCES_PROPERTY));
                removed.insert(*node);
            }
        }
    }
    (keys, removed)
}

/// Flips every fresh derived value depending on one of `events` to dirty.
///
/// Runs inside the caller's transaction. Returns how many values flipped.
pub fn invalidate<S: GraphStore + ?Sized>(store: &mut S, events: &[ChangeEvent]) -> Result<usize> {
    let (keys, removed) = keys_of(events);
    let mut affected: BTreeSet<NodeId> = BTreeSet::new();
    for key in &keys {
        affected.extend(store.index_get(INDEX_DERIVED_ACCESS, key));
    }
    for node in removed {
        let pattern = format!("{}##*", node);
        affected.extend(
            store
                .index_query(INDEX_DERIVED_ACCESS, &pattern)
                .into_iter()
                .map(|(_, d)| d),
        );
    }
    mark_dirty(store, affected, None)
}

fn mark_dirty<S: GraphStore + ?Sized>(
    store: &mut S,
    nodes: impl IntoIterator<Item = NodeId>,
    except: Option<NodeId>,
) -> Result<usize> {
    let mut flipped = 0;
    for node in nodes {
        if Some(node) == except || !store.node_exists(node) {
            continue;
        }
        let derived = DerivedNode(node);
        if derived.state(store)? == DerivedState::Fresh {
            let decl = derived.decl(store)?;
            derived.mark_dirty(store, &decl)?;
            flipped += 1;
        }
    }
    if flipped > 0 {
        tracing::debug!("Invalidated {} derived values", flipped);
    }
    Ok(flipped)
}

/// Replaces the recorded reads of a derived node.
fn replace_accesses<S: GraphStore + ?Sized>(
    store: &mut S,
    derived: NodeId,
    records: &BTreeSet<AccessRecord>,
) -> Result<()> {
    if let Some(PropertyValue::List(old)) = store.property(derived, DERIVED_ACCESSES)? {
        for key in old.iter().filter_map(PropertyValue::as_str) {
            store.index_remove(INDEX_DERIVED_ACCESS, Some(key), derived)?;
        }
    }
    let keys: Vec<String> = records
        .iter()
        .map(|r| access_key(r.node, &r.property))
        .collect();
    for key in &keys {
        store.index_add(INDEX_DERIVED_ACCESS, key, derived)?;
    }
    store.set_property(derived, DERIVED_ACCESSES, PropertyValue::from(keys))?;
    Ok(())
}

fn canonical(decl: &DerivedDecl, value: PropertyValue) -> PropertyValue {
    let shape = AttributeDecl {
        name: decl.name.clone(),
        many: decl.many,
        ordered: decl.ordered,
        unique: decl.unique,
        indexed: false,
        value_type: decl.value_type.clone(),
    };
    normalize(&shape, value)
}

enum Evaluation {
    Computed { invalidated: usize },
    Failed,
    Deferred,
    /// The node was deleted after being queued.
    Gone,
}

/// Computes dirty derived attributes with the registered expression engines.
pub struct DerivedAttributeEngine<'a> {
    config: &'a SyncConfig,
    registry: &'a ExpressionRegistry,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> DerivedAttributeEngine<'a> {
    pub fn new(config: &'a SyncConfig, registry: &'a ExpressionRegistry) -> Self {
        Self {
            config,
            registry,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Recomputes every dirty derived attribute of `language`, round after
    /// round while values that others depend on keep becoming fresh.
    pub fn recompute<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        language: &str,
    ) -> Result<DerivationReport> {
        let engine = self
            .registry
            .get(language)
            .ok_or_else(|| SyncError::UnknownLanguage(language.to_string()))?
            .clone();

        let mut report = DerivationReport::default();
        let mut failed: HashSet<NodeId> = HashSet::new();
        for round in 0..MAX_ROUNDS {
            let dirty: Vec<NodeId> = store
                .index_get(INDEX_DERIVED_DIRTY, language)
                .into_iter()
                .filter(|n| !failed.contains(n))
                .collect();
            if dirty.is_empty() {
                break;
            }
            tracing::debug!("Derivation round {}: {} dirty `{}` values", round, dirty.len(), language);

            let mut computed = 0;
            let mut deferred = 0;
            let mut pass = ChunkedPass::new("derivation", self.config.derived_batch_size)
                .with_progress(self.config.progress_interval);
            if let Some(token) = self.cancel {
                pass = pass.with_cancel(token);
            }
            let outcome = pass.run(store, dirty, |store, chunk| {
                for node in chunk {
                    match evaluate_one(store, engine.as_ref(), node, language)? {
                        Evaluation::Computed { invalidated } => {
                            computed += 1;
                            report.invalidated += invalidated;
                        }
                        Evaluation::Failed => {
                            failed.insert(node);
                        }
                        Evaluation::Deferred => deferred += 1,
                        Evaluation::Gone => {}
                    }
                }
                Ok(())
            })?;

            report.computed += computed;
            report.deferred = deferred;
            if outcome.cancelled {
                report.cancelled = true;
                break;
            }
            if computed == 0 {
                break;
            }
            if round + 1 == MAX_ROUNDS {
                tracing::warn!("`{}` derivations still changing after {} rounds", language, MAX_ROUNDS);
            }
        }

        report.failed = failed.len();
        report.remaining = store.index_get(INDEX_DERIVED_DIRTY, language).len();
        tracing::info!(
            "Derived `{}`: {} computed, {} failed, {} deferred, {} remaining",
            language,
            report.computed,
            report.failed,
            report.deferred,
            report.remaining
        );
        Ok(report)
    }
}

fn evaluate_one<S: GraphStore + ?Sized>(
    store: &mut S,
    engine: &dyn ExpressionEngine,
    node: NodeId,
    language: &str,
) -> Result<Evaluation> {
    if !store.node_exists(node) {
        store.index_remove(INDEX_DERIVED_DIRTY, Some(language), node)?;
        return Ok(Evaluation::Gone);
    }
    let derived = DerivedNode(node);
    let decl = derived.decl(store)?;
    let owner = derived.owner(store)?;
    let previous = derived.value(store)?;

    store.set_property(node, DERIVED_STATE, DerivedState::Computing.as_str().into())?;
    let mut access = RecordingAccess::new(&*store, owner);
    let result = engine.evaluate(&decl.logic, &mut access);
    let records = access.into_records();
    replace_accesses(store, node, &records)?;

    match result {
        Ok(value) => {
            let value = canonical(&decl, value);
            let changed = previous.as_ref() != Some(&value);
            store.set_property(node, DERIVED_VALUE, value)?;
            store.set_property(node, DERIVED_STATE, DerivedState::Fresh.as_str().into())?;
            store.index_remove(INDEX_DERIVED_DIRTY, Some(language), node)?;
            let invalidated = if changed {
                let dependents = store.index_get(INDEX_DERIVED_ACCESS, &access_key(owner, &decl.name));
                mark_dirty(store, dependents, Some(node))?
            } else {
                0
            };
            Ok(Evaluation::Computed { invalidated })
        }
        Err(e) => {
            store.set_property(node, DERIVED_STATE, DerivedState::Dirty.as_str().into())?;
            match e {
                EvaluationError::Pending(_) => Ok(Evaluation::Deferred),
                e => {
                    tracing::warn!("{} of {}: {}", decl.name, owner, SyncError::Evaluation(e));
                    Ok(Evaluation::Failed)
                }
            }
        }
    }
}

/// Declares a derived attribute on a type and creates (or resets) a dirty
/// node for every existing instance. Returns the number of instances.
pub fn register_derived_attribute<S: GraphStore + ?Sized>(
    store: &mut S,
    cache: &mut TypeCache,
    declaration: &DerivedDeclaration,
) -> Result<usize> {
    let type_ref = declaration.type_ref();
    let ty = cache.type_node(store, &type_ref)?;
    let decl = DerivedDecl::from(declaration);

    let mut tx = StoreTx::begin(store)?;
    tx.set_property(
        ty,
        &format!("{}{}", DERIVED_PREFIX, decl.name),
        decl.to_value(),
    )?;
    let instances = TypeNode::instances(&*tx, ty)?;
    for instance in &instances {
        match ElementNode(*instance).derived_node(&*tx, &decl.name)? {
            Some(existing) => DerivedNode(existing).reset(&mut *tx, &decl)?,
            None => {
                DerivedNode::create(&mut *tx, *instance, &decl)?;
            }
        }
    }
    tx.commit()?;
    cache.clear();

    tracing::info!(
        "Registered derived attribute {}.{} ({}) on {} instances",
        type_ref,
        decl.name,
        decl.language,
        instances.len()
    );
    Ok(instances.len())
}
