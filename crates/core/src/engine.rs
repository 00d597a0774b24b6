//! The synchronization facade.

use crate::cache::TypeCache;
use crate::change::{ChangeLog, ListenerSet};
use crate::config::SyncConfig;
use crate::derive::{self, DerivationReport, DerivedAttributeEngine, ExpressionRegistry};
use crate::error::{Result, SyncError};
use crate::graph::{self, DerivedNode, DerivedState, ElementNode, FileNode, RegisteredMetamodel};
use crate::indexed;
use crate::proxy::{ProxyDictionary, ProxyResolver, ResolveReport};
use crate::sync::UpdateOrchestrator;
use modelsync_api::schema::{INDEX_DERIVED_DIRTY, PROXY_WILDCARD};
use modelsync_api::{
    ChangeListener, DerivedDeclaration, ExpressionEngine, FileChange, FileKey, GraphStore,
    MetamodelDescriptor, ModelResource, NodeId, NodeLabel, PropertyValue, TypeRef,
};
use serde::Serialize;
use smol_str::SmolStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Counts describing the current graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub files: usize,
    pub elements: usize,
    pub types: usize,
    pub metamodels: usize,
    pub derived: usize,
    pub dirty_derived: usize,
    pub pending_proxies: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Keeps a graph store in sync with model files.
///
/// The engine owns the store; every operation that writes takes `&mut self`,
/// so there is exactly one writer.
pub struct SyncEngine<S: GraphStore> {
    store: S,
    config: SyncConfig,
    cache: TypeCache,
    proxies: ProxyDictionary,
    listeners: ListenerSet,
    expressions: ExpressionRegistry,
    cancel: CancellationToken,
}

impl<S: GraphStore> SyncEngine<S> {
    pub fn new(store: S, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            cache: TypeCache::new(),
            proxies: ProxyDictionary::new(),
            listeners: ListenerSet::new(),
            expressions: ExpressionRegistry::with_defaults(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.add(listener);
    }

    pub fn register_expression_engine(&mut self, engine: Arc<dyn ExpressionEngine>) {
        self.expressions.register(engine);
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Token observed between chunks of long passes. Cancelling it stops
    /// the pass in flight and every later one until [`Self::reset_cancel`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Replaces a cancelled token with a fresh one and returns it. Clones
    /// handed out earlier keep pointing at the old token.
    pub fn reset_cancel(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            tracing::debug!("Cancellation token reset");
            self.cancel = CancellationToken::new();
        }
        self.cancel.clone()
    }

    pub fn register_metamodel(
        &mut self,
        descriptor: &MetamodelDescriptor,
    ) -> Result<RegisteredMetamodel> {
        let registered = graph::register_metamodel(&mut self.store, descriptor)?;
        self.cache.clear();
        Ok(registered)
    }

    /// Brings the graph in line with `resource` as the content of
    /// `change.file` at `change.revision`.
    pub fn sync(&mut self, change: &FileChange, resource: &dyn ModelResource) -> Result<ChangeLog> {
        self.proxies.take_counts();
        let outcome = UpdateOrchestrator::new(&self.config, &self.listeners).sync(
            &mut self.store,
            &mut self.cache,
            &mut self.proxies,
            change,
            resource,
        )?;
        let mut log = outcome.log;

        if self.config.resolve_on_sync {
            let mut keys: Vec<SmolStr> = vec![change.file.render()];
            keys.extend(outcome.touched);
            if !ProxyDictionary::sources(&self.store, PROXY_WILDCARD).is_empty() {
                keys.push(SmolStr::new_static(PROXY_WILDCARD));
            }
            keys.sort();
            keys.dedup();
            let resolver =
                ProxyResolver::new(&self.config, &self.listeners).with_cancel(&self.cancel);
            match resolver.resolve_files(&mut self.store, &mut self.proxies, &keys) {
                Ok(report) => {
                    log.stats.derived_invalidated += report.derived_invalidated;
                    log.events.extend(report.events);
                    log.cancelled = report.cancelled;
                }
                // committed chunks stay; the rest is retried by resolve_proxies
                Err(e) => tracing::warn!("Resolving proxies after {} failed: {}", change.file, e),
            }
        }

        let (created, resolved) = self.proxies.take_counts();
        log.stats.proxies_created = created;
        log.stats.proxies_resolved = resolved;
        log.remaining_proxies = ProxyDictionary::pending(&self.store);
        Ok(log)
    }

    /// Drops a file that no longer exists in its repository.
    pub fn remove_file(&mut self, file: &FileKey) -> Result<ChangeLog> {
        self.proxies.take_counts();
        let outcome = UpdateOrchestrator::new(&self.config, &self.listeners).remove_file(
            &mut self.store,
            &mut self.cache,
            &mut self.proxies,
            file,
        )?;
        let mut log = outcome.log;
        let (created, resolved) = self.proxies.take_counts();
        log.stats.proxies_created = created;
        log.stats.proxies_resolved = resolved;
        log.remaining_proxies = ProxyDictionary::pending(&self.store);
        Ok(log)
    }

    /// Resolves every pending proxy whose target exists; returns how many
    /// proxy sets remain.
    pub fn resolve_proxies(&mut self) -> Result<usize> {
        Ok(self.resolve_proxies_report()?.remaining)
    }

    pub fn resolve_proxies_report(&mut self) -> Result<ResolveReport> {
        let resolver = ProxyResolver::new(&self.config, &self.listeners).with_cancel(&self.cancel);
        resolver.resolve_all(&mut self.store, &mut self.proxies)
    }

    /// Recomputes dirty derived attributes of `language`; returns how many
    /// stay dirty.
    pub fn recompute_derived(&mut self, language: &str) -> Result<usize> {
        Ok(self.recompute_derived_report(language)?.remaining)
    }

    pub fn recompute_derived_report(&mut self, language: &str) -> Result<DerivationReport> {
        DerivedAttributeEngine::new(&self.config, &self.expressions)
            .with_cancel(&self.cancel)
            .recompute(&mut self.store, language)
    }

    /// Declares a derived attribute and computes it for existing instances
    /// when an engine for its language is registered.
    pub fn register_derived_attribute(
        &mut self,
        declaration: &DerivedDeclaration,
    ) -> Result<DerivationReport> {
        derive::register_derived_attribute(&mut self.store, &mut self.cache, declaration)?;
        if self.expressions.get(&declaration.language).is_none() {
            tracing::warn!(
                "No expression engine for `{}`; {} stays dirty",
                declaration.language,
                declaration.attribute
            );
            return Ok(DerivationReport {
                remaining: self
                    .store
                    .index_get(INDEX_DERIVED_DIRTY, &declaration.language)
                    .len(),
                ..DerivationReport::default()
            });
        }
        self.recompute_derived_report(&declaration.language)
    }

    pub fn register_indexed_attribute(
        &mut self,
        metamodel: &str,
        type_name: &str,
        attribute: &str,
    ) -> Result<usize> {
        indexed::register_indexed_attribute(
            &mut self.store,
            &mut self.cache,
            metamodel,
            type_name,
            attribute,
        )
    }

    /// Elements whose indexed attribute holds `value`.
    pub fn find_by_attribute(
        &mut self,
        type_ref: &TypeRef,
        attribute: &str,
        value: &PropertyValue,
    ) -> Result<Vec<NodeId>> {
        indexed::lookup(&self.store, &mut self.cache, type_ref, attribute, value)
    }

    /// The element node with `identifier` in `file`.
    pub fn element(&self, file: &FileKey, identifier: &str) -> Result<Option<NodeId>> {
        let Some(file_node) = FileNode::find(&self.store, file) else {
            return Ok(None);
        };
        Ok(ElementNode::find_in_file(&self.store, file_node, identifier)?.map(|e| e.0))
    }

    /// State and cached value of a derived attribute of an element.
    pub fn derived(
        &self,
        element: NodeId,
        name: &str,
    ) -> Result<Option<(DerivedState, PropertyValue)>> {
        let Some(node) = ElementNode(element).derived_node(&self.store, name)? else {
            return Ok(None);
        };
        let derived = DerivedNode(node);
        let value = derived
            .value(&self.store)?
            .ok_or_else(|| SyncError::Corrupt(format!("{} has no value", node)))?;
        Ok(Some((derived.state(&self.store)?, value)))
    }

    pub fn pending_proxies(&self) -> usize {
        ProxyDictionary::pending(&self.store)
    }

    pub fn stats(&self) -> GraphStats {
        let dirty_derived = self.store.index_query(INDEX_DERIVED_DIRTY, "*").len();
        GraphStats {
            files: self.store.nodes_with_label(NodeLabel::File).len(),
            elements: self.store.nodes_with_label(NodeLabel::Element).len(),
            types: self.store.nodes_with_label(NodeLabel::Type).len(),
            metamodels: self.store.nodes_with_label(NodeLabel::Metamodel).len(),
            derived: self.store.nodes_with_label(NodeLabel::Derived).len(),
            dirty_derived,
            pending_proxies: self.pending_proxies(),
            nodes: self.store.node_count(),
            edges: self.store.edge_count(),
        }
    }

    /// Forgets per-session memoized state.
    pub fn end_session(&mut self) {
        self.cache.clear();
        let (created, resolved) = self.proxies.take_counts();
        tracing::debug!(
            "Session ended: {} proxies created, {} resolved",
            created,
            resolved
        );
    }
}
