use super::dictionary::{ProxyDictionary, ProxyTuple};
use crate::change::ListenerSet;
use crate::chunk::ChunkedPass;
use crate::config::SyncConfig;
use crate::derive;
use crate::error::Result;
use crate::graph::{ElementNode, FileNode, flag_props};
use modelsync_api::schema::{INDEX_FRAGMENTS, INDEX_PROXIES, PROXY_WILDCARD};
use modelsync_api::{ChangeEvent, GraphStore, NodeId};
use serde::Serialize;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
    /// Tuples turned into edges.
    pub resolved: usize,
    /// Proxy sets still pending after the pass.
    pub remaining: usize,
    pub events: Vec<ChangeEvent>,
    /// Derived values made dirty by the new edges.
    pub derived_invalidated: usize,
    pub cancelled: bool,
}

/// Turns pending proxy records into concrete edges once their targets exist.
pub struct ProxyResolver<'a> {
    config: &'a SyncConfig,
    listeners: &'a ListenerSet,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> ProxyResolver<'a> {
    pub fn new(config: &'a SyncConfig, listeners: &'a ListenerSet) -> Self {
        Self {
            config,
            listeners,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Walks every pending record, grouped by target file.
    pub fn resolve_all<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        proxies: &mut ProxyDictionary,
    ) -> Result<ResolveReport> {
        let entries = ProxyDictionary::entries(store);
        tracing::info!("Resolving {} pending proxy sets", entries.len());
        self.run(store, proxies, entries)
    }

    /// Resolves only the records waiting on `file_key`.
    pub fn resolve_file<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        proxies: &mut ProxyDictionary,
        file_key: &str,
    ) -> Result<ResolveReport> {
        self.resolve_files(store, proxies, &[SmolStr::new(file_key)])
    }

    pub fn resolve_files<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        proxies: &mut ProxyDictionary,
        file_keys: &[SmolStr],
    ) -> Result<ResolveReport> {
        let mut entries = Vec::new();
        for key in file_keys {
            entries.extend(
                ProxyDictionary::sources(store, key)
                    .into_iter()
                    .map(|source| (key.clone(), source)),
            );
        }
        self.run(store, proxies, entries)
    }

    fn run<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        proxies: &mut ProxyDictionary,
        entries: Vec<(SmolStr, NodeId)>,
    ) -> Result<ResolveReport> {
        let mut report = ResolveReport::default();
        if entries.is_empty() {
            report.remaining = ProxyDictionary::pending(store);
            return Ok(report);
        }

        let mut pass = ChunkedPass::new("proxy resolution", self.config.proxy_batch_size)
            .with_progress(self.config.progress_interval)
            .with_listeners(self.listeners);
        if let Some(token) = self.cancel {
            pass = pass.with_cancel(token);
        }

        let outcome = pass.run(store, entries, |store, chunk| {
            let first = report.events.len();
            for (file_key, source) in chunk {
                report.resolved +=
                    self.resolve_entry(store, proxies, &file_key, source, &mut report.events)?;
            }
            report.derived_invalidated += derive::invalidate(store, &report.events[first..])?;
            Ok(())
        })?;

        report.cancelled = outcome.cancelled;
        report.remaining = ProxyDictionary::pending(store);
        tracing::info!(
            "Resolved {} references, {} proxy sets remain",
            report.resolved,
            report.remaining
        );
        Ok(report)
    }

    fn resolve_entry<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        proxies: &mut ProxyDictionary,
        file_key: &str,
        source: NodeId,
        events: &mut Vec<ChangeEvent>,
    ) -> Result<usize> {
        if !store.node_exists(source) {
            store.index_remove(INDEX_PROXIES, Some(file_key), source)?;
            return Ok(0);
        }

        let file = if file_key == PROXY_WILDCARD {
            None
        } else {
            match FileNode::find_rendered(store, file_key) {
                Some(file) => Some(file),
                // target file not indexed yet
                None => return Ok(0),
            }
        };

        let tuples = ProxyDictionary::tuples(store, source, file_key)?;
        let mut remaining = Vec::new();
        let mut resolved = 0;
        for tuple in tuples {
            let target = match file {
                Some(file) => ElementNode::find_in_file(store, file, tuple.fragment(file_key))?
                    .map(|e| e.0),
                None => find_anywhere(store, source, &tuple),
            };
            let Some(target) = target else {
                remaining.push(tuple);
                continue;
            };

            store.create_edge(
                source,
                target,
                &tuple.label,
                flag_props(tuple.containment, tuple.container),
            )?;
            let event = ChangeEvent::ReferenceAdded {
                source,
                target,
                label: tuple.label.clone(),
                transient: false,
            };
            if let Some(owner) = ElementNode(target).file_node(store)? {
                self.listeners
                    .emit(&FileNode::load(store, owner)?.change(), &event);
            }
            events.push(event);
            resolved += 1;
        }

        if resolved > 0 {
            tracing::debug!("{}: {} proxies resolved against {}", source, resolved, file_key);
        }
        proxies.replace(store, source, file_key, remaining, resolved)?;
        Ok(resolved)
    }
}

/// First element carrying the fragment as identifier, the source excluded.
fn find_anywhere<S: GraphStore + ?Sized>(
    store: &S,
    source: NodeId,
    tuple: &ProxyTuple,
) -> Option<NodeId> {
    store
        .index_get(INDEX_FRAGMENTS, tuple.fragment(PROXY_WILDCARD))
        .into_iter()
        .find(|n| *n != source)
}
