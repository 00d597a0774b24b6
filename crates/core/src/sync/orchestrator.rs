use super::delta::{self, Delta, DuplicateFilter, FileDelta};
use super::insert::ElementWriter;
use crate::cache::TypeCache;
use crate::change::{ChangeLog, ChangeSink, ListenerSet, SyncStrategy};
use crate::config::SyncConfig;
use crate::derive;
use crate::error::{Result, SyncError};
use crate::graph::FileNode;
use crate::proxy::ProxyDictionary;
use crate::tx::StoreTx;
use modelsync_api::{FileChange, FileKey, GraphStore, ModelResource, NodeId};
use smol_str::SmolStr;
use std::collections::BTreeSet;

/// Result of one orchestrated change before proxy resolution.
#[derive(Debug)]
pub struct SyncOutcome {
    pub log: ChangeLog,
    /// Target files that received new proxy records.
    pub touched: BTreeSet<SmolStr>,
}

/// Picks a strategy for a file change and runs it inside one change bracket.
pub struct UpdateOrchestrator<'a> {
    config: &'a SyncConfig,
    listeners: &'a ListenerSet,
}

impl<'a> UpdateOrchestrator<'a> {
    pub fn new(config: &'a SyncConfig, listeners: &'a ListenerSet) -> Self {
        Self { config, listeners }
    }

    pub fn choose(&self, delta: &Delta) -> (SyncStrategy, Option<f64>) {
        match delta {
            Delta::FirstIndex => (SyncStrategy::BatchInsert, None),
            Delta::Changes(d) => {
                let ratio = d.ratio();
                if self.config.always_patch || ratio <= self.config.delta_ratio_threshold {
                    (SyncStrategy::Patch, Some(ratio))
                } else {
                    (SyncStrategy::Rebuild, Some(ratio))
                }
            }
        }
    }

    pub fn sync<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        cache: &mut TypeCache,
        proxies: &mut ProxyDictionary,
        change: &FileChange,
        resource: &dyn ModelResource,
    ) -> Result<SyncOutcome> {
        let file_node = FileNode::find(store, &change.file);
        let delta = delta::compute(store, cache, file_node, resource)?;
        let (strategy, ratio) = self.choose(&delta);
        match ratio {
            Some(ratio) => tracing::info!(
                "Syncing {} at {}: {:?} (delta ratio {:.2})",
                change.file,
                change.revision,
                strategy,
                ratio
            ),
            None => tracing::info!(
                "Syncing {} at {}: {:?}",
                change.file,
                change.revision,
                strategy
            ),
        }

        let batch = matches!(strategy, SyncStrategy::BatchInsert | SyncStrategy::Rebuild);
        if batch {
            store.enter_batch_mode()?;
        }
        self.listeners.change_start();

        let mut result = self.apply(
            store, cache, proxies, change, resource, file_node, delta, strategy,
        );

        if batch {
            if let Err(e) = store.exit_batch_mode() {
                tracing::error!("Failed to leave batch mode: {}", e);
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        self.finish(result, change).map(|mut outcome| {
            outcome.log.delta_ratio = ratio;
            outcome
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn apply<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        cache: &mut TypeCache,
        proxies: &mut ProxyDictionary,
        change: &FileChange,
        resource: &dyn ModelResource,
        file_node: Option<NodeId>,
        delta: Delta,
        strategy: SyncStrategy,
    ) -> Result<SyncOutcome> {
        let mut tx = StoreTx::begin(store)?;
        let file_node = match file_node {
            Some(node) => node,
            None => FileNode::create(&mut *tx, change)?,
        };
        let sink = ChangeSink::new(self.listeners, change.clone());
        let mut writer = ElementWriter::new(cache, proxies, sink, file_node, change.file.render());

        match delta {
            Delta::FirstIndex => self.batch_insert(&mut *tx, &mut writer, resource)?,
            Delta::Changes(d) if strategy == SyncStrategy::Rebuild => {
                let stored = FileNode::elements(&*tx, file_node)?;
                tracing::debug!("Rebuild drops {} of {} stored elements", d.changed(), stored.len());
                writer.remove_elements(&mut *tx, &stored)?;
                self.batch_insert(&mut *tx, &mut writer, resource)?;
            }
            Delta::Changes(d) => {
                record_scan(&mut writer, &d);
                writer.apply_patch(&mut *tx, d)?;
            }
        }

        writer.stats.derived_invalidated += derive::invalidate(&mut *tx, writer.sink.events())?;
        FileNode::set_revision(&mut *tx, file_node, &change.revision)?;
        tx.commit()?;
        Ok(into_outcome(writer, change, strategy))
    }

    /// Single linear pass over the resource with existence checks and
    /// reference linking deferred.
    fn batch_insert<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        writer: &mut ElementWriter<'_>,
        resource: &dyn ModelResource,
    ) -> Result<()> {
        let mut duplicates = DuplicateFilter::default();
        let mut inserted = 0usize;
        for element in resource.elements() {
            if !duplicates.admit(&element) {
                continue;
            }
            let Some(info) = writer.type_info(store, &element)? else {
                continue;
            };
            let node = writer.create_element(store, &element, &info)?;
            writer.defer_references(store, node, &element)?;
            inserted += 1;
            if self.config.progress_interval > 0 && inserted % self.config.progress_interval == 0 {
                tracing::info!("{}: inserted {} elements", writer.file_key, inserted);
            }
        }
        writer.stats.malformed_duplicates += duplicates.duplicates;
        writer.stats.unresolved_references += duplicates.unresolved_references;
        Ok(())
    }

    /// Deletes every element of a file and the file node itself.
    pub fn remove_file<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        cache: &mut TypeCache,
        proxies: &mut ProxyDictionary,
        file: &FileKey,
    ) -> Result<SyncOutcome> {
        let Some(file_node) = FileNode::find(store, file) else {
            return Err(SyncError::NotFound(format!("file {}", file)));
        };
        let change = FileNode::load(store, file_node)?.change();
        tracing::info!("Removing {}", file);

        self.listeners.change_start();
        let result = self.apply_removal(store, cache, proxies, &change, file_node);
        self.finish(result, &change)
    }

    fn apply_removal<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        cache: &mut TypeCache,
        proxies: &mut ProxyDictionary,
        change: &FileChange,
        file_node: NodeId,
    ) -> Result<SyncOutcome> {
        let mut tx = StoreTx::begin(store)?;
        let sink = ChangeSink::new(self.listeners, change.clone());
        let mut writer = ElementWriter::new(cache, proxies, sink, file_node, change.file.render());
        let elements = FileNode::elements(&*tx, file_node)?;
        writer.remove_elements(&mut *tx, &elements)?;
        tx.delete_node(file_node)?;
        writer.stats.derived_invalidated += derive::invalidate(&mut *tx, writer.sink.events())?;
        tx.commit()?;
        Ok(into_outcome(writer, change, SyncStrategy::Removal))
    }

    fn finish(&self, result: Result<SyncOutcome>, change: &FileChange) -> Result<SyncOutcome> {
        match result {
            Ok(outcome) => {
                self.listeners.change_success();
                let stats = &outcome.log.stats;
                tracing::info!(
                    "{}: {} added, {} updated, {} retyped, {} removed, {} unchanged",
                    change.file,
                    stats.added,
                    stats.updated,
                    stats.retyped,
                    stats.removed,
                    stats.unchanged
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("Sync of {} rolled back: {}", change.file, e);
                self.listeners.change_failure();
                Err(e)
            }
        }
    }
}

fn record_scan(writer: &mut ElementWriter<'_>, delta: &FileDelta) {
    writer.stats.skipped_elements += delta.skipped.len();
    writer.skipped.extend(delta.skipped.iter().cloned());
    writer.stats.malformed_duplicates += delta.duplicates.duplicates;
    writer.stats.unresolved_references += delta.duplicates.unresolved_references;
}

fn into_outcome(writer: ElementWriter<'_>, change: &FileChange, strategy: SyncStrategy) -> SyncOutcome {
    let mut log = ChangeLog::new(change.clone(), strategy);
    log.stats = writer.stats;
    log.skipped = writer.skipped;
    log.events = writer.sink.into_events();
    SyncOutcome {
        log,
        touched: writer.touched,
    }
}
