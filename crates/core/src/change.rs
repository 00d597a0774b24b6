use modelsync_api::{ChangeEvent, ChangeListener, FileChange, NodeId, PropertyValue};
use serde::Serialize;
use smol_str::SmolStr;
use std::sync::Arc;

/// How a file's new content reached the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// First sight of the file: bulk insert in batch mode.
    BatchInsert,
    /// Too much changed: drop the file's subgraph and bulk insert again.
    Rebuild,
    /// Node-by-node transactional update.
    Patch,
    /// The file was deleted from the source.
    Removal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub retyped: usize,
    pub removed: usize,
    pub proxies_created: usize,
    pub proxies_resolved: usize,
    pub skipped_elements: usize,
    pub malformed_duplicates: usize,
    pub unresolved_references: usize,
    pub derived_invalidated: usize,
}

/// An element left out of the graph, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedElement {
    pub identifier: SmolStr,
    pub reason: String,
}

/// Outcome of synchronizing one file.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeLog {
    pub change: FileChange,
    pub strategy: SyncStrategy,
    /// `None` on first indexing, where no ratio exists.
    pub delta_ratio: Option<f64>,
    pub events: Vec<ChangeEvent>,
    pub stats: SyncStats,
    pub skipped: Vec<SkippedElement>,
    pub remaining_proxies: usize,
    /// Proxy resolution after the sync stopped at a cancellation; the
    /// unresolved records wait for the next pass.
    pub cancelled: bool,
}

impl ChangeLog {
    pub fn new(change: FileChange, strategy: SyncStrategy) -> Self {
        Self {
            change,
            strategy,
            delta_ratio: None,
            events: Vec::new(),
            stats: SyncStats::default(),
            skipped: Vec::new(),
            remaining_proxies: 0,
            cancelled: false,
        }
    }

    /// Events that mirror model changes, leaving out bookkeeping edges.
    pub fn model_events(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter().filter(|e| !e.is_transient())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Registered change listeners, notified in registration order.
#[derive(Clone, Default)]
pub struct ListenerSet {
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn ChangeListener>) {
        tracing::debug!("Registered change listener {}", listener.name());
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn change_start(&self) {
        for l in &self.listeners {
            l.change_start();
        }
    }

    pub fn change_success(&self) {
        for l in &self.listeners {
            l.change_success();
        }
    }

    pub fn change_failure(&self) {
        for l in &self.listeners {
            l.change_failure();
        }
    }

    pub fn emit(&self, change: &FileChange, event: &ChangeEvent) {
        for l in &self.listeners {
            l.on_event(change, event);
        }
    }
}

/// Collects the events of one change bracket and forwards them to listeners.
pub struct ChangeSink<'a> {
    listeners: &'a ListenerSet,
    change: FileChange,
    events: Vec<ChangeEvent>,
}

impl<'a> ChangeSink<'a> {
    pub fn new(listeners: &'a ListenerSet, change: FileChange) -> Self {
        Self {
            listeners,
            change,
            events: Vec::new(),
        }
    }

    pub fn change(&self) -> &FileChange {
        &self.change
    }

    pub fn record(&mut self, event: ChangeEvent) {
        self.listeners.emit(&self.change, &event);
        self.events.push(event);
    }

    pub fn reference_added(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: &str,
        transient: bool,
    ) {
        self.record(ChangeEvent::ReferenceAdded {
            source,
            target,
            label: SmolStr::new(label),
            transient,
        });
    }

    pub fn reference_removed(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: &str,
        transient: bool,
    ) {
        self.record(ChangeEvent::ReferenceRemoved {
            source,
            target,
            label: SmolStr::new(label),
            transient,
        });
    }

    pub fn attribute_updated(&mut self, node: NodeId, attribute: &str, value: PropertyValue) {
        self.record(ChangeEvent::AttributeUpdated {
            node,
            attribute: SmolStr::new(attribute),
            value,
        });
    }

    pub fn attribute_removed(&mut self, node: NodeId, attribute: &str) {
        self.record(ChangeEvent::AttributeRemoved {
            node,
            attribute: SmolStr::new(attribute),
        });
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }
}

/// Logs every change at trace level.
pub struct TracingListener;

impl ChangeListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    fn change_start(&self) {
        tracing::trace!("change started");
    }

    fn change_success(&self) {
        tracing::trace!("change committed");
    }

    fn change_failure(&self) {
        tracing::warn!("change rolled back");
    }

    fn on_event(&self, change: &FileChange, event: &ChangeEvent) {
        tracing::trace!(file = %change.file, revision = %change.revision, ?event, "graph change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counting {
        calls: Mutex<Vec<String>>,
    }

    impl ChangeListener for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn change_start(&self) {
            self.calls.lock().expect("lock poisoned").push("start".into());
        }

        fn attribute_removed(&self, _change: &FileChange, _node: NodeId, attribute: &str) {
            self.calls
                .lock()
                .expect("lock poisoned")
                .push(format!("removed:{}", attribute));
        }
    }

    #[test]
    fn sink_forwards_and_records() {
        let counting = Arc::new(Counting::default());
        let mut listeners = ListenerSet::new();
        listeners.add(counting.clone());

        listeners.change_start();
        let mut sink = ChangeSink::new(&listeners, FileChange::new("r", "/a", "1"));
        sink.attribute_removed(NodeId(1), "title");
        sink.reference_added(NodeId(1), NodeId(2), "typeOf", true);

        let calls = counting.calls.lock().expect("lock poisoned").clone();
        assert_eq!(calls, vec!["start".to_string(), "removed:title".to_string()]);
        let events = sink.into_events();
        assert_eq!(events.len(), 2);
        assert!(events[1].is_transient());
    }
}
