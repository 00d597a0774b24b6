use crate::change::ListenerSet;
use crate::error::Result;
use crate::tx::StoreTx;
use modelsync_api::GraphStore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub processed: usize,
    pub chunks: usize,
    pub cancelled: bool,
}

/// Runs work over a sequence of items, one store transaction per chunk.
///
/// A failed chunk is rolled back and stops the pass; earlier chunks stay
/// committed. Cancellation is observed between chunks only.
pub struct ChunkedPass<'a> {
    name: &'static str,
    chunk_size: usize,
    progress_interval: usize,
    cancel: Option<&'a CancellationToken>,
    listeners: Option<&'a ListenerSet>,
}

impl<'a> ChunkedPass<'a> {
    pub fn new(name: &'static str, chunk_size: usize) -> Self {
        Self {
            name,
            chunk_size: chunk_size.max(1),
            progress_interval: 0,
            cancel: None,
            listeners: None,
        }
    }

    pub fn with_progress(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_cancel(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Wrap each chunk in a change bracket for these listeners.
    pub fn with_listeners(mut self, listeners: &'a ListenerSet) -> Self {
        self.listeners = Some(listeners);
        self
    }

    pub fn run<S, T, F>(
        &self,
        store: &mut S,
        items: impl IntoIterator<Item = T>,
        mut work: F,
    ) -> Result<PassOutcome>
    where
        S: GraphStore + ?Sized,
        F: FnMut(&mut S, Vec<T>) -> Result<()>,
    {
        let mut items = items.into_iter();
        let mut outcome = PassOutcome::default();
        let mut next_report = self.progress_interval;

        loop {
            let chunk: Vec<T> = items.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            if self.cancel.is_some_and(|t| t.is_cancelled()) {
                tracing::info!(
                    "{}: cancelled after {} items in {} chunks",
                    self.name,
                    outcome.processed,
                    outcome.chunks
                );
                outcome.cancelled = true;
                break;
            }

            let len = chunk.len();
            if let Some(listeners) = self.listeners {
                listeners.change_start();
            }

            let result = (|| {
                let mut tx = StoreTx::begin(&mut *store)?;
                work(&mut *tx, chunk)?;
                tx.commit()
            })();

            if let Err(e) = result {
                if let Some(listeners) = self.listeners {
                    listeners.change_failure();
                }
                tracing::error!("{}: chunk {} failed: {}", self.name, outcome.chunks, e);
                return Err(e);
            }
            if let Some(listeners) = self.listeners {
                listeners.change_success();
            }

            outcome.processed += len;
            outcome.chunks += 1;
            if self.progress_interval > 0 && outcome.processed >= next_report {
                tracing::info!("{}: processed {} items", self.name, outcome.processed);
                next_report = outcome.processed + self.progress_interval;
            }
        }

        tracing::debug!(
            "{}: {} items in {} chunks",
            self.name,
            outcome.processed,
            outcome.chunks
        );
        Ok(outcome)
    }
}
