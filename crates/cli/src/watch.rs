use crate::project::Project;
use crate::session::{describe, CliResult, Session, SyncSummary};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEBOUNCE: Duration = Duration::from_millis(500);

struct FsWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl FsWatcher {
    fn new(root: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    async fn next_event(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await? {
                Ok(event) => return Some(event),
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        }
    }
}

async fn sync_changed(session: Arc<Mutex<Session>>, paths: Vec<PathBuf>) -> CliResult<SyncSummary> {
    tokio::task::spawn_blocking(move || -> CliResult<_> {
        let mut session = session.blocking_lock();
        let mut summary = SyncSummary::default();
        session.sync_paths(&paths, &mut summary);
        session.save()?;
        Ok(summary)
    })
    .await?
}

pub async fn run(project: Project) -> CliResult<()> {
    let root = project.root.clone();
    let session = tokio::task::spawn_blocking(move || -> CliResult<_> {
        let mut session = Session::open(project)?;
        let summary = session.sync_all()?;
        session.save()?;
        info!(
            "Initial sync: {} synced, {} unchanged, {} removed",
            summary.synced.len(),
            summary.unchanged,
            summary.removed
        );
        Ok(session)
    })
    .await??;
    // Ctrl+C also stops a resolution or derivation pass the engine is running
    let cancel: CancellationToken = session.engine.cancel_token();
    let session = Arc::new(Mutex::new(session));

    let mut watcher = FsWatcher::new(&root)?;
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    info!("Watching {}. Press Ctrl+C to stop.", root.display());
    let mut pending: Vec<Event> = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = watcher.next_event() => match event {
                Some(event) => pending.push(event),
                None => break,
            },
            _ = tokio::time::sleep(DEBOUNCE), if !pending.is_empty() => {
                let relevant: BTreeSet<PathBuf> = {
                    let guard = session.lock().await;
                    pending
                        .drain(..)
                        .flat_map(|event| event.paths)
                        .filter(|path| guard.project.is_model_file(path))
                        .collect()
                };
                if relevant.is_empty() {
                    continue;
                }
                info!("Detected changes in {} model files", relevant.len());
                match sync_changed(session.clone(), relevant.into_iter().collect()).await {
                    Ok(summary) => {
                        for log in &summary.synced {
                            println!("{}", describe(log));
                        }
                    }
                    Err(e) => tracing::error!("Failed to sync changes: {}", e),
                }
            }
        }
    }
    info!("Watcher stopped.");
    Ok(())
}
