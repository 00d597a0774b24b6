use crate::project::Project;
use modelsync_api::FileKey;
use modelsync_core::graph::FileNode;
use modelsync_core::{ChangeLog, SyncConfig, SyncEngine, TracingListener};
use modelsync_store::MemoryGraphStore;
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

pub type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

const DEFAULT_STORE_DIR: &str = ".modelsync/stores";

/// Directory holding persisted stores, `MODELSYNC_STORE_DIR` if set.
pub fn store_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MODELSYNC_STORE_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(DEFAULT_STORE_DIR)
}

/// One store file per project root.
pub fn store_path(root: &Path) -> PathBuf {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let hash = xxh3_64(root.to_string_lossy().as_bytes());
    store_dir().join(format!("{:016x}.bin", hash))
}

/// What one pass over the project changed.
#[derive(Debug, Default, Serialize)]
pub struct SyncSummary {
    pub synced: Vec<ChangeLog>,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: Vec<String>,
    pub pending_proxies: usize,
}

/// An engine over the persisted store of one project.
pub struct Session {
    pub project: Project,
    pub engine: SyncEngine<MemoryGraphStore>,
    store_path: PathBuf,
}

impl Session {
    /// Loads the store and registers every metamodel found under the root.
    pub fn open(project: Project) -> CliResult<Self> {
        let store_path = store_path(&project.root);
        let store = MemoryGraphStore::open(&store_path)?;
        let mut engine = SyncEngine::new(store, SyncConfig::from_env())
            .with_listener(Arc::new(TracingListener));
        for descriptor in project.load_metamodels()? {
            let registered = engine.register_metamodel(&descriptor)?;
            if !registered.already_present {
                tracing::info!(
                    "Registered metamodel {} ({} types)",
                    descriptor.uri,
                    registered.types_created
                );
            }
        }
        Ok(Self {
            project,
            engine,
            store_path,
        })
    }

    pub fn save(&mut self) -> CliResult<()> {
        self.engine.end_session();
        self.engine.store().save(&self.store_path)?;
        Ok(())
    }

    /// Syncs the given model files; files whose stored revision matches the
    /// content hash are skipped.
    pub fn sync_paths(&mut self, paths: &[PathBuf], summary: &mut SyncSummary) {
        for path in paths {
            if !path.exists() {
                self.remove_path(path, summary);
                continue;
            }
            let model = match self.project.load_model(path) {
                Ok(model) => model,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    summary.failed.push(path.display().to_string());
                    continue;
                }
            };
            if self.stored_revision(&model.change.file).as_ref() == Some(&model.change.revision) {
                summary.unchanged += 1;
                continue;
            }
            match self.engine.sync(&model.change, &model.resource) {
                Ok(log) => summary.synced.push(log),
                Err(e) => {
                    tracing::error!("Sync of {} failed: {}", path.display(), e);
                    summary.failed.push(path.display().to_string());
                }
            }
        }
        summary.pending_proxies = self.engine.pending_proxies();
    }

    /// Full pass: syncs every model file and drops files gone from disk.
    pub fn sync_all(&mut self) -> CliResult<SyncSummary> {
        let mut summary = SyncSummary::default();
        let paths = self.project.model_files();
        let on_disk: BTreeSet<FileKey> = paths.iter().map(|p| self.project.file_key(p)).collect();

        for file in FileNode::all(self.engine.store())? {
            if file.key.repository == self.project.repository && !on_disk.contains(&file.key) {
                match self.engine.remove_file(&file.key) {
                    Ok(_) => summary.removed += 1,
                    Err(e) => {
                        tracing::error!("Removing {} failed: {}", file.key, e);
                        summary.failed.push(file.key.to_string());
                    }
                }
            }
        }
        self.sync_paths(&paths, &mut summary);
        Ok(summary)
    }

    fn remove_path(&mut self, path: &Path, summary: &mut SyncSummary) {
        let key = self.project.file_key(path);
        if FileNode::find(self.engine.store(), &key).is_none() {
            return;
        }
        match self.engine.remove_file(&key) {
            Ok(_) => summary.removed += 1,
            Err(e) => {
                tracing::error!("Removing {} failed: {}", key, e);
                summary.failed.push(key.to_string());
            }
        }
    }

    fn stored_revision(&self, key: &FileKey) -> Option<smol_str::SmolStr> {
        let node = FileNode::find(self.engine.store(), key)?;
        FileNode::load(self.engine.store(), node).ok()?.revision
    }
}

/// Short human-readable line for one synced file.
pub fn describe(log: &ChangeLog) -> String {
    let stats = &log.stats;
    let cancelled = if log.cancelled { " (resolution cancelled)" } else { "" };
    format!(
        "{} [{:?}] +{} ~{} -{} ={} proxies +{}/-{}{}",
        log.change.file,
        log.strategy,
        stats.added + stats.retyped,
        stats.updated,
        stats.removed,
        stats.unchanged,
        stats.proxies_created,
        stats.proxies_resolved,
        cancelled
    )
}
