use crate::session::{store_dir, store_path, CliResult};
use std::path::PathBuf;
use tracing::info;

pub fn run(root: Option<PathBuf>) -> CliResult<()> {
    match root {
        Some(root) => {
            let path = store_path(&root);
            info!("Clearing store for {}...", root.display());
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            info!("Store cleared.");
        }
        None => {
            let dir = store_dir();
            info!("Clearing all stores at {}...", dir.display());
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            info!("All stores cleared.");
        }
    }
    Ok(())
}
