use crate::memory::{MemoryGraphStore, StoreState};
use modelsync_api::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    state: &'a StoreState,
}

#[derive(Deserialize)]
struct StoreFile {
    version: u32,
    state: StoreState,
}

impl MemoryGraphStore {
    /// Serialize committed state (msgpack + zstd).
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let file = StoreFileRef {
            version: STORE_FORMAT_VERSION,
            state: &self.state,
        };
        let bytes = rmp_serde::to_vec(&file)
            .map_err(|e| StoreError::Persistence(format!("MSGPACK error: {}", e)))?;

        zstd::encode_all(&bytes[..], 0)
            .map_err(|e| StoreError::Persistence(format!("Zstd compression failed: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let decompressed = zstd::decode_all(bytes)
            .map_err(|e| StoreError::Persistence(format!("Zstd decompression failed: {}", e)))?;

        let file: StoreFile = rmp_serde::from_slice(&decompressed)
            .map_err(|e| StoreError::Persistence(format!("MSGPACK error: {}", e)))?;

        if file.version != STORE_FORMAT_VERSION {
            return Err(StoreError::Persistence(format!(
                "store format mismatch (found {}, expected {})",
                file.version, STORE_FORMAT_VERSION
            )));
        }
        Ok(Self::from_state(file.state))
    }

    /// Write the store to `path` atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        if modelsync_api::GraphStore::in_tx(self) {
            return Err(StoreError::TransactionActive);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = self.to_bytes()?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, bytes)?;
        std::fs::rename(temp_path, path)?;

        tracing::info!("Saved store to {}", path.display());
        Ok(())
    }

    /// Load a store from `path`; a missing or unreadable file yields an empty store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let bytes = std::fs::read(path)?;
        match Self::from_bytes(&bytes) {
            Ok(store) => {
                tracing::info!("Loaded store from {}", path.display());
                Ok(store)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load store at {}: {}. Starting from an empty store.",
                    path.display(),
                    e
                );
                let _ = std::fs::remove_file(path);
                Ok(Self::new())
            }
        }
    }
}
