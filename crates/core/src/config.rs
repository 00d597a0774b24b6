use serde::{Deserialize, Serialize};

/// Change ratio above which a file is rebuilt instead of patched.
pub const DEFAULT_DELTA_RATIO_THRESHOLD: f64 = 0.5;
/// Proxy records resolved per store transaction.
pub const DEFAULT_PROXY_BATCH_SIZE: usize = 5_000;
/// Derived attributes (re)computed per store transaction.
pub const DEFAULT_DERIVED_BATCH_SIZE: usize = 1_000;
/// Processed items between two progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 25_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub delta_ratio_threshold: f64,
    pub proxy_batch_size: usize,
    pub derived_batch_size: usize,
    pub progress_interval: usize,
    /// Resolve proxies touching the synced file right after each sync.
    pub resolve_on_sync: bool,
    /// Force the transactional patch path for every known file.
    pub always_patch: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            delta_ratio_threshold: DEFAULT_DELTA_RATIO_THRESHOLD,
            proxy_batch_size: DEFAULT_PROXY_BATCH_SIZE,
            derived_batch_size: DEFAULT_DERIVED_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            resolve_on_sync: true,
            always_patch: false,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `MODELSYNC_DELTA_RATIO`, `MODELSYNC_PROXY_BATCH`
    /// and `MODELSYNC_DERIVED_BATCH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ratio) = parse_var::<f64>(&lookup, "MODELSYNC_DELTA_RATIO") {
            if (0.0..=1.0).contains(&ratio) {
                self.delta_ratio_threshold = ratio;
            } else {
                tracing::warn!("Ignoring MODELSYNC_DELTA_RATIO={} (expected 0..=1)", ratio);
            }
        }
        if let Some(size) = parse_var::<usize>(&lookup, "MODELSYNC_PROXY_BATCH") {
            self.proxy_batch_size = size.max(1);
        }
        if let Some(size) = parse_var::<usize>(&lookup, "MODELSYNC_DERIVED_BATCH") {
            self.derived_batch_size = size.max(1);
        }
    }

    /// Time-aware stores keep history per node and must never rebuild.
    pub fn time_aware() -> Self {
        Self {
            always_patch: true,
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={}", key, raw);
            None
        }
    }
}
