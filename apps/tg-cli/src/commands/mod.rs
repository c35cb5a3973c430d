pub mod remediate;
pub mod scan;
pub mod schema;
pub mod sync;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tg_inventory::{CancellationToken, SnapshotInventory};
use tg_policy::{Schema, SchemaStore};

use crate::config::EngineConfig;

/// The active schema, or `None` when the project has not defined one.
pub(crate) fn active_schema(config: &EngineConfig) -> anyhow::Result<Option<Schema>> {
    SchemaStore::new(&config.schema_path)
        .load()
        .with_context(|| format!("failed to load schema {}", config.schema_path.display()))
}

pub(crate) fn open_inventory(
    config: &EngineConfig,
    snapshot: Option<&Path>,
) -> anyhow::Result<SnapshotInventory> {
    let path: PathBuf = snapshot
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.inventory.snapshot_path.clone());
    let inventory = SnapshotInventory::open(&path)
        .with_context(|| format!("failed to open inventory snapshot {}", path.display()))?;
    Ok(inventory.with_page_size(config.inventory.page_size))
}

/// A token that cancels itself after `timeout_secs`, if given.
pub(crate) fn deadline_token(timeout_secs: Option<u64>) -> CancellationToken {
    let token = CancellationToken::new();
    if let Some(secs) = timeout_secs {
        let remote = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            tracing::warn!(timeout_secs = secs, "scan deadline reached, cancelling");
            remote.cancel();
        });
    }
    token
}
