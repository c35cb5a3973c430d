// snapshot.rs — Inventory read from an exported snapshot file.
//
// A snapshot is what a cloud export job leaves behind: standalone resources
// plus resource groups that carry their own tags and member resources.
// The source flattens both into one stream:
//
// 1. Each group yields itself as a `Resource Group` resource, then its members
// 2. Standalone resources follow, in file order
//
// Tag writes go back into the same document and are persisted immediately,
// in the format the file was read in.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tg_policy::{Resource, TagMap};

use crate::error::InventoryError;
use crate::memory::{TagUpdate, DEFAULT_PAGE_SIZE};
use crate::source::{InventoryPage, InventorySource};

/// Resource type assigned to the synthetic resource emitted for each group.
pub const RESOURCE_GROUP_TYPE: &str = "Resource Group";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    #[serde(default)]
    pub tags: TagMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cost_cents: Option<u64>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ResourceGroup {
    fn as_resource(&self) -> Resource {
        Resource {
            id: self.id.clone(),
            resource_type: RESOURCE_GROUP_TYPE.to_string(),
            tags: self.tags.clone(),
            monthly_cost_cents: self.monthly_cost_cents,
        }
    }
}

/// On-disk snapshot layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub resource_groups: Vec<ResourceGroup>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl SnapshotDocument {
    /// Uniform, ordered view over groups, their members and standalone resources.
    pub fn flatten(&self) -> Vec<Resource> {
        let mut out = Vec::new();
        for group in &self.resource_groups {
            out.push(group.as_resource());
            out.extend(group.resources.iter().cloned());
        }
        out.extend(self.resources.iter().cloned());
        out
    }

    fn tags_mut(&mut self, id: &str) -> Option<&mut TagMap> {
        for group in &mut self.resource_groups {
            if group.id == id {
                return Some(&mut group.tags);
            }
            if let Some(member) = group.resources.iter_mut().find(|r| r.id == id) {
                return Some(&mut member.tags);
            }
        }
        self.resources
            .iter_mut()
            .find(|r| r.id == id)
            .map(|r| &mut r.tags)
    }

    fn tags(&self, id: &str) -> Option<&TagMap> {
        for group in &self.resource_groups {
            if group.id == id {
                return Some(&group.tags);
            }
            if let Some(member) = group.resources.iter().find(|r| r.id == id) {
                return Some(&member.tags);
            }
        }
        self.resources.iter().find(|r| r.id == id).map(|r| &r.tags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotFormat {
    Yaml,
    Json,
}

impl SnapshotFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                SnapshotFormat::Yaml
            }
            _ => SnapshotFormat::Json,
        }
    }
}

pub struct SnapshotInventory {
    path: PathBuf,
    format: SnapshotFormat,
    document: Mutex<SnapshotDocument>,
    page_size: usize,
}

impl SnapshotInventory {
    /// Read a snapshot file. JSON unless the extension is `.yaml`/`.yml`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, InventoryError> {
        let path = path.into();
        let format = SnapshotFormat::for_path(&path);
        let data = fs::read_to_string(&path).map_err(|source| InventoryError::Io {
            path: path.clone(),
            source,
        })?;
        let document: SnapshotDocument = match format {
            SnapshotFormat::Json => serde_json::from_str(&data)?,
            SnapshotFormat::Yaml => serde_yaml::from_str(&data)?,
        };
        tracing::info!(
            path = %path.display(),
            groups = document.resource_groups.len(),
            resources = document.resources.len(),
            "opened inventory snapshot"
        );
        Ok(Self {
            path,
            format,
            document: Mutex::new(document),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Page size; zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The flattened view of one resource (groups included).
    pub fn get(&self, id: &str) -> Result<Option<Resource>, InventoryError> {
        Ok(self.lock()?.flatten().into_iter().find(|r| r.id == id))
    }

    pub fn read_tags(&self, id: &str) -> Result<Option<TagMap>, InventoryError> {
        Ok(self.lock()?.tags(id).cloned())
    }

    /// Replace the tags of `id` and persist the snapshot. The in-memory
    /// document only changes once the file has been written.
    pub fn replace_tags(&self, id: &str, tags: &TagMap) -> Result<TagUpdate, InventoryError> {
        let mut document = self.lock()?;
        let mut updated = document.clone();
        match updated.tags_mut(id) {
            Some(current) => *current = tags.clone(),
            None => return Ok(TagUpdate::NotFound),
        }
        self.persist(&updated)?;
        *document = updated;
        tracing::debug!(path = %self.path.display(), resource = %id, "persisted tag update");
        Ok(TagUpdate::Applied)
    }

    fn persist(&self, document: &SnapshotDocument) -> Result<(), InventoryError> {
        let data = match self.format {
            SnapshotFormat::Json => serde_json::to_string_pretty(document)?,
            SnapshotFormat::Yaml => serde_yaml::to_string(document)?,
        };
        fs::write(&self.path, data).map_err(|source| InventoryError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, SnapshotDocument>, InventoryError> {
        self.document
            .lock()
            .map_err(|e| InventoryError::permanent(format!("snapshot lock poisoned: {}", e)))
    }
}

impl InventorySource for SnapshotInventory {
    fn name(&self) -> &str {
        "snapshot"
    }

    /// The cursor is the offset into the flattened stream.
    fn list_page(&self, cursor: Option<&str>) -> Result<InventoryPage, InventoryError> {
        let offset = match cursor {
            None => 0,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| InventoryError::permanent(format!("invalid snapshot cursor '{}'", raw)))?,
        };

        let all = self.lock()?.flatten();
        let total = all.len();
        let end = offset.saturating_add(self.page_size).min(total);
        let resources = all
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .collect();
        let next_cursor = (end < total).then(|| end.to_string());

        Ok(InventoryPage {
            resources,
            next_cursor,
            estimated_total: Some(total),
        })
    }
}
