// writer.rs — The tag-mutation capability remediation drives.
//
// A writer replaces the full tag map of one resource. Because the desired
// map is deterministic for a given missing-tag set, applying the same map
// again is harmless, so transports may retry freely.

use tg_inventory::{InMemoryInventory, InventoryError, SnapshotInventory, TagUpdate};
use tg_policy::{Resource, TagMap};

use crate::error::MutationError;

pub trait TagWriter: Send + Sync {
    fn name(&self) -> &str;

    /// Live view of one resource, read from the backend rather than a cache.
    fn read_resource(&self, resource_id: &str) -> Result<Resource, MutationError>;

    /// Replace the whole tag map of `resource_id` with `desired`.
    fn apply(&self, resource_id: &str, desired: &TagMap) -> Result<(), MutationError>;

    fn read_tags(&self, resource_id: &str) -> Result<TagMap, MutationError> {
        self.read_resource(resource_id).map(|r| r.tags)
    }
}

fn io(resource_id: &str, source: InventoryError) -> MutationError {
    MutationError::Io {
        resource_id: resource_id.to_string(),
        source,
    }
}

fn found(resource_id: &str, resource: Option<Resource>) -> Result<Resource, MutationError> {
    resource.ok_or_else(|| MutationError::ResourceNotFound {
        resource_id: resource_id.to_string(),
    })
}

fn update_result(resource_id: &str, update: TagUpdate) -> Result<(), MutationError> {
    match update {
        TagUpdate::Applied => Ok(()),
        TagUpdate::NotFound => Err(MutationError::ResourceNotFound {
            resource_id: resource_id.to_string(),
        }),
        TagUpdate::Locked => Err(MutationError::Rejected {
            resource_id: resource_id.to_string(),
            reason: "resource is locked against tag writes".to_string(),
        }),
    }
}

impl TagWriter for InMemoryInventory {
    fn name(&self) -> &str {
        tg_inventory::InventorySource::name(self)
    }

    fn read_resource(&self, resource_id: &str) -> Result<Resource, MutationError> {
        let resource = self.get(resource_id).map_err(|e| io(resource_id, e))?;
        found(resource_id, resource)
    }

    fn apply(&self, resource_id: &str, desired: &TagMap) -> Result<(), MutationError> {
        let update = self
            .replace_tags(resource_id, desired)
            .map_err(|e| io(resource_id, e))?;
        update_result(resource_id, update)
    }
}

impl TagWriter for SnapshotInventory {
    fn name(&self) -> &str {
        tg_inventory::InventorySource::name(self)
    }

    fn read_resource(&self, resource_id: &str) -> Result<Resource, MutationError> {
        let resource = self.get(resource_id).map_err(|e| io(resource_id, e))?;
        found(resource_id, resource)
    }

    fn apply(&self, resource_id: &str, desired: &TagMap) -> Result<(), MutationError> {
        let update = self
            .replace_tags(resource_id, desired)
            .map_err(|e| io(resource_id, e))?;
        update_result(resource_id, update)
    }
}
