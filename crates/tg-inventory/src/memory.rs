// memory.rs — In-process inventory backed by an ordered map.
//
// Used by tests and by callers that already hold the fleet in memory.
// Pages are keyed on resource id: the cursor is the last id returned, so a
// listing stays stable while tags are rewritten underneath it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tg_policy::{Resource, TagMap};

use crate::error::InventoryError;
use crate::source::{InventoryPage, InventorySource};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Which kind of listing failure to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Result of a tag replacement against a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagUpdate {
    Applied,
    NotFound,
    /// The resource carries a management lock and refuses tag writes.
    Locked,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    on_call: usize,
    kind: FailureKind,
}

pub struct InMemoryInventory {
    name: String,
    resources: Mutex<BTreeMap<String, Resource>>,
    locked: Mutex<BTreeSet<String>>,
    page_size: usize,
    calls: AtomicUsize,
    failure: Option<InjectedFailure>,
}

impl InMemoryInventory {
    pub fn new(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            name: "memory".to_string(),
            resources: Mutex::new(resources.into_iter().map(|r| (r.id.clone(), r)).collect()),
            locked: Mutex::new(BTreeSet::new()),
            page_size: DEFAULT_PAGE_SIZE,
            calls: AtomicUsize::new(0),
            failure: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Page size; zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fail the `page`-th `list_page` call (zero-based, counted over the
    /// inventory's lifetime). Only that call fails.
    pub fn fail_on_page(mut self, page: usize, kind: FailureKind) -> Self {
        self.failure = Some(InjectedFailure {
            on_call: page,
            kind,
        });
        self
    }

    /// Put a management lock on a resource so tag writes are refused.
    pub fn lock_resource(&self, id: &str) -> Result<(), InventoryError> {
        lock(&self.locked)?.insert(id.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        lock(&self.resources).map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Result<Option<Resource>, InventoryError> {
        Ok(lock(&self.resources)?.get(id).cloned())
    }

    /// Live tags for `id`, or `None` if the resource does not exist.
    pub fn read_tags(&self, id: &str) -> Result<Option<TagMap>, InventoryError> {
        Ok(lock(&self.resources)?.get(id).map(|r| r.tags.clone()))
    }

    /// Replace the whole tag map of `id`.
    pub fn replace_tags(&self, id: &str, tags: &TagMap) -> Result<TagUpdate, InventoryError> {
        if lock(&self.locked)?.contains(id) {
            return Ok(TagUpdate::Locked);
        }
        let mut resources = lock(&self.resources)?;
        match resources.get_mut(id) {
            Some(resource) => {
                resource.tags = tags.clone();
                Ok(TagUpdate::Applied)
            }
            None => Ok(TagUpdate::NotFound),
        }
    }

    fn injected_failure(&self) -> Option<InventoryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure?;
        if failure.on_call != call {
            return None;
        }
        Some(match failure.kind {
            FailureKind::Transient => {
                InventoryError::transient(format!("simulated throttling on page {}", call))
            }
            FailureKind::Permanent => {
                InventoryError::permanent(format!("simulated authorization failure on page {}", call))
            }
        })
    }
}

impl InventorySource for InMemoryInventory {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_page(&self, cursor: Option<&str>) -> Result<InventoryPage, InventoryError> {
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }

        let resources = lock(&self.resources)?;
        let lower = match cursor {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        let mut remaining = resources.range::<str, _>((lower, Bound::Unbounded));
        let page: Vec<Resource> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(_, r)| r.clone())
            .collect();
        let next_cursor = match (remaining.next(), page.last()) {
            (Some(_), Some(last)) => Some(last.id.clone()),
            _ => None,
        };

        tracing::debug!(
            source = %self.name,
            returned = page.len(),
            has_more = next_cursor.is_some(),
            "listed inventory page"
        );
        Ok(InventoryPage {
            resources: page,
            next_cursor,
            estimated_total: Some(resources.len()),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, InventoryError> {
    mutex
        .lock()
        .map_err(|e| InventoryError::permanent(format!("inventory lock poisoned: {}", e)))
}
