// source.rs — The inventory abstraction the scanner consumes.
//
// Every origin (individual resources, resource groups, future resource
// kinds) is flattened by the source into one uniform page of `Resource`s,
// so the evaluator never learns where a resource came from.

use serde::{Deserialize, Serialize};
use tg_policy::Resource;

use crate::error::InventoryError;

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryPage {
    pub resources: Vec<Resource>,
    /// Opaque cursor for the next page; `None` when the listing is exhausted.
    pub next_cursor: Option<String>,
    /// The source's best guess at the total resource count, if it has one.
    pub estimated_total: Option<usize>,
}

impl InventoryPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Produces resource records with their current tags.
///
/// Implementations may page internally and may fail part way through; the
/// scanner turns such failures into a partial report rather than a short,
/// silently truncated one.
pub trait InventorySource: Send + Sync {
    /// Short identifier used in logs and scan reports.
    fn name(&self) -> &str;

    /// List one page. `cursor` is `None` for the first page, otherwise the
    /// `next_cursor` returned by the previous call.
    fn list_page(&self, cursor: Option<&str>) -> Result<InventoryPage, InventoryError>;

    /// Drain every page into memory. Errors abort the listing; use
    /// [`crate::Scanner`] when partial results matter.
    fn list_all(&self) -> Result<Vec<Resource>, InventoryError> {
        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_page(cursor.as_deref())?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(resources),
            }
        }
    }
}
