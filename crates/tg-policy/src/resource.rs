// resource.rs — Inventory resource snapshots.
//
// A Resource is a read-only snapshot produced by an inventory source. The
// engine never mutates one in place; remediation computes a new desired tag
// map that the caller applies upstream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tag key → tag value. Ordered so reports and fingerprints are deterministic.
pub type TagMap = BTreeMap<String, String>;

/// One inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable identifier from the inventory source.
    pub id: String,

    /// Classification such as "Virtual Machine" or "Resource Group".
    #[serde(rename = "type", alias = "resource_type")]
    pub resource_type: String,

    #[serde(default)]
    pub tags: TagMap,

    /// Monthly cost in minor currency units. `None` means unknown; it is
    /// never synthesized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cost_cents: Option<u64>,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            tags: TagMap::new(),
            monthly_cost_cents: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_monthly_cost_cents(mut self, cents: u64) -> Self {
        self.monthly_cost_cents = Some(cents);
        self
    }

    /// The trimmed value of `key`, or `None` if absent or blank.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(|v| non_empty(v))
    }
}

/// Trim a tag value, treating blank values as absent.
pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
