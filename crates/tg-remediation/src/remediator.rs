// remediator.rs — Pure computation of the desired tag map.
//
// Given the keys an evaluation reported missing, fill each one with a
// placeholder value that marks it for an owner to complete. Nothing outside
// the missing set is touched, and re-running with the same input yields the
// same map, so the desired state is safe to resubmit.

use tg_policy::TagMap;

use crate::error::RemediationError;

/// Value written into every missing tag.
pub const PLACEHOLDER_VALUE: &str = "PENDING-OWNER-INPUT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediator {
    placeholder: String,
}

impl Default for Remediator {
    fn default() -> Self {
        Self {
            placeholder: PLACEHOLDER_VALUE.to_string(),
        }
    }
}

impl Remediator {
    /// Use a custom placeholder. Blank values are rejected: the evaluator
    /// treats them as absent, so the resource could never become compliant.
    pub fn with_placeholder(placeholder: impl Into<String>) -> Result<Self, RemediationError> {
        let placeholder = placeholder.into();
        if placeholder.trim().is_empty() {
            return Err(RemediationError::BlankPlaceholder);
        }
        Ok(Self { placeholder })
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Desired tags for `resource_id`: `current_tags` with every missing key
    /// set to the placeholder. A missing key that holds a disallowed value is
    /// overwritten too; it counted as missing.
    pub fn remediate(
        &self,
        resource_id: &str,
        missing_tags: &[String],
        current_tags: &TagMap,
    ) -> TagMap {
        let mut desired = current_tags.clone();
        let mut filled = 0usize;
        for key in missing_tags {
            if desired.get(key).map(String::as_str) != Some(self.placeholder.as_str()) {
                desired.insert(key.clone(), self.placeholder.clone());
                filled += 1;
            }
        }
        tracing::debug!(resource = %resource_id, filled, "computed desired tags");
        desired
    }
}

/// [`Remediator::remediate`] with the default placeholder.
pub fn remediate(resource_id: &str, missing_tags: &[String], current_tags: &TagMap) -> TagMap {
    Remediator::default().remediate(resource_id, missing_tags, current_tags)
}
