// defaults.rs — Built-in rules that hold regardless of the caller's schema.
//
// Two things live here:
// - The fallback schema of 16 mandatory, existence-only keys used when the
//   caller has not defined a custom schema.
// - The PHI safety floor: a resource tagged `ContainsPHI = yes` must carry
//   `HIPAAZone` and `EncryptionRequired`. A custom schema cannot turn this off.

use std::sync::OnceLock;

use crate::resource::{non_empty, TagMap};
use crate::schema::{Schema, TagRule};

/// Keys enforced when no schema is supplied.
pub const DEFAULT_MANDATORY_KEYS: [&str; 16] = [
    "Owner",
    "CostCenter",
    "Environment",
    "Application",
    "BusinessUnit",
    "Department",
    "Project",
    "DataClassification",
    "ContainsPHI",
    "Compliance",
    "CreatedBy",
    "CreatedDate",
    "SupportContact",
    "BackupPolicy",
    "Criticality",
    "ExpirationDate",
];

/// Tag that flags a resource as holding protected health information.
pub const PHI_TAG: &str = "ContainsPHI";

/// Keys every PHI resource must carry.
pub const PHI_REQUIRED_KEYS: [&str; 2] = ["HIPAAZone", "EncryptionRequired"];

/// Tag used to attribute spend to a budget owner.
pub const COST_ALLOCATION_TAG: &str = "CostCenter";

/// The immutable fallback schema.
pub fn default_schema() -> &'static Schema {
    static DEFAULT: OnceLock<Schema> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        let rules = DEFAULT_MANDATORY_KEYS
            .iter()
            .map(|key| TagRule::mandatory(*key))
            .collect();
        // Keys are distinct literals with no dependencies, so validation cannot fail.
        match Schema::new("built-in-default", rules) {
            Ok(schema) => schema,
            Err(e) => unreachable!("built-in default schema is invalid: {e}"),
        }
    })
}

/// Whether the tags mark a PHI resource (`ContainsPHI` equals "yes", any case).
///
/// The key is matched exactly first, then case-insensitively, since most
/// cloud providers treat tag keys as case-insensitive.
pub fn is_phi(tags: &TagMap) -> bool {
    let value = tags.get(PHI_TAG).or_else(|| {
        tags.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(PHI_TAG))
            .map(|(_, v)| v)
    });
    value
        .and_then(|v| non_empty(v))
        .is_some_and(|v| v.eq_ignore_ascii_case("yes"))
}
