// sync.rs — Compile the active schema to an external enforcement document.
//
// External policy services (cloud-native tag policies and the like) only
// understand flat "this tag must exist / must take one of these values"
// clauses. The compiler:
//
// 1. Emits one `require_tag` clause per Mandatory rule, keeping `key` and
//    `allowed_values` exactly
// 2. Lists every Conditional and Recommended rule in `dropped_rules` with the
//    reason it could not be expressed
// 3. Fingerprints the document so publishers can skip identical pushes
//
// Dropping is never silent: callers get the list and publishers log it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SyncError;
use crate::schema::{Requirement, Schema};

/// What the enforcement surface should do when a clause fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    Deny,
    Audit,
}

/// One enforceable requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyClause {
    RequireTag {
        key: String,
        /// Empty means any non-empty value.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        allowed_values: Vec<String>,
        effect: PolicyEffect,
    },
}

/// A rule the external surface has no equivalent for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRule {
    pub key: String,
    pub requirement: Requirement,
    pub reason: String,
}

/// Declarative policy consumed by an external enforcement surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPolicyDocument {
    pub policy_name: String,
    pub clauses: Vec<PolicyClause>,
    pub dropped_rules: Vec<DroppedRule>,
    /// SHA-256 over `policy_name`, `clauses` and `dropped_rules`.
    pub fingerprint: String,
}

impl ExternalPolicyDocument {
    /// Whether anything from the schema could not be carried over.
    pub fn is_lossy(&self) -> bool {
        !self.dropped_rules.is_empty()
    }

    /// The same clauses under another policy name, re-fingerprinted.
    pub fn renamed(mut self, policy_name: impl Into<String>) -> Self {
        self.policy_name = policy_name.into();
        self.fingerprint = fingerprint(&self.policy_name, &self.clauses, &self.dropped_rules);
        self
    }
}

/// Pure transform from the internal schema to an external policy document.
pub fn to_external_policy(schema: &Schema) -> ExternalPolicyDocument {
    let mut clauses = Vec::new();
    let mut dropped_rules = Vec::new();

    for rule in schema.rules() {
        match rule.requirement {
            Requirement::Mandatory => clauses.push(PolicyClause::RequireTag {
                key: rule.key.clone(),
                allowed_values: rule.allowed_values.clone(),
                effect: PolicyEffect::Deny,
            }),
            Requirement::Conditional => dropped_rules.push(DroppedRule {
                key: rule.key.clone(),
                requirement: rule.requirement,
                reason: match &rule.dependency {
                    Some(dep) => format!("dependency '{}' has no external equivalent", dep),
                    None => "conditional rule has no external equivalent".to_string(),
                },
            }),
            Requirement::Recommended => dropped_rules.push(DroppedRule {
                key: rule.key.clone(),
                requirement: rule.requirement,
                reason: "advisory rules are not enforced externally".to_string(),
            }),
        }
    }

    let fingerprint = fingerprint(schema.name(), &clauses, &dropped_rules);
    ExternalPolicyDocument {
        policy_name: schema.name().to_string(),
        clauses,
        dropped_rules,
        fingerprint,
    }
}

// The dropped list is hashed too, so a change that only adds or removes
// unenforceable rules still republishes the document.
fn fingerprint(policy_name: &str, clauses: &[PolicyClause], dropped_rules: &[DroppedRule]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(policy_name.as_bytes());
    hasher.update([0u8]);
    // Serialization is deterministic: fixed field order, no maps.
    if let Ok(bytes) = serde_json::to_vec(clauses) {
        hasher.update(&bytes);
    }
    hasher.update([0u8]);
    if let Ok(bytes) = serde_json::to_vec(dropped_rules) {
        hasher.update(&bytes);
    }
    format!("{:x}", hasher.finalize())
}

/// Outcome of a publish attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub publisher: String,
    pub location: String,
    pub fingerprint: String,
    /// False when the target already held an identical document.
    pub changed: bool,
}

/// Pushes policy documents to an enforcement surface.
pub trait PolicyPublisher: Send + Sync {
    fn name(&self) -> &str;

    /// Publish a document. Re-publishing an identical document must be a no-op.
    fn publish(&self, doc: &ExternalPolicyDocument) -> Result<PublishReceipt, SyncError>;
}

/// Writes documents to `<dir>/<policy_name>.json`, where an external
/// deployment pipeline picks them up.
pub struct FilePolicyPublisher {
    dir: PathBuf,
}

impl FilePolicyPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target file for `policy_name`. The name becomes a file name, so it
    /// may not contain path separators or be `.`/`..`.
    pub fn path_for(&self, policy_name: &str) -> Result<PathBuf, SyncError> {
        let invalid = |reason: &str| SyncError::InvalidPolicyName {
            name: policy_name.to_string(),
            reason: reason.to_string(),
        };
        if policy_name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if policy_name.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
            return Err(invalid("name contains a path separator"));
        }
        if policy_name == "." || policy_name == ".." {
            return Err(invalid("name is a relative path component"));
        }
        Ok(self.dir.join(format!("{}.json", policy_name)))
    }

    fn stored_fingerprint(path: &Path) -> Option<String> {
        let data = fs::read_to_string(path).ok()?;
        let doc: ExternalPolicyDocument = serde_json::from_str(&data).ok()?;
        Some(doc.fingerprint)
    }
}

impl PolicyPublisher for FilePolicyPublisher {
    fn name(&self) -> &str {
        "file"
    }

    fn publish(&self, doc: &ExternalPolicyDocument) -> Result<PublishReceipt, SyncError> {
        for dropped in &doc.dropped_rules {
            tracing::warn!(
                policy = %doc.policy_name,
                key = %dropped.key,
                requirement = %dropped.requirement,
                "rule not carried to external policy: {}",
                dropped.reason
            );
        }

        let path = self.path_for(&doc.policy_name)?;
        let location = path.display().to_string();

        if Self::stored_fingerprint(&path).as_deref() == Some(doc.fingerprint.as_str()) {
            tracing::info!(policy = %doc.policy_name, %location, "external policy unchanged");
            return Ok(PublishReceipt {
                publisher: self.name().to_string(),
                location,
                fingerprint: doc.fingerprint.clone(),
                changed: false,
            });
        }

        fs::create_dir_all(&self.dir).map_err(|source| SyncError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&path, json).map_err(|source| SyncError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(
            policy = %doc.policy_name,
            %location,
            clauses = doc.clauses.len(),
            "published external policy"
        );
        Ok(PublishReceipt {
            publisher: self.name().to_string(),
            location,
            fingerprint: doc.fingerprint.clone(),
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TagDependency, TagRule};

    fn schema() -> Schema {
        Schema::new(
            "hipaa-tags",
            vec![
                TagRule::mandatory("Owner"),
                TagRule::mandatory("Environment").allow(["Prod", "Dev"]),
                TagRule::conditional("HIPAAZone", TagDependency::equals("ContainsPHI", "Yes")),
                TagRule::recommended("Team"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn mandatory_rules_become_require_tag_clauses() {
        let doc = to_external_policy(&schema());
        assert_eq!(doc.policy_name, "hipaa-tags");
        assert_eq!(
            doc.clauses,
            vec![
                PolicyClause::RequireTag {
                    key: "Owner".to_string(),
                    allowed_values: vec![],
                    effect: PolicyEffect::Deny,
                },
                PolicyClause::RequireTag {
                    key: "Environment".to_string(),
                    allowed_values: vec!["Prod".to_string(), "Dev".to_string()],
                    effect: PolicyEffect::Deny,
                },
            ]
        );
    }

    #[test]
    fn conditional_and_recommended_rules_are_listed_as_dropped() {
        let doc = to_external_policy(&schema());
        assert!(doc.is_lossy());
        let dropped: Vec<(&str, Requirement)> = doc
            .dropped_rules
            .iter()
            .map(|d| (d.key.as_str(), d.requirement))
            .collect();
        assert_eq!(
            dropped,
            vec![
                ("HIPAAZone", Requirement::Conditional),
                ("Team", Requirement::Recommended),
            ]
        );
        assert!(doc.dropped_rules[0].reason.contains("ContainsPHI"));
    }

    #[test]
    fn mandatory_only_schema_is_lossless() {
        let s = Schema::new("m", vec![TagRule::mandatory("Owner")]).unwrap();
        assert!(!to_external_policy(&s).is_lossy());
    }

    #[test]
    fn fingerprint_is_deterministic_and_content_sensitive() {
        let a = to_external_policy(&schema());
        let b = to_external_policy(&schema());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);

        let other = Schema::new("hipaa-tags", vec![TagRule::mandatory("Owner")]).unwrap();
        assert_ne!(a.fingerprint, to_external_policy(&other).fingerprint);
    }

    #[test]
    fn renaming_changes_fingerprint_consistently() {
        let original = to_external_policy(&schema());
        let renamed = original.clone().renamed("prod-tags");
        assert_eq!(renamed.policy_name, "prod-tags");
        assert_eq!(renamed.clauses, original.clauses);
        assert_ne!(renamed.fingerprint, original.fingerprint);
        assert_eq!(
            renamed.clone().renamed("hipaa-tags").fingerprint,
            original.fingerprint
        );
    }

    #[test]
    fn file_publisher_skips_identical_document() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FilePolicyPublisher::new(dir.path().join("policies"));
        let doc = to_external_policy(&schema());

        let first = publisher.publish(&doc).unwrap();
        assert!(first.changed);
        assert!(publisher.path_for("hipaa-tags").unwrap().exists());

        let second = publisher.publish(&doc).unwrap();
        assert!(!second.changed);
        assert_eq!(first.fingerprint, second.fingerprint);

        let changed = to_external_policy(
            &Schema::new("hipaa-tags", vec![TagRule::mandatory("Owner")]).unwrap(),
        );
        assert!(publisher.publish(&changed).unwrap().changed);
    }

    #[test]
    fn published_document_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FilePolicyPublisher::new(dir.path());
        let doc = to_external_policy(&schema());
        publisher.publish(&doc).unwrap();

        let data = fs::read_to_string(publisher.path_for("hipaa-tags").unwrap()).unwrap();
        let restored: ExternalPolicyDocument = serde_json::from_str(&data).unwrap();
        assert_eq!(restored, doc);
        assert!(data.contains("\"require_tag\""));
    }

    #[test]
    fn dropped_rule_changes_republish_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FilePolicyPublisher::new(dir.path().join("policies"));
        let base = to_external_policy(&Schema::new("tags", vec![TagRule::mandatory("Owner")]).unwrap());
        assert!(publisher.publish(&base).unwrap().changed);

        let with_advisory = to_external_policy(
            &Schema::new(
                "tags",
                vec![TagRule::mandatory("Owner"), TagRule::recommended("Team")],
            )
            .unwrap(),
        );
        assert_eq!(with_advisory.clauses, base.clauses);
        assert_ne!(with_advisory.fingerprint, base.fingerprint);
        assert!(publisher.publish(&with_advisory).unwrap().changed);

        let stored = fs::read_to_string(publisher.path_for("tags").unwrap()).unwrap();
        assert!(stored.contains("\"Team\""));
    }

    #[test]
    fn policy_name_cannot_leave_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FilePolicyPublisher::new(dir.path().join("policies"));
        for name in ["../escaped", "a/b", "a\\b", "..", ".", "  "] {
            let doc = to_external_policy(&schema()).renamed(name);
            match publisher.publish(&doc) {
                Err(SyncError::InvalidPolicyName { name: rejected, .. }) => assert_eq!(rejected, name),
                other => panic!("expected invalid name for {:?}, got {:?}", name, other),
            }
        }
        assert!(!dir.path().join("escaped.json").exists());
        assert!(!dir.path().join("policies").exists());
    }
}
