// evaluator.rs — Compliance evaluation of one resource against one schema.
//
// For every Mandatory or Conditional rule the evaluator checks:
//
// 1. Conditional only: is the dependency satisfied? → No → skip the rule
// 2. Is the tag present with a non-empty value? → No → missing
// 3. Does the rule declare a value set that excludes the value? → Yes → missing
//
// Recommended rules go through the same check but only feed `advisory_tags`.
// After the schema loop, the PHI safety floor adds `HIPAAZone` and
// `EncryptionRequired` for any resource tagged `ContainsPHI = yes`.
//
// A resource is compliant iff its missing set is empty. Extra tags never
// count against it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::defaults::{default_schema, is_phi, PHI_REQUIRED_KEYS};
use crate::resource::{non_empty, Resource};
use crate::schema::{Schema, TagRule};

/// Evaluator output for one resource. Computed fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub resource_id: String,
    pub resource_type: String,
    /// Keys that are absent or hold a disallowed value. Deduplicated, in
    /// schema order followed by safety-floor keys.
    pub missing_tags: Vec<String>,
    /// Recommended keys that are not satisfied. Never affect the verdict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisory_tags: Vec<String>,
    pub is_compliant: bool,
}

/// Engine-level compliance state of a resource.
///
/// There is no "remediating" state: a remediated resource only becomes
/// Compliant after it has been evaluated again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceState {
    #[default]
    Unknown,
    Compliant,
    NonCompliant,
}

impl ComplianceState {
    pub fn from_result(result: &ComplianceResult) -> Self {
        if result.is_compliant {
            ComplianceState::Compliant
        } else {
            ComplianceState::NonCompliant
        }
    }
}

impl fmt::Display for ComplianceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceState::Unknown => write!(f, "unknown"),
            ComplianceState::Compliant => write!(f, "compliant"),
            ComplianceState::NonCompliant => write!(f, "non_compliant"),
        }
    }
}

/// What the evaluator concluded about one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Satisfied,
    Missing,
    DisallowedValue,
    DependencyNotMet,
    Advisory,
    PhiFloor,
}

/// One entry in an evaluation trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationStep {
    pub key: String,
    pub outcome: StepOutcome,
    pub detail: String,
}

/// A compliance result plus the ordered steps that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTrace {
    pub result: ComplianceResult,
    pub schema_name: String,
    pub steps: Vec<EvaluationStep>,
}

/// Evaluate one resource. `None` falls back to the built-in default schema.
pub fn evaluate(schema: Option<&Schema>, resource: &Resource) -> ComplianceResult {
    run(schema.unwrap_or(default_schema()), resource, None)
}

/// Same as [`evaluate`] but records every check for observability.
pub fn evaluate_with_trace(schema: Option<&Schema>, resource: &Resource) -> EvaluationTrace {
    let schema = schema.unwrap_or(default_schema());
    let mut steps = Vec::new();
    let result = run(schema, resource, Some(&mut steps));
    EvaluationTrace {
        result,
        schema_name: schema.name().to_string(),
        steps,
    }
}

/// Evaluate a batch of resources, fanning out over scoped threads when
/// `parallelism > 1`. Output order matches input order.
pub fn evaluate_all(
    schema: Option<&Schema>,
    resources: &[Resource],
    parallelism: usize,
) -> Vec<ComplianceResult> {
    if parallelism <= 1 || resources.len() < 2 {
        return resources.iter().map(|r| evaluate(schema, r)).collect();
    }

    let chunk_size = resources.len().div_ceil(parallelism);
    std::thread::scope(|scope| {
        let handles: Vec<_> = resources
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|r| evaluate(schema, r))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

fn run(
    schema: &Schema,
    resource: &Resource,
    mut trace: Option<&mut Vec<EvaluationStep>>,
) -> ComplianceResult {
    let mut missing: Vec<String> = Vec::new();
    let mut advisory = Vec::new();

    let mut record = |key: &str, outcome: StepOutcome, detail: String| {
        if let Some(steps) = trace.as_deref_mut() {
            steps.push(EvaluationStep {
                key: key.to_string(),
                outcome,
                detail,
            });
        }
    };

    for rule in schema.rules() {
        if let Some(dep) = &rule.dependency {
            if !dep.is_satisfied(&resource.tags) {
                record(
                    &rule.key,
                    StepOutcome::DependencyNotMet,
                    format!("skipped: dependency '{}' not met", dep),
                );
                continue;
            }
        }

        let value = resource.tags.get(&rule.key).map(String::as_str);
        let outcome = check_rule(rule, value);

        match (rule.requirement.affects_verdict(), outcome) {
            (_, StepOutcome::Satisfied) => {
                record(&rule.key, StepOutcome::Satisfied, "present".to_string());
            }
            (true, outcome) => {
                record(&rule.key, outcome, describe_violation(rule, value));
                push_unique(&mut missing, &rule.key);
            }
            (false, _) => {
                record(
                    &rule.key,
                    StepOutcome::Advisory,
                    format!("recommended: {}", describe_violation(rule, value)),
                );
                push_unique(&mut advisory, &rule.key);
            }
        }
    }

    if is_phi(&resource.tags) {
        for key in PHI_REQUIRED_KEYS {
            if resource.tag_value(key).is_none() {
                record(
                    key,
                    StepOutcome::PhiFloor,
                    "required on every PHI resource".to_string(),
                );
                push_unique(&mut missing, key);
            }
        }
    }

    tracing::debug!(
        resource_id = %resource.id,
        schema = %schema.name(),
        missing = missing.len(),
        "evaluated resource"
    );

    ComplianceResult {
        resource_id: resource.id.clone(),
        resource_type: resource.resource_type.clone(),
        is_compliant: missing.is_empty(),
        missing_tags: missing,
        advisory_tags: advisory,
    }
}

fn check_rule(rule: &TagRule, value: Option<&str>) -> StepOutcome {
    if rule.accepts(value) {
        StepOutcome::Satisfied
    } else if value.and_then(non_empty).is_some() {
        StepOutcome::DisallowedValue
    } else {
        StepOutcome::Missing
    }
}

fn describe_violation(rule: &TagRule, value: Option<&str>) -> String {
    match value.and_then(non_empty) {
        None => "absent or empty".to_string(),
        Some(v) => format!(
            "value '{}' not in [{}]",
            v,
            rule.allowed_values.join(", ")
        ),
    }
}

fn push_unique(keys: &mut Vec<String>, key: &str) {
    if !keys.iter().any(|k| k == key) {
        keys.push(key.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::DEFAULT_MANDATORY_KEYS;
    use crate::schema::TagDependency;

    fn schema(rules: Vec<TagRule>) -> Schema {
        Schema::new("test", rules).unwrap()
    }

    #[test]
    fn absent_mandatory_tag_is_missing() {
        let s = schema(vec![TagRule::mandatory("Owner")]);
        let result = evaluate(Some(&s), &Resource::new("vm-1", "Virtual Machine"));
        assert_eq!(result.missing_tags, vec!["Owner"]);
        assert!(!result.is_compliant);
        assert_eq!(result.resource_type, "Virtual Machine");
    }

    #[test]
    fn disallowed_value_counts_as_missing() {
        let s = schema(vec![TagRule::mandatory("Environment").allow(["Prod", "Dev"])]);
        let resource = Resource::new("vm-1", "Virtual Machine").with_tag("Environment", "Staging");
        let result = evaluate(Some(&s), &resource);
        assert_eq!(result.missing_tags, vec!["Environment"]);
        assert!(!result.is_compliant);
    }

    #[test]
    fn allowed_value_is_compliant() {
        let s = schema(vec![TagRule::mandatory("Environment").allow(["Prod", "Dev"])]);
        let resource = Resource::new("vm-1", "Virtual Machine").with_tag("Environment", "Dev");
        assert!(evaluate(Some(&s), &resource).is_compliant);
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let s = schema(vec![TagRule::mandatory("Owner")]);
        let resource = Resource::new("vm-1", "Virtual Machine").with_tag("Owner", "   ");
        assert_eq!(evaluate(Some(&s), &resource).missing_tags, vec!["Owner"]);
    }

    #[test]
    fn empty_schema_is_vacuously_compliant() {
        let s = schema(vec![]);
        let resource = Resource::new("vm-1", "Virtual Machine").with_tag("ContainsPHI", "No");
        let result = evaluate(Some(&s), &resource);
        assert!(result.is_compliant);
        assert!(result.missing_tags.is_empty());
    }

    #[test]
    fn conditional_rule_skipped_when_dependency_unmet() {
        let s = schema(vec![TagRule::conditional(
            "DataSteward",
            TagDependency::equals("DataClassification", "Restricted"),
        )]);
        let public = Resource::new("st-1", "Storage").with_tag("DataClassification", "Public");
        assert!(evaluate(Some(&s), &public).is_compliant);

        let untagged = Resource::new("st-2", "Storage");
        assert!(evaluate(Some(&s), &untagged).is_compliant);
    }

    #[test]
    fn conditional_rule_enforced_when_dependency_met() {
        let s = schema(vec![TagRule::conditional(
            "DataSteward",
            TagDependency::equals("DataClassification", "Restricted"),
        )]);
        let restricted =
            Resource::new("st-1", "Storage").with_tag("DataClassification", "restricted");
        let result = evaluate(Some(&s), &restricted);
        assert_eq!(result.missing_tags, vec!["DataSteward"]);
    }

    #[test]
    fn recommended_rules_never_affect_verdict() {
        let s = schema(vec![
            TagRule::mandatory("Owner"),
            TagRule::recommended("Team").allow(["Platform"]),
        ]);
        let resource = Resource::new("vm-1", "Virtual Machine")
            .with_tag("Owner", "alice")
            .with_tag("Team", "Data");
        let result = evaluate(Some(&s), &resource);
        assert!(result.is_compliant);
        assert!(result.missing_tags.is_empty());
        assert_eq!(result.advisory_tags, vec!["Team"]);
    }

    #[test]
    fn extra_tags_are_ignored() {
        let s = schema(vec![TagRule::mandatory("Owner")]);
        let resource = Resource::new("vm-1", "Virtual Machine")
            .with_tag("Owner", "alice")
            .with_tag("Unrelated", "whatever");
        assert!(evaluate(Some(&s), &resource).is_compliant);
    }

    #[test]
    fn phi_floor_applies_even_with_empty_schema() {
        let s = schema(vec![]);
        let resource = Resource::new("db-1", "Database").with_tag("ContainsPHI", "YES");
        let result = evaluate(Some(&s), &resource);
        assert_eq!(result.missing_tags, vec!["HIPAAZone", "EncryptionRequired"]);
        assert!(!result.is_compliant);
    }

    #[test]
    fn phi_floor_satisfied_when_both_keys_present() {
        let s = schema(vec![]);
        let resource = Resource::new("db-1", "Database")
            .with_tag("ContainsPHI", "yes")
            .with_tag("HIPAAZone", "Secure")
            .with_tag("EncryptionRequired", "true");
        assert!(evaluate(Some(&s), &resource).is_compliant);
    }

    #[test]
    fn phi_floor_and_schema_rule_are_deduplicated() {
        let s = schema(vec![
            TagRule::mandatory("HIPAAZone"),
            TagRule::conditional("EncryptionRequired", TagDependency::equals("ContainsPHI", "Yes")),
        ]);
        let resource = Resource::new("db-1", "Database").with_tag("ContainsPHI", "Yes");
        let result = evaluate(Some(&s), &resource);
        assert_eq!(result.missing_tags, vec!["HIPAAZone", "EncryptionRequired"]);
    }

    #[test]
    fn schema_value_set_still_checked_on_phi_floor_keys() {
        let s = schema(vec![TagRule::mandatory("HIPAAZone").allow(["Secure"])]);
        let resource = Resource::new("db-1", "Database")
            .with_tag("ContainsPHI", "Yes")
            .with_tag("HIPAAZone", "Open")
            .with_tag("EncryptionRequired", "true");
        assert_eq!(evaluate(Some(&s), &resource).missing_tags, vec!["HIPAAZone"]);
    }

    #[test]
    fn default_schema_fallback_with_phi_resource() {
        let resource = Resource::new("db-1", "Database")
            .with_tag("ContainsPHI", "Yes")
            .with_tag("HIPAAZone", "Secure");
        let result = evaluate(None, &resource);

        assert!(result.missing_tags.contains(&"EncryptionRequired".to_string()));
        assert!(!result.missing_tags.contains(&"HIPAAZone".to_string()));
        assert!(!result.missing_tags.contains(&"ContainsPHI".to_string()));
        // Every default key except ContainsPHI is absent.
        for key in DEFAULT_MANDATORY_KEYS.iter().filter(|k| **k != "ContainsPHI") {
            assert!(result.missing_tags.contains(&key.to_string()), "{key}");
        }
        assert_eq!(result.missing_tags.len(), 16);
    }

    #[test]
    fn compliant_iff_missing_set_empty_across_mixed_inputs() {
        let s = schema(vec![
            TagRule::mandatory("Owner"),
            TagRule::mandatory("Environment").allow(["Prod", "Dev"]),
            TagRule::conditional("DataSteward", TagDependency::present("DataClassification")),
            TagRule::recommended("Team"),
        ]);
        let resources = vec![
            Resource::new("a", "VM"),
            Resource::new("b", "VM")
                .with_tag("Owner", "x")
                .with_tag("Environment", "Prod"),
            Resource::new("c", "VM")
                .with_tag("Owner", "x")
                .with_tag("Environment", "Prod")
                .with_tag("DataClassification", "Internal"),
            Resource::new("d", "VM").with_tag("ContainsPHI", "yes"),
            Resource::new("e", "VM")
                .with_tag("Owner", "x")
                .with_tag("Environment", "QA"),
        ];
        for resource in &resources {
            for result in [evaluate(Some(&s), resource), evaluate(None, resource)] {
                assert_eq!(result.is_compliant, result.missing_tags.is_empty());
            }
        }
    }

    #[test]
    fn trace_records_each_rule_outcome() {
        let s = schema(vec![
            TagRule::mandatory("Owner"),
            TagRule::mandatory("Environment").allow(["Prod"]),
            TagRule::conditional("DataSteward", TagDependency::present("DataClassification")),
            TagRule::recommended("Team"),
        ]);
        let resource = Resource::new("vm-1", "VM")
            .with_tag("Owner", "alice")
            .with_tag("Environment", "Dev")
            .with_tag("ContainsPHI", "yes");
        let trace = evaluate_with_trace(Some(&s), &resource);

        let outcomes: Vec<(String, StepOutcome)> = trace
            .steps
            .iter()
            .map(|s| (s.key.clone(), s.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("Owner".to_string(), StepOutcome::Satisfied),
                ("Environment".to_string(), StepOutcome::DisallowedValue),
                ("DataSteward".to_string(), StepOutcome::DependencyNotMet),
                ("Team".to_string(), StepOutcome::Advisory),
                ("HIPAAZone".to_string(), StepOutcome::PhiFloor),
                ("EncryptionRequired".to_string(), StepOutcome::PhiFloor),
            ]
        );
        assert_eq!(trace.result, evaluate(Some(&s), &resource));
        assert_eq!(trace.schema_name, "test");
    }

    #[test]
    fn trace_names_default_schema_on_fallback() {
        let trace = evaluate_with_trace(None, &Resource::new("vm-1", "VM"));
        assert_eq!(trace.schema_name, "built-in-default");
        assert_eq!(trace.result.missing_tags.len(), 16);
    }

    #[test]
    fn parallel_evaluation_preserves_input_order() {
        let s = schema(vec![TagRule::mandatory("Owner")]);
        let resources: Vec<Resource> = (0..37)
            .map(|i| {
                let r = Resource::new(format!("vm-{i}"), "VM");
                if i % 3 == 0 {
                    r.with_tag("Owner", "alice")
                } else {
                    r
                }
            })
            .collect();

        let sequential = evaluate_all(Some(&s), &resources, 1);
        let parallel = evaluate_all(Some(&s), &resources, 4);
        assert_eq!(sequential, parallel);
        assert_eq!(parallel[5].resource_id, "vm-5");
    }

    #[test]
    fn compliance_state_follows_result() {
        let s = schema(vec![TagRule::mandatory("Owner")]);
        let bad = evaluate(Some(&s), &Resource::new("a", "VM"));
        let good = evaluate(Some(&s), &Resource::new("b", "VM").with_tag("Owner", "x"));
        assert_eq!(ComplianceState::from_result(&bad), ComplianceState::NonCompliant);
        assert_eq!(ComplianceState::from_result(&good), ComplianceState::Compliant);
        assert_eq!(ComplianceState::default().to_string(), "unknown");
    }
}
