// schema.rs — Tag schema model and load-time validation.
//
// A Schema is an ordered list of TagRules with unique keys. Rules are
// validated exactly once, when the Schema is constructed (either through
// `Schema::new` or through deserialization), so evaluation never has to
// re-derive requirement tiers from strings.
//
// On disk a schema looks like:
//
// ```yaml
// name: healthcare-default
// rules:
//   - key: Owner
//     requirement: mandatory
//   - key: Environment
//     requirement: mandatory
//     allowed_values: [Prod, Dev]
//   - key: HIPAAZone
//     requirement: conditional
//     dependency:
//       key: ContainsPHI
//       equals: "Yes"
//   - key: Team
//     requirement: recommended
// ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::resource::{non_empty, TagMap};

/// How strongly a rule is enforced.
///
/// Only Mandatory and Conditional rules affect the compliance verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Always enforced.
    Mandatory,
    /// Enforced only when the rule's dependency is satisfied.
    Conditional,
    /// Advisory only; reported but never counted against compliance.
    Recommended,
}

impl Requirement {
    /// Whether this tier can make a resource non-compliant.
    pub fn affects_verdict(self) -> bool {
        matches!(self, Requirement::Mandatory | Requirement::Conditional)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Mandatory => write!(f, "mandatory"),
            Requirement::Conditional => write!(f, "conditional"),
            Requirement::Recommended => write!(f, "recommended"),
        }
    }
}

impl FromStr for Requirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mandatory" => Ok(Requirement::Mandatory),
            "conditional" => Ok(Requirement::Conditional),
            "recommended" => Ok(Requirement::Recommended),
            other => Err(other.to_string()),
        }
    }
}

/// The predicate a dependency applies to another tag's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyCondition {
    /// The tag equals this value (case-insensitive).
    Equals(String),
    /// The tag equals any of these values (case-insensitive).
    OneOf(Vec<String>),
    /// The tag exists with a non-empty value.
    Present,
}

/// A predicate over another tag, gating a Conditional rule.
///
/// The referenced key does not need to be a rule in the schema. A dependency
/// on a key no resource carries simply never fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDependency {
    pub key: String,
    pub condition: DependencyCondition,
}

impl TagDependency {
    /// "active only when `key` equals `value`".
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            condition: DependencyCondition::Equals(value.into()),
        }
    }

    /// "active only when `key` is one of `values`".
    pub fn one_of<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            condition: DependencyCondition::OneOf(values.into_iter().map(Into::into).collect()),
        }
    }

    /// "active only when `key` is present".
    pub fn present(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            condition: DependencyCondition::Present,
        }
    }

    /// Evaluate the predicate against a resource's tags.
    pub fn is_satisfied(&self, tags: &TagMap) -> bool {
        let Some(actual) = tags.get(&self.key).and_then(|v| non_empty(v)) else {
            return false;
        };
        match &self.condition {
            DependencyCondition::Equals(expected) => actual.eq_ignore_ascii_case(expected.trim()),
            DependencyCondition::OneOf(values) => values
                .iter()
                .any(|expected| actual.eq_ignore_ascii_case(expected.trim())),
            DependencyCondition::Present => true,
        }
    }

    fn validate(&self, rule_key: &str) -> Result<(), SchemaError> {
        let malformed = |reason: &str| SchemaError::MalformedDependency {
            key: rule_key.to_string(),
            reason: reason.to_string(),
        };
        if self.key.trim().is_empty() {
            return Err(malformed("dependency key is empty"));
        }
        match &self.condition {
            DependencyCondition::Equals(value) if value.trim().is_empty() => {
                Err(malformed("'equals' value is empty"))
            }
            DependencyCondition::OneOf(values) if values.is_empty() => {
                Err(malformed("'one_of' has no values"))
            }
            DependencyCondition::OneOf(values) if values.iter().any(|v| v.trim().is_empty()) => {
                Err(malformed("'one_of' contains an empty value"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TagDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            DependencyCondition::Equals(value) => write!(f, "{} == {}", self.key, value),
            DependencyCondition::OneOf(values) => {
                write!(f, "{} in [{}]", self.key, values.join(", "))
            }
            DependencyCondition::Present => write!(f, "{} present", self.key),
        }
    }
}

/// One governance requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRule {
    /// Tag key, unique within a schema.
    pub key: String,
    pub requirement: Requirement,
    /// Accepted values. Empty means any non-empty value is accepted.
    pub allowed_values: Vec<String>,
    /// Gate for Conditional rules. Must be `None` for other tiers.
    pub dependency: Option<TagDependency>,
    /// Optional display text.
    pub description: Option<String>,
}

impl TagRule {
    pub fn mandatory(key: impl Into<String>) -> Self {
        Self::with_requirement(key, Requirement::Mandatory)
    }

    pub fn recommended(key: impl Into<String>) -> Self {
        Self::with_requirement(key, Requirement::Recommended)
    }

    pub fn conditional(key: impl Into<String>, dependency: TagDependency) -> Self {
        Self {
            dependency: Some(dependency),
            ..Self::with_requirement(key, Requirement::Conditional)
        }
    }

    fn with_requirement(key: impl Into<String>, requirement: Requirement) -> Self {
        Self {
            key: key.into(),
            requirement,
            allowed_values: Vec::new(),
            dependency: None,
            description: None,
        }
    }

    /// Restrict the rule to a fixed value set.
    pub fn allow<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether `value` satisfies this rule's value constraint.
    ///
    /// The value must be non-empty and, when a value set is declared, an
    /// exact member of it. A placeholder or stale value is not compliant.
    pub fn accepts(&self, value: Option<&str>) -> bool {
        match value.and_then(non_empty) {
            None => false,
            Some(v) => self.allowed_values.is_empty() || self.allowed_values.iter().any(|a| a == v),
        }
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for value in &self.allowed_values {
            if !seen.insert(value.as_str()) {
                return Err(SchemaError::DuplicateAllowedValue {
                    key: self.key.clone(),
                    value: value.clone(),
                });
            }
        }

        match (&self.requirement, &self.dependency) {
            (Requirement::Conditional, None) => Err(SchemaError::MalformedDependency {
                key: self.key.clone(),
                reason: "conditional rule requires a dependency".to_string(),
            }),
            (Requirement::Conditional, Some(dep)) => dep.validate(&self.key),
            (tier, Some(_)) => Err(SchemaError::MalformedDependency {
                key: self.key.clone(),
                reason: format!("{} rules cannot declare a dependency", tier),
            }),
            (_, None) => Ok(()),
        }
    }
}

/// A validated, ordered collection of tag rules with unique keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDocument", into = "SchemaDocument")]
pub struct Schema {
    name: String,
    rules: Vec<TagRule>,
}

impl Schema {
    /// Validate and build a schema. Nothing is partially accepted.
    pub fn new(name: impl Into<String>, rules: Vec<TagRule>) -> Result<Self, SchemaError> {
        let mut keys = HashSet::new();
        let mut validated = Vec::with_capacity(rules.len());

        for (index, mut rule) in rules.into_iter().enumerate() {
            let key = rule.key.trim();
            if key.is_empty() {
                return Err(SchemaError::EmptyKey { index });
            }
            rule.key = key.to_string();
            if !keys.insert(rule.key.clone()) {
                return Err(SchemaError::DuplicateKey { key: rule.key });
            }
            rule.validate()?;
            validated.push(rule);
        }

        Ok(Self {
            name: name.into(),
            rules: validated,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    pub fn get(&self, key: &str) -> Option<&TagRule> {
        self.rules.iter().find(|r| r.key == key)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse and validate a YAML schema document.
    pub fn from_yaml_str(data: &str) -> Result<Self, SchemaError> {
        let doc: SchemaDocument = serde_yaml::from_str(data)?;
        Schema::try_from(doc)
    }

    /// Parse and validate a JSON schema document.
    pub fn from_json_str(data: &str) -> Result<Self, SchemaError> {
        let doc: SchemaDocument = serde_json::from_str(data)?;
        Schema::try_from(doc)
    }
}

// ── Persisted representation ──
//
// The on-disk shape keeps requirement as a string and the dependency as a
// flat record so validation can report precise errors instead of a generic
// serde "unknown variant".

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaDocument {
    #[serde(default = "default_schema_name")]
    name: String,
    #[serde(default)]
    rules: Vec<RuleRecord>,
}

fn default_schema_name() -> String {
    "custom".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleRecord {
    key: String,
    requirement: String,
    #[serde(default, alias = "allowedValues", skip_serializing_if = "Vec::is_empty")]
    allowed_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependency: Option<DependencyRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DependencyRecord {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equals: Option<String>,
    #[serde(default, alias = "oneOf", skip_serializing_if = "Option::is_none")]
    one_of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    present: bool,
}

impl DependencyRecord {
    fn into_dependency(self, rule_key: &str) -> Result<TagDependency, SchemaError> {
        let condition = match (self.equals, self.one_of, self.present) {
            (Some(value), None, false) => DependencyCondition::Equals(value),
            (None, Some(values), false) => DependencyCondition::OneOf(values),
            (None, None, true) => DependencyCondition::Present,
            (None, None, false) => {
                return Err(SchemaError::MalformedDependency {
                    key: rule_key.to_string(),
                    reason: "expected one of 'equals', 'one_of', or 'present'".to_string(),
                })
            }
            _ => {
                return Err(SchemaError::MalformedDependency {
                    key: rule_key.to_string(),
                    reason: "'equals', 'one_of', and 'present' are mutually exclusive"
                        .to_string(),
                })
            }
        };
        Ok(TagDependency {
            key: self.key,
            condition,
        })
    }
}

impl From<&TagDependency> for DependencyRecord {
    fn from(dep: &TagDependency) -> Self {
        let mut record = DependencyRecord {
            key: dep.key.clone(),
            ..Default::default()
        };
        match &dep.condition {
            DependencyCondition::Equals(value) => record.equals = Some(value.clone()),
            DependencyCondition::OneOf(values) => record.one_of = Some(values.clone()),
            DependencyCondition::Present => record.present = true,
        }
        record
    }
}

impl TryFrom<SchemaDocument> for Schema {
    type Error = SchemaError;

    fn try_from(doc: SchemaDocument) -> Result<Self, Self::Error> {
        let mut rules = Vec::with_capacity(doc.rules.len());
        for record in doc.rules {
            let requirement = record.requirement.parse::<Requirement>().map_err(|value| {
                SchemaError::UnknownRequirement {
                    key: record.key.clone(),
                    value,
                }
            })?;
            let dependency = record
                .dependency
                .map(|d| d.into_dependency(&record.key))
                .transpose()?;
            rules.push(TagRule {
                key: record.key,
                requirement,
                allowed_values: record.allowed_values,
                dependency,
                description: record.description,
            });
        }
        Schema::new(doc.name, rules)
    }
}

impl From<Schema> for SchemaDocument {
    fn from(schema: Schema) -> Self {
        SchemaDocument {
            name: schema.name,
            rules: schema
                .rules
                .into_iter()
                .map(|rule| RuleRecord {
                    dependency: rule.dependency.as_ref().map(DependencyRecord::from),
                    key: rule.key,
                    requirement: rule.requirement.to_string(),
                    allowed_values: rule.allowed_values,
                    description: rule.description,
                })
                .collect(),
        }
    }
}
