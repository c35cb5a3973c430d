//! # tg-policy
//!
//! Declarative tag schemas and compliance evaluation for Tag Governor.
//!
//! A [`Schema`] lists [`TagRule`]s at three tiers (mandatory, conditional,
//! recommended). [`evaluate`] checks one [`Resource`] against a schema and
//! returns a [`ComplianceResult`]; [`aggregate`] folds many results into
//! [`FleetMetrics`]; [`to_external_policy`] compiles the schema for an
//! external enforcement surface.
//!
//! ## Key invariants
//!
//! - **Validated once**: schemas are checked at construction/load; duplicate
//!   keys, unknown tiers and malformed dependencies are rejected whole.
//! - **Disallowed is missing**: a tag holding a value outside the rule's value
//!   set counts exactly like an absent tag.
//! - **PHI floor**: `ContainsPHI = yes` always requires `HIPAAZone` and
//!   `EncryptionRequired`, whatever the schema says.
//! - **Pure**: evaluation, aggregation and sync touch no shared state and are
//!   safe to run in parallel.

pub mod aggregate;
pub mod defaults;
pub mod error;
pub mod evaluator;
pub mod resource;
pub mod schema;
pub mod store;
pub mod sync;

pub use aggregate::{aggregate, Aggregator, FleetMetrics};
pub use defaults::{default_schema, is_phi, DEFAULT_MANDATORY_KEYS, PHI_REQUIRED_KEYS};
pub use error::{SchemaError, SyncError};
pub use evaluator::{
    evaluate, evaluate_all, evaluate_with_trace, ComplianceResult, ComplianceState,
    EvaluationStep, EvaluationTrace, StepOutcome,
};
pub use resource::{Resource, TagMap};
pub use schema::{DependencyCondition, Requirement, Schema, TagDependency, TagRule};
pub use store::{load_schema_file, SchemaStore};
pub use sync::{
    to_external_policy, DroppedRule, ExternalPolicyDocument, FilePolicyPublisher, PolicyClause,
    PolicyEffect, PolicyPublisher, PublishReceipt,
};
