//! # tg-remediation
//!
//! Turns compliance verdicts into tag writes without clobbering anything.
//!
//! [`Remediator`] is the pure half: given the missing keys and the current
//! tags it computes the desired map, filling gaps with a placeholder and
//! leaving every other tag alone. [`RemediationCoordinator`] is the
//! effectful half: it drives a [`TagWriter`] under a per-resource in-flight
//! token, skips writes that would change nothing, and re-evaluates live tags
//! after every write.

pub mod coordinator;
pub mod error;
pub mod remediator;
pub mod writer;

pub use coordinator::{
    BatchFailure, BatchReport, ConflictPolicy, RemediationCoordinator, RemediationOutcome,
    ResourceRemediation,
};
pub use error::{MutationError, RemediationError};
pub use remediator::{remediate, Remediator, PLACEHOLDER_VALUE};
pub use writer::TagWriter;
