// coordinator.rs — Effectful remediation with per-resource write exclusion.
//
// Remediating one resource is a read-modify-write:
//
// 1. Acquire the in-flight token for the resource id (wait or reject)
// 2. Read live tags from the writer and evaluate them
// 3. Compute the desired map; skip the write if nothing changes
// 4. Apply, re-read, re-evaluate
// 5. Release the token (on success, failure, or unwind)
//
// Two concurrent requests for one id never interleave, so neither side's
// fix can be lost. Requests for different ids proceed independently.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tg_policy::{evaluate, ComplianceResult, Schema, TagMap};

use crate::error::RemediationError;
use crate::remediator::Remediator;
use crate::writer::TagWriter;

/// What to do when a remediation for the same resource is already running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Block until the running remediation releases the resource.
    #[default]
    Wait,
    /// Fail fast with [`RemediationError::Conflict`].
    Reject,
}

/// Result of one read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub resource_id: String,
    pub desired: TagMap,
    /// Keys whose value this remediation set.
    pub changed_keys: Vec<String>,
    /// False when the live tags already matched the desired map.
    pub written: bool,
    /// SHA-256 of the resource id and desired map; stable across retries,
    /// usable as a transport idempotency key.
    pub fingerprint: String,
}

/// A remediation bracketed by live evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRemediation {
    pub before: ComplianceResult,
    pub after: ComplianceResult,
    pub outcome: RemediationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub resource_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub remediated: Vec<ResourceRemediation>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    /// Resources that were written to.
    pub fn written_count(&self) -> usize {
        self.remediated.iter().filter(|r| r.outcome.written).count()
    }

    /// Resources whose live re-evaluation came back compliant.
    pub fn now_compliant_count(&self) -> usize {
        self.remediated.iter().filter(|r| r.after.is_compliant).count()
    }
}

#[derive(Default)]
struct InFlight {
    ids: Mutex<HashSet<String>>,
    released: Condvar,
    /// Callers currently blocked behind another remediation.
    waiting: AtomicUsize,
}

impl InFlight {
    // The set is only ever updated by single insert/remove calls, so a
    // poisoned lock still guards a consistent set.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the in-flight token for one resource id until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
    resource_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.resource_id);
        self.in_flight.released.notify_all();
    }
}

pub struct RemediationCoordinator<W: TagWriter> {
    writer: W,
    remediator: Remediator,
    on_conflict: ConflictPolicy,
    in_flight: InFlight,
}

impl<W: TagWriter> RemediationCoordinator<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            remediator: Remediator::default(),
            on_conflict: ConflictPolicy::default(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_remediator(mut self, remediator: Remediator) -> Self {
        self.remediator = remediator;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn acquire(&self, resource_id: &str) -> Result<InFlightGuard<'_>, RemediationError> {
        let mut ids = self.in_flight.lock();
        while ids.contains(resource_id) {
            match self.on_conflict {
                ConflictPolicy::Reject => {
                    tracing::debug!(resource = %resource_id, "rejecting concurrent remediation");
                    return Err(RemediationError::Conflict {
                        resource_id: resource_id.to_string(),
                    });
                }
                ConflictPolicy::Wait => {
                    let waiting = self.in_flight.waiting.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::debug!(resource = %resource_id, waiting, "waiting for in-flight remediation");
                    ids = self
                        .in_flight
                        .released
                        .wait(ids)
                        .unwrap_or_else(PoisonError::into_inner);
                    self.in_flight.waiting.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        ids.insert(resource_id.to_string());
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            resource_id: resource_id.to_string(),
        })
    }

    /// Fill `missing_tags` on `resource_id` with the placeholder.
    ///
    /// The list may come from an earlier scan. Under the token the live
    /// resource is re-evaluated and only keys that are still missing are
    /// filled, so a value set since the scan is kept.
    pub fn remediate_missing(
        &self,
        schema: Option<&Schema>,
        resource_id: &str,
        missing_tags: &[String],
    ) -> Result<RemediationOutcome, RemediationError> {
        let _guard = self.acquire(resource_id)?;
        let live = self.writer.read_resource(resource_id)?;
        let still_missing = evaluate(schema, &live).missing_tags;
        let (keep, stale): (Vec<String>, Vec<String>) = missing_tags
            .iter()
            .cloned()
            .partition(|key| still_missing.contains(key));
        if !stale.is_empty() {
            tracing::debug!(resource = %resource_id, keys = ?stale, "skipping keys satisfied since scan");
        }
        self.write_desired(resource_id, &keep, &live.tags)
    }

    /// Evaluate live tags, remediate what is missing, then re-read and
    /// re-evaluate. `after` reflects the backend, not the desired map.
    pub fn remediate_resource(
        &self,
        schema: Option<&Schema>,
        resource_id: &str,
    ) -> Result<ResourceRemediation, RemediationError> {
        let _guard = self.acquire(resource_id)?;

        let live = self.writer.read_resource(resource_id)?;
        let before = evaluate(schema, &live);
        let outcome = self.write_desired(resource_id, &before.missing_tags, &live.tags)?;

        let after = if outcome.written {
            evaluate(schema, &self.writer.read_resource(resource_id)?)
        } else {
            before.clone()
        };
        tracing::info!(
            resource = %resource_id,
            written = outcome.written,
            compliant_before = before.is_compliant,
            compliant_after = after.is_compliant,
            "remediated resource"
        );
        Ok(ResourceRemediation {
            before,
            after,
            outcome,
        })
    }

    /// Remediate each id in turn. A failure on one resource is recorded and
    /// the batch moves on.
    pub fn remediate_batch<S: AsRef<str>>(
        &self,
        schema: Option<&Schema>,
        resource_ids: &[S],
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for id in resource_ids {
            let id = id.as_ref();
            match self.remediate_resource(schema, id) {
                Ok(done) => report.remediated.push(done),
                Err(e) => {
                    tracing::warn!(resource = %id, error = %e, "remediation failed");
                    report.failed.push(BatchFailure {
                        resource_id: id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            writer = self.writer.name(),
            remediated = report.remediated.len(),
            written = report.written_count(),
            failed = report.failed.len(),
            "remediation batch finished"
        );
        report
    }

    // Caller holds the in-flight token for `resource_id`.
    fn write_desired(
        &self,
        resource_id: &str,
        missing_tags: &[String],
        current: &TagMap,
    ) -> Result<RemediationOutcome, RemediationError> {
        let desired = self
            .remediator
            .remediate(resource_id, missing_tags, current);
        let changed_keys: Vec<String> = desired
            .iter()
            .filter(|(k, v)| current.get(*k) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect();

        let written = desired != *current;
        if written {
            self.writer.apply(resource_id, &desired)?;
            tracing::debug!(resource = %resource_id, keys = ?changed_keys, "applied tag update");
        }

        Ok(RemediationOutcome {
            resource_id: resource_id.to_string(),
            fingerprint: fingerprint(resource_id, &desired),
            desired,
            changed_keys,
            written,
        })
    }
}

fn fingerprint(resource_id: &str, desired: &TagMap) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource_id.as_bytes());
    for (key, value) in desired {
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
