// scan.rs — Cancellable, paginated compliance scan.
//
// A scan walks an inventory source page by page:
//
// 1. Check the cancellation token before fetching each page
// 2. Drop resources whose id matches an exclusion pattern
// 3. Evaluate the page in chunks, checking the token between chunks
// 4. Fold everything evaluated into fleet metrics
//
// A listing error or a cancellation ends the walk early. The report then
// carries what was evaluated, flagged partial, and refuses to hand out its
// metrics as authoritative.

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use tg_policy::{evaluate_all, Aggregator, ComplianceResult, FleetMetrics, Resource, Schema};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::source::InventorySource;

/// Resources evaluated between two cancellation checks.
pub const EVALUATION_CHUNK: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Worker threads used to evaluate a chunk. `1` evaluates inline.
    pub parallelism: usize,
    /// Glob patterns matched against resource ids; matches are skipped.
    pub exclude_patterns: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Why a scan stopped before the inventory was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialReason {
    Cancelled,
    SourceFailed { message: String, retryable: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanCompleteness {
    Complete,
    Partial {
        reason: PartialReason,
        /// Resources the source returned before the scan stopped.
        listed: usize,
        estimated_total: Option<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Name of the inventory source.
    pub source: String,
    pub results: Vec<ComplianceResult>,
    pub metrics: FleetMetrics,
    /// Resources skipped by exclusion patterns.
    pub excluded: usize,
    pub completeness: ScanCompleteness,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.completeness, ScanCompleteness::Complete)
    }

    /// Metrics that may be reported as the fleet's score. `None` for a
    /// partial scan, whose metrics only describe what was evaluated.
    pub fn authoritative_metrics(&self) -> Option<&FleetMetrics> {
        self.is_complete().then_some(&self.metrics)
    }

    /// Whether rerunning the scan may succeed where this one stopped short.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.completeness,
            ScanCompleteness::Partial {
                reason: PartialReason::SourceFailed {
                    retryable: true,
                    ..
                },
                ..
            }
        )
    }

    pub fn non_compliant(&self) -> impl Iterator<Item = &ComplianceResult> {
        self.results.iter().filter(|r| !r.is_compliant)
    }

    /// One-line, user-facing status.
    pub fn summary(&self) -> String {
        let evaluated = self.results.len();
        match &self.completeness {
            ScanCompleteness::Complete => format!(
                "{} resources evaluated, {} compliant ({}%)",
                evaluated, self.metrics.compliant_resources, self.metrics.compliance_score_percent
            ),
            ScanCompleteness::Partial {
                estimated_total, ..
            } => {
                let total = estimated_total
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "{} of ~{} resources evaluated, scan incomplete",
                    evaluated, total
                )
            }
        }
    }
}

pub struct Scanner {
    options: ScanOptions,
    excludes: Vec<Pattern>,
    aggregator: Aggregator,
}

impl Scanner {
    /// Build a scanner. Invalid exclusion patterns are logged and ignored,
    /// so a typo never hides resources from the scan.
    pub fn new(options: ScanOptions) -> Self {
        let excludes = options
            .exclude_patterns
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(pattern = %raw, error = %e, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();
        Self {
            options,
            excludes,
            aggregator: Aggregator::default(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    fn is_excluded(&self, id: &str) -> bool {
        self.excludes.iter().any(|p| p.matches(id))
    }

    /// Scan `source` against `schema` (`None` uses the built-in default).
    pub fn scan(
        &self,
        source: &dyn InventorySource,
        schema: Option<&Schema>,
        cancel: &CancellationToken,
    ) -> ScanReport {
        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%scan_id, source = source.name(), "scan started");

        let mut evaluated: Vec<Resource> = Vec::new();
        let mut results: Vec<ComplianceResult> = Vec::new();
        let mut listed = 0usize;
        let mut excluded = 0usize;
        let mut estimated_total: Option<usize> = None;
        let mut cursor: Option<String> = None;
        let mut stopped: Option<PartialReason> = None;

        'pages: loop {
            if cancel.is_cancelled() {
                stopped = Some(PartialReason::Cancelled);
                break;
            }

            let page = match source.list_page(cursor.as_deref()) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(%scan_id, error = %e, retryable = e.is_retryable(), "inventory listing failed");
                    stopped = Some(PartialReason::SourceFailed {
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                    break;
                }
            };
            if page.estimated_total.is_some() {
                estimated_total = page.estimated_total;
            }
            listed += page.resources.len();

            let (kept, skipped): (Vec<Resource>, Vec<Resource>) = page
                .resources
                .into_iter()
                .partition(|r| !self.is_excluded(&r.id));
            excluded += skipped.len();

            for chunk in kept.chunks(EVALUATION_CHUNK) {
                if cancel.is_cancelled() {
                    stopped = Some(PartialReason::Cancelled);
                    break 'pages;
                }
                results.extend(evaluate_all(schema, chunk, self.options.parallelism));
                evaluated.extend_from_slice(chunk);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let metrics = self.aggregator.aggregate(evaluated.iter().zip(results.iter()));
        let completeness = match stopped {
            None => ScanCompleteness::Complete,
            Some(reason) => ScanCompleteness::Partial {
                reason,
                listed,
                estimated_total,
            },
        };

        let report = ScanReport {
            scan_id,
            started_at,
            finished_at: Utc::now(),
            source: source.name().to_string(),
            results,
            metrics,
            excluded,
            completeness,
        };
        if report.is_complete() {
            tracing::info!(%scan_id, summary = %report.summary(), "scan finished");
        } else {
            tracing::warn!(%scan_id, summary = %report.summary(), "scan finished partial");
        }
        report
    }
}
