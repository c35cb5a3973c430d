// aggregate.rs — Fleet-level metrics folded from per-resource verdicts.
//
// The fold is pure integer arithmetic over counts, so it is commutative and
// associative: shards of a paginated inventory can be aggregated separately
// and combined with `FleetMetrics::merge`. Percentages are derived from the
// counts, never accumulated.

use serde::{Deserialize, Serialize};

use crate::defaults::{is_phi, COST_ALLOCATION_TAG};
use crate::evaluator::ComplianceResult;
use crate::resource::Resource;

/// Aggregate compliance and cost-attribution metrics over a set of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetMetrics {
    pub total_resources: usize,
    pub compliant_resources: usize,
    /// `round(100 * compliant / total)`, or 100 for an empty fleet.
    pub compliance_score_percent: u32,
    pub phi_resource_count: usize,
    /// Resources carrying a non-empty cost-allocation tag.
    pub attributed_resources: usize,
    /// `round(100 * attributed / total)`, or 100 for an empty fleet.
    pub attribution_rate_percent: u32,
    /// Known monthly spend of resources without a cost-allocation tag.
    pub unallocated_spend_cents: u64,
    /// Resources whose cost is unknown. They contribute nothing to spend.
    pub resources_without_cost_data: usize,
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self {
            total_resources: 0,
            compliant_resources: 0,
            compliance_score_percent: 100,
            phi_resource_count: 0,
            attributed_resources: 0,
            attribution_rate_percent: 100,
            unallocated_spend_cents: 0,
            resources_without_cost_data: 0,
        }
    }
}

impl FleetMetrics {
    /// Combine metrics computed over disjoint shards.
    pub fn merge(self, other: FleetMetrics) -> FleetMetrics {
        let mut merged = FleetMetrics {
            total_resources: self.total_resources + other.total_resources,
            compliant_resources: self.compliant_resources + other.compliant_resources,
            phi_resource_count: self.phi_resource_count + other.phi_resource_count,
            attributed_resources: self.attributed_resources + other.attributed_resources,
            unallocated_spend_cents: self.unallocated_spend_cents + other.unallocated_spend_cents,
            resources_without_cost_data: self.resources_without_cost_data
                + other.resources_without_cost_data,
            ..FleetMetrics::default()
        };
        merged.recompute_rates();
        merged
    }

    fn recompute_rates(&mut self) {
        self.compliance_score_percent = percent(self.compliant_resources, self.total_resources);
        self.attribution_rate_percent = percent(self.attributed_resources, self.total_resources);
    }
}

/// Rounded percentage; an empty denominator is defined as 100.
fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    // Round half up in integers: (200 * part + total) / (2 * total).
    ((200 * part as u64 + total as u64) / (2 * total as u64)) as u32
}

/// Folds `(resource, result)` pairs into [`FleetMetrics`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    cost_allocation_key: String,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            cost_allocation_key: COST_ALLOCATION_TAG.to_string(),
        }
    }
}

impl Aggregator {
    pub fn with_cost_allocation_key(key: impl Into<String>) -> Self {
        Self {
            cost_allocation_key: key.into(),
        }
    }

    pub fn aggregate<'a, I>(&self, items: I) -> FleetMetrics
    where
        I: IntoIterator<Item = (&'a Resource, &'a ComplianceResult)>,
    {
        let mut metrics = FleetMetrics::default();

        for (resource, result) in items {
            metrics.total_resources += 1;
            if result.is_compliant {
                metrics.compliant_resources += 1;
            }
            if is_phi(&resource.tags) {
                metrics.phi_resource_count += 1;
            }

            let attributed = resource.tag_value(&self.cost_allocation_key).is_some();
            if attributed {
                metrics.attributed_resources += 1;
            }
            match resource.monthly_cost_cents {
                Some(cents) if !attributed => metrics.unallocated_spend_cents += cents,
                Some(_) => {}
                None => metrics.resources_without_cost_data += 1,
            }
        }

        metrics.recompute_rates();
        metrics
    }
}

/// Aggregate with the default cost-allocation key (`CostCenter`).
pub fn aggregate<'a, I>(items: I) -> FleetMetrics
where
    I: IntoIterator<Item = (&'a Resource, &'a ComplianceResult)>,
{
    Aggregator::default().aggregate(items)
}
