// scan.rs — `tg scan`: evaluate the inventory and report fleet compliance.

use std::path::PathBuf;

use clap::Args;
use tg_inventory::{ScanCompleteness, ScanReport, Scanner};

use crate::config::EngineConfig;

#[derive(Args)]
pub struct ScanArgs {
    /// Inventory snapshot (defaults to the configured one).
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    /// Extra glob pattern on resource ids to skip (repeatable).
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,
    /// Cancel the scan after this many seconds; the report is then partial.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Print the full report as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: &ScanArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let report = run(args, config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_complete() {
        anyhow::bail!("scan incomplete: {}", report.summary());
    }
    Ok(())
}

fn run(args: &ScanArgs, config: &EngineConfig) -> anyhow::Result<ScanReport> {
    let schema = super::active_schema(config)?;
    let inventory = super::open_inventory(config, args.snapshot.as_deref())?;

    let mut options = config.scan_options();
    options.exclude_patterns.extend(args.exclude.iter().cloned());

    let cancel = super::deadline_token(args.timeout_secs);
    Ok(Scanner::new(options).scan(&inventory, schema.as_ref(), &cancel))
}

fn print_report(report: &ScanReport) {
    println!("Scan {} ({})", report.scan_id, report.source);
    println!("{}", report.summary());
    if report.excluded > 0 {
        println!("{} resource(s) excluded by pattern", report.excluded);
    }
    println!();

    match report.authoritative_metrics() {
        Some(m) => {
            println!("Compliance score:   {}%", m.compliance_score_percent);
            println!("PHI resources:      {}", m.phi_resource_count);
            println!("Cost attribution:   {}%", m.attribution_rate_percent);
            println!(
                "Unallocated spend:  {}.{:02}/month",
                m.unallocated_spend_cents / 100,
                m.unallocated_spend_cents % 100
            );
            if m.resources_without_cost_data > 0 {
                println!("No cost data:       {} resource(s)", m.resources_without_cost_data);
            }
        }
        None => {
            if let ScanCompleteness::Partial { reason, .. } = &report.completeness {
                println!("No fleet score: scan stopped early ({:?}).", reason);
            }
            if report.is_retryable() {
                println!("The failure looks transient; rerunning the scan may succeed.");
            }
        }
    }

    let failing: Vec<_> = report.non_compliant().collect();
    if failing.is_empty() {
        return;
    }
    println!();
    println!("{:<36} {:<20} MISSING", "RESOURCE", "TYPE");
    println!("{}", "-".repeat(90));
    for result in failing {
        println!(
            "{:<36} {:<20} {}",
            result.resource_id,
            result.resource_type,
            result.missing_tags.join(", ")
        );
    }
}
