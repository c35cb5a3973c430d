// remediate.rs — `tg remediate`: fill missing tags with the placeholder.
//
// Targets are either the ids given on the command line or every
// non-compliant resource from a fresh scan. Each target is re-read and
// re-evaluated live by the coordinator, so a stale scan never causes a
// wrong write.

use std::path::PathBuf;

use clap::Args;
use tg_inventory::{CancellationToken, Scanner};
use tg_policy::evaluate;
use tg_remediation::{RemediationCoordinator, Remediator, TagWriter};

use crate::config::EngineConfig;

#[derive(Args)]
pub struct RemediateArgs {
    /// Inventory snapshot (defaults to the configured one).
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    /// Only remediate these resource ids (repeatable).
    #[arg(long = "resource")]
    pub resources: Vec<String>,
    /// Show the tags that would be written without writing them.
    #[arg(long)]
    pub dry_run: bool,
    /// Print the batch report as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: &RemediateArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let schema = super::active_schema(config)?;
    let inventory = super::open_inventory(config, args.snapshot.as_deref())?;
    let remediator = Remediator::with_placeholder(&config.remediation.placeholder)?;

    let targets: Vec<String> = if args.resources.is_empty() {
        let report = Scanner::new(config.scan_options()).scan(
            &inventory,
            schema.as_ref(),
            &CancellationToken::new(),
        );
        if !report.is_complete() {
            eprintln!(
                "warning: {}; remediating only what was evaluated",
                report.summary()
            );
        }
        report.non_compliant().map(|r| r.resource_id.clone()).collect()
    } else {
        args.resources.clone()
    };

    if targets.is_empty() {
        println!("Nothing to remediate.");
        return Ok(());
    }

    if args.dry_run {
        for id in &targets {
            let resource = inventory.read_resource(id)?;
            let result = evaluate(schema.as_ref(), &resource);
            let desired = remediator.remediate(id, &result.missing_tags, &resource.tags);
            let added: Vec<_> = desired
                .iter()
                .filter(|(k, v)| resource.tags.get(*k) != Some(*v))
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            if added.is_empty() {
                println!("{}: no change", id);
            } else {
                println!("{}: would set {}", id, added.join(", "));
            }
        }
        return Ok(());
    }

    let coordinator = RemediationCoordinator::new(inventory)
        .with_remediator(remediator)
        .with_conflict_policy(config.remediation.on_conflict);
    let batch = coordinator.remediate_batch(schema.as_ref(), &targets);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        for done in &batch.remediated {
            let status = if done.after.is_compliant {
                "compliant".to_string()
            } else {
                format!("still missing {}", done.after.missing_tags.join(", "))
            };
            let action = if done.outcome.written {
                format!("set {}", done.outcome.changed_keys.join(", "))
            } else {
                "no write".to_string()
            };
            println!("{:<36} {:<40} {}", done.outcome.resource_id, action, status);
        }
        for failure in &batch.failed {
            println!("{:<36} FAILED: {}", failure.resource_id, failure.error);
        }
        println!();
        println!(
            "{} resource(s) written, {} now compliant, {} failed",
            batch.written_count(),
            batch.now_compliant_count(),
            batch.failed.len()
        );
    }

    if !batch.failed.is_empty() {
        anyhow::bail!("{} resource(s) could not be remediated", batch.failed.len());
    }
    Ok(())
}
