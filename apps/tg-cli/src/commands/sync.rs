// sync.rs — `tg sync`: compile the active schema for external enforcement.

use std::path::PathBuf;

use clap::Args;
use tg_policy::{
    default_schema, to_external_policy, ExternalPolicyDocument, FilePolicyPublisher,
    PolicyPublisher, PublishReceipt,
};

use crate::config::EngineConfig;

#[derive(Args)]
pub struct SyncArgs {
    /// Output directory (defaults to the configured one).
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Print the compiled document instead of publishing it.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn execute(args: &SyncArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let doc = compile(config)?;

    for dropped in &doc.dropped_rules {
        eprintln!(
            "not enforced externally: {} ({}): {}",
            dropped.key, dropped.requirement, dropped.reason
        );
    }

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let receipt = publish(args, config, &doc)?;
    println!("{}", describe(&doc, &receipt));
    Ok(())
}

/// The active (or default) schema compiled under the configured name.
fn compile(config: &EngineConfig) -> anyhow::Result<ExternalPolicyDocument> {
    let active = super::active_schema(config)?;
    let schema = active.as_ref().unwrap_or(default_schema());

    let doc = to_external_policy(schema);
    Ok(match &config.sync.policy_name {
        Some(name) => doc.renamed(name.clone()),
        None => doc,
    })
}

fn publish(
    args: &SyncArgs,
    config: &EngineConfig,
    doc: &ExternalPolicyDocument,
) -> anyhow::Result<PublishReceipt> {
    let dir = args
        .output
        .clone()
        .unwrap_or_else(|| config.sync.output_dir.clone());
    Ok(FilePolicyPublisher::new(dir).publish(doc)?)
}

fn describe(doc: &ExternalPolicyDocument, receipt: &PublishReceipt) -> String {
    if receipt.changed {
        format!(
            "Published '{}' ({} clause(s)) to {}",
            doc.policy_name,
            doc.clauses.len(),
            receipt.location
        )
    } else {
        format!("'{}' already up to date at {}", doc.policy_name, receipt.location)
    }
}
