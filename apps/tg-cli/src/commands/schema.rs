// schema.rs — Schema subcommands: validate, apply, show, trace.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use tg_policy::{default_schema, evaluate_with_trace, load_schema_file, Schema, SchemaStore};
use tg_remediation::TagWriter;

use crate::config::EngineConfig;

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Check a schema file without activating it.
    Validate {
        /// Schema file (YAML, or JSON by extension).
        file: PathBuf,
    },
    /// Validate a schema file and make it the active schema.
    Apply {
        file: PathBuf,
    },
    /// Print the active schema (the built-in default if none is set).
    Show {
        /// Print as JSON instead of YAML.
        #[arg(long)]
        json: bool,
    },
    /// Evaluate one resource and show every check the evaluator made.
    Trace {
        resource_id: String,
        /// Inventory snapshot (defaults to the configured one).
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

pub fn execute(cmd: &SchemaCommands, config: &EngineConfig) -> anyhow::Result<()> {
    match cmd {
        SchemaCommands::Validate { file } => {
            let schema = load_schema_file(file)
                .with_context(|| format!("schema {} is invalid", file.display()))?;
            print_rule_counts(&schema);
            println!("Schema '{}' is valid.", schema.name());
        }

        SchemaCommands::Apply { file } => {
            let schema = load_schema_file(file)
                .with_context(|| format!("schema {} is invalid", file.display()))?;
            let store = SchemaStore::new(&config.schema_path);
            store.save(&schema)?;
            print_rule_counts(&schema);
            println!(
                "Activated schema '{}' at {}",
                schema.name(),
                store.path().display()
            );
        }

        SchemaCommands::Show { json } => {
            let active = super::active_schema(config)?;
            let schema = active.as_ref().unwrap_or(default_schema());
            if active.is_none() {
                eprintln!("No schema at {}; showing built-in default.", config.schema_path.display());
            }
            if *json {
                println!("{}", serde_json::to_string_pretty(schema)?);
            } else {
                print!("{}", serde_yaml::to_string(schema)?);
            }
        }

        SchemaCommands::Trace {
            resource_id,
            snapshot,
        } => {
            let schema = super::active_schema(config)?;
            let inventory = super::open_inventory(config, snapshot.as_deref())?;
            let resource = inventory.read_resource(resource_id)?;
            let trace = evaluate_with_trace(schema.as_ref(), &resource);

            println!(
                "{} ({}) against schema '{}'",
                resource.id, resource.resource_type, trace.schema_name
            );
            println!("{:<24} {:<18} DETAIL", "KEY", "OUTCOME");
            println!("{}", "-".repeat(72));
            for step in &trace.steps {
                println!(
                    "{:<24} {:<18} {}",
                    step.key,
                    format!("{:?}", step.outcome),
                    step.detail
                );
            }
            println!();
            if trace.result.is_compliant {
                println!("Compliant.");
            } else {
                println!("Missing: {}", trace.result.missing_tags.join(", "));
            }
        }
    }
    Ok(())
}

fn print_rule_counts(schema: &Schema) {
    let mut counts = [0usize; 3];
    for rule in schema.rules() {
        let slot = match rule.requirement {
            tg_policy::Requirement::Mandatory => 0,
            tg_policy::Requirement::Conditional => 1,
            tg_policy::Requirement::Recommended => 2,
        };
        counts[slot] += 1;
    }
    println!(
        "{} rule(s): {} mandatory, {} conditional, {} recommended",
        schema.len(),
        counts[0],
        counts[1],
        counts[2]
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "name: team-tags\nrules:\n  - key: Owner\n    requirement: mandatory\n  - key: Team\n    requirement: recommended\n";
    const INVALID: &str = "name: broken\nrules:\n  - key: Owner\n    requirement: mandatory\n  - key: Owner\n    requirement: recommended\n";

    fn project() -> (tempfile::TempDir, EngineConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::for_project(dir.path()).unwrap();
        (dir, config)
    }

    fn write(dir: &tempfile::TempDir, name: &str, data: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn validate_does_not_activate() {
        let (dir, config) = project();
        let file = write(&dir, "tags.yaml", VALID);
        execute(&SchemaCommands::Validate { file }, &config).unwrap();
        assert!(!config.schema_path.exists());
    }

    #[test]
    fn apply_activates_valid_schema() {
        let (dir, config) = project();
        let file = write(&dir, "tags.yaml", VALID);
        execute(&SchemaCommands::Apply { file }, &config).unwrap();

        let active = super::super::active_schema(&config).unwrap().unwrap();
        assert_eq!(active.name(), "team-tags");
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn apply_rejects_invalid_file_and_keeps_active_schema() {
        let (dir, config) = project();
        execute(
            &SchemaCommands::Apply {
                file: write(&dir, "good.yaml", VALID),
            },
            &config,
        )
        .unwrap();
        let before = std::fs::read_to_string(&config.schema_path).unwrap();

        let err = execute(
            &SchemaCommands::Apply {
                file: write(&dir, "bad.yaml", INVALID),
            },
            &config,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("duplicate rule key 'Owner'"));
        assert_eq!(std::fs::read_to_string(&config.schema_path).unwrap(), before);
    }

    #[test]
    fn show_and_trace_fall_back_to_default_schema() {
        let (_dir, config) = project();
        execute(&SchemaCommands::Show { json: true }, &config).unwrap();

        std::fs::create_dir_all(config.inventory.snapshot_path.parent().unwrap()).unwrap();
        std::fs::write(
            &config.inventory.snapshot_path,
            r#"{"resources":[{"id":"vm-1","type":"VM"}]}"#,
        )
        .unwrap();
        execute(
            &SchemaCommands::Trace {
                resource_id: "vm-1".to_string(),
                snapshot: None,
            },
            &config,
        )
        .unwrap();

        let err = execute(
            &SchemaCommands::Trace {
                resource_id: "ghost".to_string(),
                snapshot: None,
            },
            &config,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
