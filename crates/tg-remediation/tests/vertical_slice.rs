// vertical_slice.rs — End-to-end: scan, remediate, re-scan, publish.
//
// Exercises the whole governance flow against a snapshot file on disk:
//
//   1. Load a custom schema (mandatory, conditional, recommended rules)
//   2. Open an inventory snapshot with a resource group and standalone resources
//   3. Scan: verdicts, PHI floor, fleet metrics
//   4. Remediate every non-compliant resource through the coordinator
//   5. Re-scan: score moves only where the re-evaluation says so
//   6. Remediate again: no writes (idempotent)
//   7. Compile and publish the external policy; re-publish is a no-op
//
// VERIFY:
//   - Unrelated tags survive remediation
//   - Placeholder values never satisfy a value-set rule
//   - The snapshot on disk carries the remediated tags

use std::fs;

use tempfile::tempdir;

use tg_inventory::{CancellationToken, InventorySource, ScanOptions, Scanner, SnapshotInventory};
use tg_policy::{
    to_external_policy, FilePolicyPublisher, PolicyPublisher, Requirement, Schema, SchemaStore,
};
use tg_remediation::{RemediationCoordinator, TagWriter, PLACEHOLDER_VALUE};

const SCHEMA_YAML: &str = r#"
name: clinical-tags
rules:
  - key: Owner
    requirement: mandatory
  - key: Environment
    requirement: mandatory
    allowed_values: [Prod, Dev]
  - key: DataRetention
    requirement: conditional
    dependency:
      key: Environment
      equals: Prod
  - key: Team
    requirement: recommended
"#;

const SNAPSHOT_JSON: &str = r#"{
  "resource_groups": [
    {
      "id": "rg-clinical",
      "tags": { "Owner": "dana", "Environment": "Prod", "DataRetention": "7y", "ContainsPHI": "Yes" },
      "resources": [
        { "id": "vm-ehr", "type": "Virtual Machine",
          "tags": { "Owner": "dana", "Environment": "Prod", "DataRetention": "7y" } },
        { "id": "db-ehr", "type": "SQL Database",
          "tags": { "Environment": "Staging", "ContainsPHI": "yes" } }
      ]
    }
  ],
  "resources": [
    { "id": "st-logs", "type": "Storage Account", "monthly_cost_cents": 1200,
      "tags": { "Owner": "kim", "Environment": "Dev", "CostCenter": "CC-7" } },
    { "id": "vm-scratch", "type": "Virtual Machine", "monthly_cost_cents": 500 }
  ]
}"#;

fn scanner() -> Scanner {
    Scanner::new(ScanOptions {
        parallelism: 2,
        exclude_patterns: Vec::new(),
    })
}

#[test]
fn scan_remediate_rescan_publish() {
    let project = tempdir().unwrap();

    // =========================================================
    // SETUP: schema store and snapshot on disk
    // =========================================================
    let store = SchemaStore::for_project(project.path());
    store.save(&Schema::from_yaml_str(SCHEMA_YAML).unwrap()).unwrap();
    let schema = store.load().unwrap().expect("schema was just saved");
    assert_eq!(schema.name(), "clinical-tags");

    let snapshot_path = project.path().join("inventory.json");
    fs::write(&snapshot_path, SNAPSHOT_JSON).unwrap();
    let inventory = SnapshotInventory::open(&snapshot_path)
        .unwrap()
        .with_page_size(2);

    // =========================================================
    // STEP 1: initial scan
    // =========================================================
    let report = scanner().scan(&inventory, Some(&schema), &CancellationToken::new());
    assert!(report.is_complete());
    let metrics = report.authoritative_metrics().unwrap();
    assert_eq!(metrics.total_resources, 5);
    assert_eq!(metrics.compliant_resources, 2);
    assert_eq!(metrics.compliance_score_percent, 40);
    assert_eq!(metrics.phi_resource_count, 2);
    assert_eq!(metrics.attributed_resources, 1);
    assert_eq!(metrics.attribution_rate_percent, 20);
    assert_eq!(metrics.unallocated_spend_cents, 500);
    assert_eq!(metrics.resources_without_cost_data, 3);

    let group = &report.results[0];
    assert_eq!(group.resource_id, "rg-clinical");
    assert_eq!(group.resource_type, "Resource Group");
    assert_eq!(group.missing_tags, vec!["HIPAAZone", "EncryptionRequired"]);

    let db = report
        .results
        .iter()
        .find(|r| r.resource_id == "db-ehr")
        .unwrap();
    assert_eq!(
        db.missing_tags,
        vec!["Owner", "Environment", "HIPAAZone", "EncryptionRequired"]
    );
    assert_eq!(db.advisory_tags, vec!["Team"]);

    let targets: Vec<String> = report
        .non_compliant()
        .map(|r| r.resource_id.clone())
        .collect();
    assert_eq!(targets, vec!["rg-clinical", "db-ehr", "vm-scratch"]);

    // =========================================================
    // STEP 2: remediate
    // =========================================================
    let coordinator = RemediationCoordinator::new(inventory);
    let batch = coordinator.remediate_batch(Some(&schema), &targets);
    assert!(batch.failed.is_empty());
    assert_eq!(batch.written_count(), 3);
    // Only the group becomes compliant: placeholders cannot satisfy the
    // Environment value set.
    assert_eq!(batch.now_compliant_count(), 1);

    let db_after = batch
        .remediated
        .iter()
        .find(|r| r.outcome.resource_id == "db-ehr")
        .unwrap();
    assert_eq!(db_after.after.missing_tags, vec!["Environment"]);

    let db_tags = TagWriter::read_tags(coordinator.writer(), "db-ehr").unwrap();
    assert_eq!(db_tags["ContainsPHI"], "yes");
    assert_eq!(db_tags["HIPAAZone"], PLACEHOLDER_VALUE);
    assert_eq!(db_tags["Owner"], PLACEHOLDER_VALUE);

    // =========================================================
    // STEP 3: re-scan from the same source
    // =========================================================
    let rescan = scanner().scan(coordinator.writer(), Some(&schema), &CancellationToken::new());
    let after = rescan.authoritative_metrics().unwrap();
    assert_eq!(after.compliant_resources, 3);
    assert_eq!(after.compliance_score_percent, 60);
    assert_ne!(report.scan_id, rescan.scan_id);

    // =========================================================
    // STEP 4: remediation is idempotent
    // =========================================================
    let again = coordinator.remediate_batch(Some(&schema), &targets);
    assert_eq!(again.written_count(), 0);
    for (first, second) in batch.remediated.iter().zip(again.remediated.iter()) {
        assert_eq!(first.outcome.fingerprint, second.outcome.fingerprint);
    }

    // The snapshot on disk carries the fix.
    let reopened = SnapshotInventory::open(&snapshot_path).unwrap();
    let all = reopened.list_all().unwrap();
    let group = all.iter().find(|r| r.id == "rg-clinical").unwrap();
    assert_eq!(group.tag_value("EncryptionRequired"), Some(PLACEHOLDER_VALUE));
    assert_eq!(group.tag_value("DataRetention"), Some("7y"));

    // =========================================================
    // STEP 5: publish the external policy
    // =========================================================
    let doc = to_external_policy(&schema);
    assert_eq!(doc.clauses.len(), 2);
    let dropped: Vec<Requirement> = doc.dropped_rules.iter().map(|d| d.requirement).collect();
    assert_eq!(dropped, vec![Requirement::Conditional, Requirement::Recommended]);

    let publisher = FilePolicyPublisher::new(project.path().join("policies"));
    assert!(publisher.publish(&doc).unwrap().changed);
    assert!(!publisher.publish(&doc).unwrap().changed);
}

#[test]
fn concurrent_remediation_of_one_resource_keeps_every_fix() {
    use tg_inventory::InMemoryInventory;
    use tg_policy::Resource;

    let inventory = InMemoryInventory::new(vec![Resource::new("vm-1", "VM").with_tag("Team", "core")]);
    let coordinator = RemediationCoordinator::new(inventory);
    let keys = ["Owner", "CostCenter", "Environment", "Project", "Department", "Criticality"];

    std::thread::scope(|s| {
        for key in keys {
            let coordinator = &coordinator;
            s.spawn(move || {
                coordinator
                    .remediate_missing(None, "vm-1", &[key.to_string()])
                    .unwrap();
            });
        }
    });

    let tags = TagWriter::read_tags(coordinator.writer(), "vm-1").unwrap();
    assert_eq!(tags["Team"], "core");
    for key in keys {
        assert_eq!(tags[key], PLACEHOLDER_VALUE, "lost fix for {key}");
    }
}
