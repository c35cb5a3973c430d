// config.rs — Engine configuration loaded from .tagguard/config.toml.
//
// Every section is optional. A project with no config file runs against the
// built-in default schema, an inventory snapshot at .tagguard/inventory.json,
// and writes external policies under .tagguard/policies/.
//
// Relative paths in the file are resolved against the project root.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tg_inventory::{ScanOptions, DEFAULT_PAGE_SIZE};
use tg_remediation::{ConflictPolicy, PLACEHOLDER_VALUE};

/// Directory under the project root holding all engine state.
pub const STATE_DIR: &str = ".tagguard";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active schema file (YAML, or JSON by extension). Absent file means the
    /// built-in default schema.
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub remediation: RemediationConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Exported inventory snapshot (JSON, or YAML by extension).
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Evaluation threads; unset means one per available core.
    #[serde(default)]
    pub parallelism: Option<usize>,

    /// Glob patterns on resource ids to leave out of scans.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// "wait" or "reject" when a resource is already being remediated.
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Overrides the schema's name in published documents.
    #[serde(default)]
    pub policy_name: Option<String>,
}

fn default_schema_path() -> PathBuf {
    PathBuf::from(STATE_DIR).join("schema.yaml")
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(STATE_DIR).join("inventory.json")
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_placeholder() -> String {
    PLACEHOLDER_VALUE.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(STATE_DIR).join("policies")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            inventory: InventoryConfig::default(),
            scan: ScanConfig::default(),
            remediation: RemediationConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            page_size: default_page_size(),
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
            on_conflict: ConflictPolicy::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            policy_name: None,
        }
    }
}

impl EngineConfig {
    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join("config.toml")
    }

    /// Parse a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.remediation.placeholder.trim().is_empty() {
            anyhow::bail!("remediation.placeholder must not be blank");
        }
        Ok(())
    }

    /// Load the config if the file exists, defaults otherwise. A file that
    /// exists but does not parse is an error, not a silent fallback.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Config for a project, with every path made absolute under `project_root`.
    pub fn for_project(project_root: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load_or_default(&Self::config_path(project_root))?;
        config.schema_path = project_root.join(&config.schema_path);
        config.inventory.snapshot_path = project_root.join(&config.inventory.snapshot_path);
        config.sync.output_dir = project_root.join(&config.sync.output_dir);
        Ok(config)
    }

    pub fn scan_options(&self) -> ScanOptions {
        let mut options = ScanOptions {
            exclude_patterns: self.scan.exclude_patterns.clone(),
            ..ScanOptions::default()
        };
        if let Some(n) = self.scan.parallelism {
            options.parallelism = n.max(1);
        }
        options
    }
}
