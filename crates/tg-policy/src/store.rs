// store.rs — Persistence for the active tag schema.
//
// The active schema is the only state the engine keeps across calls. It is
// stored as a single YAML or JSON file; the format follows the extension.
// Loading always goes through validation, so a broken file is rejected whole.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SchemaError;
use crate::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaFormat {
    Yaml,
    Json,
}

impl SchemaFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SchemaFormat::Json,
            _ => SchemaFormat::Yaml,
        }
    }
}

/// Reads and writes the active schema file.
pub struct SchemaStore {
    path: PathBuf,
}

impl SchemaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under a project root: `.tagguard/schema.yaml`.
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".tagguard").join("schema.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the active schema. Returns `None` if no schema has been saved,
    /// which callers treat as "use the built-in default".
    pub fn load(&self) -> Result<Option<Schema>, SchemaError> {
        if !self.path.exists() {
            return Ok(None);
        }
        load_schema_file(&self.path).map(Some)
    }

    /// Save a schema, replacing any existing one.
    pub fn save(&self, schema: &Schema) -> Result<(), SchemaError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SchemaError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let data = match SchemaFormat::for_path(&self.path) {
            SchemaFormat::Json => serde_json::to_string_pretty(schema)
                .map_err(|e| SchemaError::Serialize(e.to_string()))?,
            SchemaFormat::Yaml => {
                serde_yaml::to_string(schema).map_err(|e| SchemaError::Serialize(e.to_string()))?
            }
        };
        fs::write(&self.path, data).map_err(|source| SchemaError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), rules = schema.len(), "saved schema");
        Ok(())
    }
}

/// Load and validate a schema file (YAML, or JSON for `.json`).
pub fn load_schema_file(path: &Path) -> Result<Schema, SchemaError> {
    let data = fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let schema = match SchemaFormat::for_path(path) {
        SchemaFormat::Json => Schema::from_json_str(&data)?,
        SchemaFormat::Yaml => Schema::from_yaml_str(&data)?,
    };
    tracing::debug!(path = %path.display(), rules = schema.len(), "loaded schema");
    Ok(schema)
}
