use std::path::Path;

use anyhow::Result;
use cdd_driver::ContentPolicy;
use cdd_policy::PolicyConfig;
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::ContractManifest;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8091;

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct RuntimeConfig {
    /// Listen address for the reference server
    #[serde(default)]
    pub bind: Option<String>,
    /// HTTP port for the reference server
    #[serde(default)]
    pub port: Option<u16>,
}

impl RuntimeConfig {
    pub fn bind_addr(&self) -> String {
        format!(
            "{}:{}",
            self.bind.as_deref().unwrap_or(DEFAULT_BIND),
            self.port.unwrap_or(DEFAULT_PORT)
        )
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Check handler results against output schemas unless a contract overrides it.
    #[serde(default = "default_true")]
    pub validate_output: bool,
    /// Report keys not declared by an object schema.
    #[serde(default = "default_true")]
    pub strict_schemas: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validate_output: true,
            strict_schemas: true,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct StorageConfig {
    /// Duplicate-content detection for creates.
    #[serde(default)]
    pub content_duplicates: ContentPolicy,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub authorization: PolicyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Manifests are checked when deserialized; the schema only requires a list of tables.
    #[serde(default)]
    #[schemars(with = "Vec<serde_json::Map<String, serde_json::Value>>")]
    pub contracts: Vec<ContractManifest>,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("reading {}: {err}", path.display()))?;
    parse_config(&content)
}
