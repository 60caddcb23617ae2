//! Declarative contract manifests and the catalog that turns them into a [`MethodRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use cdd_contracts::{
    AuthorizationRule, Contract, ContractsError, HttpMethod, SchemaOptions, SharedHandler,
    DEFAULT_ID_FIELD,
};
use cdd_driver::{resolve_binding, BindingError, DriverBinding, DriverRegistry};
use cdd_policy::PolicyEngine;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::processor::{wrap, WrapOptions};
use crate::registry::{MethodRegistry, RegistryError};

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

/// Registration form of a contract.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ContractManifest {
    pub name: String,
    #[serde(alias = "type")]
    pub method: HttpMethod,
    /// `false`, or a list of role names and `{ userId = "<field>" }` ownership rules.
    #[serde(default)]
    #[schemars(with = "serde_json::Value")]
    pub authentication: AuthorizationRule,
    #[serde(default = "default_id_field", alias = "idField")]
    pub id_field: String,
    #[serde(alias = "inputSchema", alias = "arguments")]
    pub input_schema: Value,
    #[serde(alias = "outputSchema", alias = "returns")]
    pub output_schema: Value,
    /// Generates a storage handler when no code handler is registered for the contract.
    #[serde(default, alias = "preferredImplementation")]
    pub binding: Option<DriverBinding>,
    /// Per-contract override of `pipeline.validate_output`.
    #[serde(default, alias = "validateOutput")]
    pub validate_output: Option<bool>,
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Contract(#[from] ContractsError),
    #[error("contract {name}: {source}")]
    Binding {
        name: String,
        #[source]
        source: BindingError,
    },
    #[error("{method} contract {name} has both a code handler and a driver binding")]
    AmbiguousHandler { method: HttpMethod, name: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Builds operations from manifests, wiring handlers from code or driver bindings.
pub struct Catalog {
    drivers: DriverRegistry,
    handlers: HashMap<(HttpMethod, String), SharedHandler>,
    policy: Arc<PolicyEngine>,
    pipeline: PipelineConfig,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("drivers", &self.drivers.kinds().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl Catalog {
    pub fn new(drivers: DriverRegistry) -> Self {
        Self {
            drivers,
            handlers: HashMap::new(),
            policy: Arc::new(PolicyEngine::default()),
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyEngine) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Attach business logic to the contract registered under `method` and `name`.
    pub fn with_handler(
        mut self,
        method: HttpMethod,
        name: impl Into<String>,
        handler: SharedHandler,
    ) -> Self {
        self.handlers.insert((method, name.into()), handler);
        self
    }

    pub fn contract(&self, manifest: &ContractManifest) -> Result<Contract, CatalogError> {
        let options = SchemaOptions {
            strict: self.pipeline.strict_schemas,
        };
        let mut contract = Contract::new(
            manifest.name.clone(),
            manifest.method,
            manifest.input_schema.clone(),
            manifest.output_schema.clone(),
            options,
        )?
        .with_authentication(manifest.authentication.clone())
        .with_id_field(manifest.id_field.clone());

        let code = self
            .handlers
            .get(&(manifest.method, manifest.name.clone()))
            .cloned();
        match (code, &manifest.binding) {
            (Some(_), Some(_)) => {
                return Err(CatalogError::AmbiguousHandler {
                    method: manifest.method,
                    name: manifest.name.clone(),
                })
            }
            (Some(handler), None) => contract = contract.with_handler(handler),
            (None, Some(binding)) => {
                let handler =
                    resolve_binding(binding, manifest.method, &manifest.id_field, &self.drivers)
                        .map_err(|source| CatalogError::Binding {
                            name: manifest.name.clone(),
                            source,
                        })?;
                contract = contract.with_handler(Arc::new(handler));
            }
            (None, None) => {
                tracing::warn!(
                    name = %manifest.name,
                    method = %manifest.method,
                    "contract has no handler; calls will report not implemented"
                );
            }
        }
        Ok(contract)
    }

    pub fn build(&self, manifests: &[ContractManifest]) -> Result<MethodRegistry, CatalogError> {
        let mut builder = MethodRegistry::builder();
        for manifest in manifests {
            let contract = self.contract(manifest)?;
            let options = WrapOptions {
                validate_output: manifest
                    .validate_output
                    .unwrap_or(self.pipeline.validate_output),
            };
            builder.register(wrap(contract, self.policy.clone(), options))?;
        }
        let registry = builder.build();
        tracing::info!(contracts = registry.len(), "contract catalog built");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> ContractManifest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn manifest_accepts_registration_aliases() {
        let m = manifest(json!({
            "name": "items",
            "type": "get",
            "authentication": ["admin", {"userId": "ownerId"}],
            "idField": "key",
            "arguments": {"type": "object"},
            "returns": {},
            "preferredImplementation": {"type": "memory", "index": "items"},
        }));
        assert_eq!(m.method, HttpMethod::Get);
        assert_eq!(m.id_field, "key");
        assert!(m.authentication.needs_target());
        assert_eq!(m.binding.unwrap().collection, "items");
        assert_eq!(m.validate_output, None);
    }

    #[test]
    fn manifest_defaults() {
        let m = manifest(json!({
            "name": "ping",
            "method": "post",
            "input_schema": {},
            "output_schema": {},
        }));
        assert_eq!(m.id_field, "id");
        assert_eq!(m.authentication, AuthorizationRule::Disabled);
        assert!(m.binding.is_none());
    }

    #[test]
    fn manifest_rejects_authentication_true() {
        let err = serde_json::from_value::<ContractManifest>(json!({
            "name": "ping",
            "method": "post",
            "authentication": true,
            "input_schema": {},
            "output_schema": {},
        }))
        .unwrap_err();
        assert!(err.to_string().contains("authentication must be false"));
    }

    #[test]
    fn unknown_store_fails_the_build() {
        let catalog = Catalog::new(DriverRegistry::new());
        let m = manifest(json!({
            "name": "items",
            "method": "get",
            "input_schema": {},
            "output_schema": {},
            "binding": {"type": "nowhere", "collection": "items"},
        }));
        let err = catalog.build(&[m]).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Binding {
                source: BindingError::UnknownStore(_),
                ..
            }
        ));
    }

    #[test]
    fn invalid_schema_fails_the_build() {
        let catalog = Catalog::new(DriverRegistry::new());
        let m = manifest(json!({
            "name": "broken",
            "method": "get",
            "input_schema": {"type": 12},
            "output_schema": {},
        }));
        assert!(matches!(
            catalog.build(&[m]).unwrap_err(),
            CatalogError::Contract(ContractsError::InvalidSchema { .. })
        ));
    }
}
