use std::collections::BTreeMap;
use std::sync::Arc;

use cdd_contracts::HttpMethod;
use serde_json::{json, Value};

use crate::processor::Operation;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{method} contract {name} is already registered")]
    Duplicate { method: HttpMethod, name: String },
}

/// Collects operations before the registry is frozen.
#[derive(Debug, Default)]
pub struct MethodRegistryBuilder {
    by_method: BTreeMap<HttpMethod, BTreeMap<String, Arc<Operation>>>,
}

impl MethodRegistryBuilder {
    pub fn register(&mut self, operation: Operation) -> Result<&mut Self, RegistryError> {
        let method = operation.method();
        let slot = self.by_method.entry(method).or_default();
        if slot.contains_key(operation.name()) {
            return Err(RegistryError::Duplicate {
                method,
                name: operation.name().to_string(),
            });
        }
        tracing::debug!(%method, name = operation.name(), "registered contract");
        slot.insert(operation.name().to_string(), Arc::new(operation));
        Ok(self)
    }

    pub fn build(self) -> MethodRegistry {
        MethodRegistry {
            by_method: self.by_method,
        }
    }
}

/// Processed operations grouped by method, then by name. Read-only once built.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    by_method: BTreeMap<HttpMethod, BTreeMap<String, Arc<Operation>>>,
}

impl MethodRegistry {
    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::default()
    }

    pub fn get(&self, method: HttpMethod, name: &str) -> Option<&Arc<Operation>> {
        self.by_method.get(&method)?.get(name)
    }

    /// Operations for one method, sorted by name.
    pub fn by_method(&self, method: HttpMethod) -> impl Iterator<Item = &Arc<Operation>> {
        self.by_method
            .get(&method)
            .into_iter()
            .flat_map(|ops| ops.values())
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.by_method.values().flat_map(|ops| ops.values())
    }

    /// Distinct contract names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations().map(|op| op.name()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.by_method.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered contracts as JSON, for discovery endpoints.
    pub fn describe(&self) -> Value {
        let items: Vec<Value> = self
            .operations()
            .map(|op| {
                let contract = op.contract();
                json!({
                    "name": contract.name,
                    "method": contract.method,
                    "authentication": contract.authentication,
                    "idField": contract.id_field,
                    "implemented": contract.handler.is_some(),
                    "validateOutput": op.validates_output(),
                    "inputSchema": contract.input.raw(),
                    "outputSchema": contract.output.raw(),
                })
            })
            .collect();
        json!({ "count": items.len(), "items": items })
    }
}
