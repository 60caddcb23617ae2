use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::{
    AuthorizationRule, CallerIdentity, ContractsError, HandlerError, HttpMethod, Schema,
    SchemaOptions,
};

pub const DEFAULT_ID_FIELD: &str = "id";

/// Record an ownership rule is checked against.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetLookup {
    Found(Value),
    /// The call addresses a single record that does not exist.
    Missing,
    /// The call cannot be attributed to a single record (bulk reads, bulk deletes).
    Unsupported,
}

/// Business logic behind a contract.
#[async_trait::async_trait]
pub trait ContractHandler: Send + Sync {
    async fn handle(
        &self,
        input: Value,
        identity: Option<&CallerIdentity>,
    ) -> Result<Value, HandlerError>;

    /// Resolve the record addressed by `input` for ownership checks.
    async fn resolve_target(
        &self,
        _input: &Value,
        _identity: Option<&CallerIdentity>,
    ) -> Result<TargetLookup, HandlerError> {
        Ok(TargetLookup::Unsupported)
    }
}

pub type SharedHandler = Arc<dyn ContractHandler>;

/// Immutable description of one operation.
#[derive(Clone)]
pub struct Contract {
    pub name: String,
    pub method: HttpMethod,
    pub input: Schema,
    pub output: Schema,
    pub authentication: AuthorizationRule,
    pub id_field: String,
    pub handler: Option<SharedHandler>,
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("authentication", &self.authentication)
            .field("id_field", &self.id_field)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl Contract {
    /// Compile both schemas and build a contract with no authentication and no handler.
    pub fn new(
        name: impl Into<String>,
        method: HttpMethod,
        input_schema: Value,
        output_schema: Value,
        options: SchemaOptions,
    ) -> Result<Self, ContractsError> {
        let name = name.into();
        let compile = |raw: Value| {
            Schema::compile(raw, options).map_err(|err| ContractsError::InvalidSchema {
                contract: name.clone(),
                reason: err.to_string(),
            })
        };
        let input = compile(input_schema)?;
        let output = compile(output_schema)?;
        Ok(Self {
            name,
            method,
            input,
            output,
            authentication: AuthorizationRule::Disabled,
            id_field: DEFAULT_ID_FIELD.to_string(),
            handler: None,
        })
    }

    pub fn with_authentication(mut self, rule: AuthorizationRule) -> Self {
        self.authentication = rule;
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_handler(mut self, handler: SharedHandler) -> Self {
        self.handler = Some(handler);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait::async_trait]
    impl ContractHandler for Echo {
        async fn handle(
            &self,
            input: Value,
            _identity: Option<&CallerIdentity>,
        ) -> Result<Value, HandlerError> {
            Ok(input)
        }
    }

    #[test]
    fn builds_with_defaults() {
        let contract = Contract::new(
            "test",
            HttpMethod::Get,
            json!({"type": "object"}),
            json!({"type": "object"}),
            SchemaOptions::default(),
        )
        .unwrap();
        assert_eq!(contract.id_field, DEFAULT_ID_FIELD);
        assert_eq!(contract.authentication, AuthorizationRule::Disabled);
        assert!(contract.handler.is_none());
    }

    #[test]
    fn schema_errors_name_the_contract() {
        let err = Contract::new(
            "broken",
            HttpMethod::Post,
            json!({"type": "object"}),
            json!({"type": 7}),
            SchemaOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ContractsError::InvalidSchema { ref contract, .. } if contract == "broken"));
    }

    #[tokio::test]
    async fn default_target_resolution_is_unsupported() {
        let lookup = Echo.resolve_target(&json!({"id": "a"}), None).await.unwrap();
        assert_eq!(lookup, TargetLookup::Unsupported);
        assert_eq!(Echo.handle(json!(1), None).await.unwrap(), json!(1));
    }
}
