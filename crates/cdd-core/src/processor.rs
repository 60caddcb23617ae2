//! Wraps a [`Contract`] into an invocable [`Operation`].
//!
//! Every call runs the same fixed sequence: input validation, authorization, handler
//! presence, the handler itself, then output validation. Pipeline failures come back as
//! [`ContractResult`] values; handler failures propagate as `Err`.

use std::sync::Arc;

use cdd_contracts::{
    AuthorizationRule, CallerIdentity, Contract, ContractHandler, ContractResult, HandlerError,
    HttpMethod, TargetLookup,
};
use cdd_policy::{Decision, PolicyEngine, TargetSource};
use serde_json::Value;
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapOptions {
    /// Check handler results against the output schema. Off only for trusted handlers.
    pub validate_output: bool,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            validate_output: true,
        }
    }
}

/// A processed contract, ready to be called by a transport.
pub struct Operation {
    contract: Arc<Contract>,
    policy: Arc<PolicyEngine>,
    validate_output: bool,
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("contract", &self.contract)
            .field("validate_output", &self.validate_output)
            .finish()
    }
}

pub fn wrap(contract: Contract, policy: Arc<PolicyEngine>, options: WrapOptions) -> Operation {
    Operation {
        contract: Arc::new(contract),
        policy,
        validate_output: options.validate_output,
    }
}

/// Resolves the ownership target through the contract handler, only when asked.
struct HandlerTarget<'a> {
    handler: Option<&'a dyn ContractHandler>,
    input: &'a Value,
    identity: Option<&'a CallerIdentity>,
}

#[async_trait::async_trait]
impl<'a> TargetSource for HandlerTarget<'a> {
    async fn lookup(&self) -> Result<TargetLookup, HandlerError> {
        match self.handler {
            Some(handler) => handler.resolve_target(self.input, self.identity).await,
            None => Ok(TargetLookup::Unsupported),
        }
    }
}

impl Operation {
    pub fn name(&self) -> &str {
        &self.contract.name
    }

    pub fn method(&self) -> HttpMethod {
        self.contract.method
    }

    pub fn authentication(&self) -> &AuthorizationRule {
        &self.contract.authentication
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn validates_output(&self) -> bool {
        self.validate_output
    }

    pub async fn call(
        &self,
        input: Value,
        identity: Option<&CallerIdentity>,
    ) -> Result<ContractResult, HandlerError> {
        let span = tracing::debug_span!(
            "contract",
            name = %self.contract.name,
            method = %self.contract.method,
        );
        self.run(input, identity).instrument(span).await
    }

    async fn run(
        &self,
        input: Value,
        identity: Option<&CallerIdentity>,
    ) -> Result<ContractResult, HandlerError> {
        let contract = self.contract.as_ref();

        let outcome = contract.input.validate(&input);
        if !outcome.is_pass() {
            tracing::debug!(fields = outcome.errors.len(), "input validation failed");
            return Ok(ContractResult::input_invalid(input, outcome));
        }

        if contract.authentication.is_enabled() {
            let target = HandlerTarget {
                handler: contract.handler.as_deref(),
                input: &input,
                identity,
            };
            let decision = self
                .policy
                .evaluate(&contract.authentication, identity, &target)
                .await?;
            tracing::debug!(explain = %decision.explain(), "authorization evaluated");
            match decision {
                Decision::Unauthenticated => return Ok(ContractResult::unauthenticated(input)),
                Decision::Unauthorized => return Ok(ContractResult::unauthorized(input)),
                Decision::Allow(_) | Decision::TargetMissing => {}
            }
        }

        let Some(handler) = contract.handler.as_deref() else {
            tracing::debug!("no handler defined");
            return Ok(ContractResult::not_implemented(&contract.name));
        };

        let result = handler.handle(input, identity).await?;

        if self.validate_output {
            let outcome = contract.output.validate(&result);
            if !outcome.is_pass() {
                tracing::warn!(
                    contract = %contract.name,
                    fields = outcome.errors.len(),
                    "handler returned a result that does not match its output schema"
                );
                return Ok(ContractResult::output_invalid(result, outcome));
            }
        }
        Ok(ContractResult::success(result))
    }
}
