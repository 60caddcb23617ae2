//! Authorization evaluator for contract rules.
//!
//! A rule is either disabled or an ordered list of alternatives. Role alternatives are checked
//! against the caller's role set; ownership alternatives compare a field of the target record
//! with the caller subject. The target record is resolved lazily, at most once per evaluation,
//! and only when an ownership alternative is reached.

use cdd_contracts::{
    AuthAlternative, AuthorizationRule, CallerIdentity, HandlerError, TargetLookup,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What to do when an ownership alternative addresses a record that does not exist.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingTargetPolicy {
    /// Let the call through so the handler reports the missing record (404).
    #[default]
    NotFound,
    /// Deny as unauthorized (403).
    Forbidden,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PolicyConfig {
    #[serde(default)]
    pub missing_target: MissingTargetPolicy,
}

/// Which alternative granted access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grant {
    Open,
    Role(String),
    Owner(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow(Grant),
    Unauthenticated,
    Unauthorized,
    /// Ownership could not be checked because the record is absent; the pipeline proceeds.
    TargetMissing,
}

impl Decision {
    /// Whether the pipeline may go on to the handler.
    pub fn proceeds(&self) -> bool {
        matches!(self, Decision::Allow(_) | Decision::TargetMissing)
    }

    pub fn explain(&self) -> Value {
        match self {
            Decision::Allow(Grant::Open) => json!({"decision": "allow", "reason": "open"}),
            Decision::Allow(Grant::Role(role)) => {
                json!({"decision": "allow", "reason": "role", "role": role})
            }
            Decision::Allow(Grant::Owner(field)) => {
                json!({"decision": "allow", "reason": "owner", "field": field})
            }
            Decision::Unauthenticated => json!({"decision": "deny", "reason": "unauthenticated"}),
            Decision::Unauthorized => json!({"decision": "deny", "reason": "unauthorized"}),
            Decision::TargetMissing => json!({"decision": "defer", "reason": "target_missing"}),
        }
    }
}

/// Lazily resolves the record an ownership alternative is checked against.
#[async_trait::async_trait]
pub trait TargetSource: Send + Sync {
    async fn lookup(&self) -> Result<TargetLookup, HandlerError>;
}

#[async_trait::async_trait]
impl TargetSource for TargetLookup {
    async fn lookup(&self) -> Result<TargetLookup, HandlerError> {
        Ok(self.clone())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PolicyEngine {
    cfg: PolicyConfig,
}

impl PolicyEngine {
    pub fn with_config(cfg: PolicyConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.cfg
    }

    pub async fn evaluate(
        &self,
        rule: &AuthorizationRule,
        identity: Option<&CallerIdentity>,
        target: &dyn TargetSource,
    ) -> Result<Decision, HandlerError> {
        let alternatives = match rule {
            AuthorizationRule::Disabled => return Ok(Decision::Allow(Grant::Open)),
            AuthorizationRule::AnyOf(alternatives) => alternatives,
        };
        let Some(identity) = identity else {
            return Ok(Decision::Unauthenticated);
        };

        let mut resolved: Option<TargetLookup> = None;
        for alternative in alternatives {
            match alternative {
                AuthAlternative::Role(role) => {
                    if identity.has_role(role) {
                        return Ok(Decision::Allow(Grant::Role(role.clone())));
                    }
                }
                AuthAlternative::Owner { owner_field } => {
                    if resolved.is_none() {
                        resolved = Some(target.lookup().await?);
                    }
                    if let Some(TargetLookup::Found(record)) = &resolved {
                        if owned_by(record, owner_field, &identity.subject) {
                            return Ok(Decision::Allow(Grant::Owner(owner_field.clone())));
                        }
                    }
                }
            }
        }

        match (&resolved, self.cfg.missing_target) {
            (Some(TargetLookup::Missing), MissingTargetPolicy::NotFound) => {
                tracing::debug!(subject = %identity.subject, "ownership target missing; deferring to handler");
                Ok(Decision::TargetMissing)
            }
            _ => Ok(Decision::Unauthorized),
        }
    }
}

fn owned_by(record: &Value, owner_field: &str, subject: &str) -> bool {
    record
        .get(owner_field)
        .and_then(Value::as_str)
        .is_some_and(|owner| owner == subject)
}
