use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ContractsError;

/// One way of satisfying an [`AuthorizationRule`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AuthAlternative {
    /// Caller must hold the named role.
    Role(String),
    /// Caller subject must equal the value stored under `owner_field` on the target record.
    Owner {
        #[serde(rename = "userId")]
        owner_field: String,
    },
}

impl AuthAlternative {
    pub fn role(name: impl Into<String>) -> Self {
        AuthAlternative::Role(name.into())
    }

    pub fn owner(field: impl Into<String>) -> Self {
        AuthAlternative::Owner {
            owner_field: field.into(),
        }
    }
}

/// Registration form: `false` or an ordered list of alternatives.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRule {
    Flag(bool),
    Alternatives(Vec<AuthAlternative>),
}

/// Authorization requirement attached to a contract.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub enum AuthorizationRule {
    /// No authentication required.
    #[default]
    Disabled,
    /// Satisfied when any alternative matches, evaluated in order.
    AnyOf(Vec<AuthAlternative>),
}

impl AuthorizationRule {
    pub fn any_of(alternatives: impl IntoIterator<Item = AuthAlternative>) -> Self {
        AuthorizationRule::AnyOf(alternatives.into_iter().collect())
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::any_of(roles.into_iter().map(AuthAlternative::role))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, AuthorizationRule::AnyOf(_))
    }

    pub fn alternatives(&self) -> &[AuthAlternative] {
        match self {
            AuthorizationRule::Disabled => &[],
            AuthorizationRule::AnyOf(alternatives) => alternatives,
        }
    }

    /// Whether any alternative needs the target record to be resolved.
    pub fn needs_target(&self) -> bool {
        self.alternatives()
            .iter()
            .any(|alt| matches!(alt, AuthAlternative::Owner { .. }))
    }
}

impl TryFrom<RawRule> for AuthorizationRule {
    type Error = ContractsError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        match raw {
            RawRule::Flag(false) => Ok(AuthorizationRule::Disabled),
            RawRule::Flag(true) => Err(ContractsError::InvalidRule(
                "authentication must be false or a list of roles / {userId} rules".into(),
            )),
            RawRule::Alternatives(list) => Ok(AuthorizationRule::AnyOf(list)),
        }
    }
}

impl From<AuthorizationRule> for RawRule {
    fn from(rule: AuthorizationRule) -> Self {
        match rule {
            AuthorizationRule::Disabled => RawRule::Flag(false),
            AuthorizationRule::AnyOf(list) => RawRule::Alternatives(list),
        }
    }
}

/// Authenticated caller as established by the transport layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    #[serde(alias = "sub")]
    pub subject: String,
    #[serde(default, alias = "permissions")]
    pub roles: BTreeSet<String>,
}

impl CallerIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
