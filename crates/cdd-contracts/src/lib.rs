//! Shared data contracts for the contract pipeline: operation descriptions, authorization
//! rules, caller identities, schema validation outcomes and the result envelope.
//! Higher layers (policy, drivers, processor) build on these types without depending on each
//! other.

mod auth;
mod contract;
mod error;
mod method;
mod result;
pub mod schema;

pub use auth::*;
pub use contract::*;
pub use error::*;
pub use method::*;
pub use result::*;
pub use schema::{FieldError, Schema, SchemaOptions, ValidationOutcome, ValidationStatus};

/// Shared error type for malformed contract definitions.
#[derive(thiserror::Error, Debug)]
pub enum ContractsError {
    #[error("invalid schema for {contract}: {reason}")]
    InvalidSchema { contract: String, reason: String },
    #[error("invalid authorization rule: {0}")]
    InvalidRule(String),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
