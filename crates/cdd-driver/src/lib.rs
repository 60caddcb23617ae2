//! Storage driver contract for CDD contracts.
//!
//! A [`DataDriver`] exposes the fixed verb set every generated handler is built on. Contracts
//! refer to a driver through a declarative [`DriverBinding`]; [`resolve_binding`] turns that
//! binding into a [`DriverHandler`] once, at registration time, so calls never interpret the
//! binding again.

use std::collections::BTreeMap;
use std::sync::Arc;

use cdd_contracts::{CallerIdentity, Conflict, HandlerError};
use serde_json::Value;

mod binding;
mod content;
mod handler;

pub use binding::{resolve_binding, BindingError, DriverBinding, SearchMode};
pub use content::ContentPolicy;
pub use handler::{DriverHandler, Strategy};

#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("record {id} not found in {collection}")]
    NotFound { collection: String, id: String },
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error("id {found} in payload does not match {expected}")]
    IdMismatch { expected: String, found: String },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl DriverError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        DriverError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<DriverError> for HandlerError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound { collection, id } => HandlerError::NotFound { collection, id },
            DriverError::Conflict(conflict) => HandlerError::Conflict(conflict),
            DriverError::IdMismatch { .. } | DriverError::InvalidRecord(_) => {
                HandlerError::Rejected(err.to_string())
            }
            DriverError::Unavailable(_) => HandlerError::Backend(anyhow::Error::new(err)),
        }
    }
}

/// Which records a delete removes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteSelector {
    /// Exactly one record; a missing id is reported as not found.
    One(String),
    /// A subset; ids that are not present are skipped.
    Many(Vec<String>),
    All,
}

/// Storage verbs a backend adapter implements.
///
/// `identity` is passed through for backends that apply their own row-level rules; the
/// pipeline has already authorized the call.
#[async_trait::async_trait]
pub trait DataDriver: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn get_by_id(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
        id: &str,
    ) -> Result<Option<Value>, DriverError>;

    /// Records present among `ids`, in request order. Unknown ids are omitted.
    async fn get_by_ids(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
        ids: &[String],
    ) -> Result<Vec<Value>, DriverError>;

    /// Matching records, most relevant first, ties in insertion order.
    async fn get_by_text(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
        query: &str,
    ) -> Result<Vec<Value>, DriverError>;

    async fn get_all(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
    ) -> Result<Vec<Value>, DriverError>;

    async fn create(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
        record: Value,
        id_field: &str,
    ) -> Result<Value, DriverError>;

    async fn replace(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
        id: &str,
        record: Value,
        id_field: &str,
    ) -> Result<Value, DriverError>;

    async fn merge(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
        id: &str,
        partial: Value,
        id_field: &str,
    ) -> Result<Value, DriverError>;

    /// Removed records.
    async fn delete(
        &self,
        collection: &str,
        identity: Option<&CallerIdentity>,
        selector: DeleteSelector,
    ) -> Result<Vec<Value>, DriverError>;
}

pub type SharedDriver = Arc<dyn DataDriver>;

/// Drivers available to bindings, keyed by store kind.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, SharedDriver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `driver` under its own [`DataDriver::kind`].
    pub fn with_driver(mut self, driver: SharedDriver) -> Self {
        self.insert(driver.kind(), driver);
        self
    }

    pub fn insert(&mut self, kind: impl Into<String>, driver: SharedDriver) {
        self.drivers.insert(kind.into(), driver);
    }

    pub fn get(&self, kind: &str) -> Option<&SharedDriver> {
        self.drivers.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}
