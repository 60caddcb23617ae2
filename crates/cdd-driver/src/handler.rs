use std::fmt;

use cdd_contracts::{CallerIdentity, ContractHandler, HandlerError, TargetLookup};
use serde_json::Value;

use crate::{DeleteSelector, SharedDriver};

/// Input field carrying the free-text query for text-search reads.
pub const SEARCH_FIELD: &str = "search";

/// Concrete dispatch chosen for a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    ReadById,
    ReadWithText,
    Create,
    Replace,
    Merge,
    Delete,
}

/// Contract handler generated from a driver binding.
#[derive(Clone)]
pub struct DriverHandler {
    driver: SharedDriver,
    collection: String,
    id_field: String,
    strategy: Strategy,
}

impl fmt::Debug for DriverHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandler")
            .field("driver", &self.driver.kind())
            .field("collection", &self.collection)
            .field("id_field", &self.id_field)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// How the id field of a call's input addresses records.
enum IdSelector {
    One(String),
    Many(Vec<String>),
    Absent,
}

impl DriverHandler {
    pub fn new(
        driver: SharedDriver,
        collection: String,
        id_field: String,
        strategy: Strategy,
    ) -> Self {
        Self {
            driver,
            collection,
            id_field,
            strategy,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn selector(&self, input: &Value) -> Result<IdSelector, HandlerError> {
        match input.get(&self.id_field) {
            None | Some(Value::Null) => Ok(IdSelector::Absent),
            Some(Value::String(id)) => Ok(IdSelector::One(id.clone())),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        HandlerError::Rejected(format!("{} entries must be strings", self.id_field))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(IdSelector::Many),
            Some(_) => Err(HandlerError::Rejected(format!(
                "{} must be a string or a list of strings",
                self.id_field
            ))),
        }
    }

    fn single_id(&self, input: &Value) -> Result<String, HandlerError> {
        match self.selector(input)? {
            IdSelector::One(id) => Ok(id),
            _ => Err(HandlerError::Rejected(format!(
                "{} must address exactly one record",
                self.id_field
            ))),
        }
    }

    async fn read(
        &self,
        input: &Value,
        identity: Option<&CallerIdentity>,
    ) -> Result<Value, HandlerError> {
        let collection = self.collection.as_str();
        match self.selector(input)? {
            IdSelector::One(id) => self
                .driver
                .get_by_id(collection, identity, &id)
                .await?
                .ok_or_else(|| HandlerError::not_found(collection, id)),
            IdSelector::Many(ids) => {
                let records = self.driver.get_by_ids(collection, identity, &ids).await?;
                Ok(Value::Array(records))
            }
            IdSelector::Absent => {
                let query = match self.strategy {
                    Strategy::ReadWithText => input
                        .get(SEARCH_FIELD)
                        .and_then(Value::as_str)
                        .filter(|query| !query.trim().is_empty()),
                    _ => None,
                };
                let records = match query {
                    Some(query) => self.driver.get_by_text(collection, identity, query).await?,
                    None => self.driver.get_all(collection, identity).await?,
                };
                Ok(Value::Array(records))
            }
        }
    }
}

#[async_trait::async_trait]
impl ContractHandler for DriverHandler {
    async fn handle(
        &self,
        input: Value,
        identity: Option<&CallerIdentity>,
    ) -> Result<Value, HandlerError> {
        let collection = self.collection.as_str();
        tracing::debug!(
            driver = self.driver.kind(),
            collection,
            strategy = ?self.strategy,
            "dispatching to driver"
        );
        match self.strategy {
            Strategy::ReadById | Strategy::ReadWithText => self.read(&input, identity).await,
            Strategy::Create => Ok(self
                .driver
                .create(collection, identity, input, &self.id_field)
                .await?),
            Strategy::Replace => {
                let id = self.single_id(&input)?;
                Ok(self
                    .driver
                    .replace(collection, identity, &id, input, &self.id_field)
                    .await?)
            }
            Strategy::Merge => {
                let id = self.single_id(&input)?;
                Ok(self
                    .driver
                    .merge(collection, identity, &id, input, &self.id_field)
                    .await?)
            }
            Strategy::Delete => {
                let selector = match self.selector(&input)? {
                    IdSelector::One(id) => DeleteSelector::One(id),
                    IdSelector::Many(ids) => DeleteSelector::Many(ids),
                    IdSelector::Absent => DeleteSelector::All,
                };
                let removed = self.driver.delete(collection, identity, selector).await?;
                Ok(Value::Array(removed))
            }
        }
    }

    async fn resolve_target(
        &self,
        input: &Value,
        identity: Option<&CallerIdentity>,
    ) -> Result<TargetLookup, HandlerError> {
        if self.strategy == Strategy::Create {
            return Ok(TargetLookup::Found(input.clone()));
        }
        let IdSelector::One(id) = self.selector(input)? else {
            return Ok(TargetLookup::Unsupported);
        };
        let record = self
            .driver
            .get_by_id(&self.collection, identity, &id)
            .await?;
        Ok(match record {
            Some(record) => TargetLookup::Found(record),
            None => TargetLookup::Missing,
        })
    }
}
