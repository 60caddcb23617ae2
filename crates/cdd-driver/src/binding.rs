use cdd_contracts::HttpMethod;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::handler::{DriverHandler, Strategy};
use crate::DriverRegistry;

/// How `get` contracts look records up.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum SearchMode {
    /// By id, id array, or everything when no id is given.
    #[default]
    #[serde(rename = "idOnly", alias = "id_only")]
    IdOnly,
    /// Like `IdOnly`, plus ranked free-text search through a `search` input field.
    #[serde(rename = "textSearch", alias = "text_search", alias = "free_text")]
    FreeText,
    /// No automatic lookup.
    #[serde(rename = "none")]
    None,
}

/// Declarative link between a contract and a storage backend.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DriverBinding {
    /// Store kind a registered driver answers to, e.g. `memory`.
    #[serde(rename = "type", alias = "store", alias = "store_kind")]
    pub store_kind: String,
    /// Collection (index, table) name on the backend.
    #[serde(alias = "index")]
    pub collection: String,
    /// Overrides the contract id field for this binding.
    #[serde(default, alias = "idField")]
    pub id_field: Option<String>,
    #[serde(default)]
    pub search: SearchMode,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BindingError {
    #[error("no driver registered for store kind {0}")]
    UnknownStore(String),
    #[error("get contracts need a search mode; {store} binding for {collection} has none")]
    UnsupportedSearch { store: String, collection: String },
    #[error("binding collection must not be empty")]
    EmptyCollection,
}

/// Turn a binding into a concrete handler. Runs once per contract at registration.
pub fn resolve_binding(
    binding: &DriverBinding,
    method: HttpMethod,
    contract_id_field: &str,
    drivers: &DriverRegistry,
) -> Result<DriverHandler, BindingError> {
    if binding.collection.trim().is_empty() {
        return Err(BindingError::EmptyCollection);
    }
    let driver = drivers
        .get(&binding.store_kind)
        .cloned()
        .ok_or_else(|| BindingError::UnknownStore(binding.store_kind.clone()))?;
    let strategy = match (method, binding.search) {
        (HttpMethod::Get, SearchMode::IdOnly) => Strategy::ReadById,
        (HttpMethod::Get, SearchMode::FreeText) => Strategy::ReadWithText,
        (HttpMethod::Get, SearchMode::None) => {
            return Err(BindingError::UnsupportedSearch {
                store: binding.store_kind.clone(),
                collection: binding.collection.clone(),
            })
        }
        (HttpMethod::Post, _) => Strategy::Create,
        (HttpMethod::Put, _) => Strategy::Replace,
        (HttpMethod::Patch, _) => Strategy::Merge,
        (HttpMethod::Delete, _) => Strategy::Delete,
    };
    let id_field = binding
        .id_field
        .clone()
        .unwrap_or_else(|| contract_id_field.to_string());
    tracing::debug!(
        store = %binding.store_kind,
        collection = %binding.collection,
        %method,
        ?strategy,
        "resolved driver binding"
    );
    Ok(DriverHandler::new(
        driver,
        binding.collection.clone(),
        id_field,
        strategy,
    ))
}
