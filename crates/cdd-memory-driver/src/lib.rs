//! In-memory reference implementation of [`DataDriver`].
//!
//! Collections are created on first write. Each create runs under a single write lock, so the
//! id and content checks and the insert are atomic with respect to concurrent calls.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use cdd_contracts::{CallerIdentity, Conflict, DEFAULT_ID_FIELD};
use cdd_driver::{ContentPolicy, DataDriver, DeleteSelector, DriverError};
use parking_lot::RwLock;
use serde_json::{Map, Value};

pub mod search;

pub const STORE_KIND: &str = "memory";

struct Entry {
    seq: u64,
    record: Value,
    fingerprint: Option<String>,
    /// The id was minted by the store, so it is left out of the fingerprint.
    generated_id: bool,
}

#[derive(Default)]
struct Collection {
    next_seq: u64,
    id_field: Option<String>,
    order: BTreeMap<u64, String>,
    by_id: HashMap<String, Entry>,
    /// Content digest to every live id holding it.
    fingerprints: HashMap<String, BTreeSet<String>>,
}

impl Collection {
    fn records_in_order(&self) -> impl Iterator<Item = &Value> {
        self.order
            .values()
            .filter_map(|id| self.by_id.get(id).map(|entry| &entry.record))
    }

    fn holder_of(&self, fingerprint: Option<&String>) -> Option<&String> {
        fingerprint
            .and_then(|fp| self.fingerprints.get(fp))
            .and_then(|ids| ids.iter().next())
    }

    fn forget_fingerprint(&mut self, id: &str, fingerprint: Option<&String>) {
        let Some(fp) = fingerprint else { return };
        if let Some(ids) = self.fingerprints.get_mut(fp) {
            ids.remove(id);
            if ids.is_empty() {
                self.fingerprints.remove(fp);
            }
        }
    }

    fn remember_fingerprint(&mut self, id: &str, fingerprint: Option<&String>) {
        if let Some(fp) = fingerprint {
            self.fingerprints
                .entry(fp.clone())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn remove(&mut self, id: &str) -> Option<Value> {
        let entry = self.by_id.remove(id)?;
        self.order.remove(&entry.seq);
        self.forget_fingerprint(id, entry.fingerprint.as_ref());
        Some(entry.record)
    }

    fn store(
        &mut self,
        id: &str,
        record: Value,
        id_field: &str,
        policy: &ContentPolicy,
    ) -> Result<Value, DriverError> {
        let entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| DriverError::InvalidRecord(format!("{id} vanished during update")))?;
        let previous = entry.fingerprint.take();
        let fingerprint = content_fingerprint(policy, &record, id_field, entry.generated_id);
        entry.record = record.clone();
        entry.fingerprint = fingerprint.clone();
        self.forget_fingerprint(id, previous.as_ref());
        self.remember_fingerprint(id, fingerprint.as_ref());
        Ok(record)
    }
}

/// Process-local store keyed by collection name.
#[derive(Default)]
pub struct MemoryDriver {
    policy: ContentPolicy,
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ContentPolicy) -> Self {
        Self {
            policy,
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &ContentPolicy {
        &self.policy
    }

    /// Number of live records in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.by_id.len())
            .unwrap_or(0)
    }
}

fn into_object(record: Value) -> Result<Map<String, Value>, DriverError> {
    match record {
        Value::Object(map) => Ok(map),
        other => Err(DriverError::InvalidRecord(format!(
            "records must be objects, got {other}"
        ))),
    }
}

/// Digest of `record`, leaving out a store-minted id so reposts without an id still collide.
fn content_fingerprint(
    policy: &ContentPolicy,
    record: &Value,
    id_field: &str,
    generated_id: bool,
) -> Option<String> {
    match record {
        Value::Object(map) if generated_id && map.contains_key(id_field) => {
            let mut payload = map.clone();
            payload.remove(id_field);
            policy.fingerprint(&Value::Object(payload))
        }
        _ => policy.fingerprint(record),
    }
}

/// Check that a payload id, if present, matches the addressed id.
fn ensure_same_id(
    map: &Map<String, Value>,
    id_field: &str,
    id: &str,
) -> Result<(), DriverError> {
    match map.get(id_field) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(found)) if found == id => Ok(()),
        Some(Value::String(found)) => Err(DriverError::IdMismatch {
            expected: id.to_string(),
            found: found.clone(),
        }),
        Some(other) => Err(DriverError::IdMismatch {
            expected: id.to_string(),
            found: other.to_string(),
        }),
    }
}

#[async_trait::async_trait]
impl DataDriver for MemoryDriver {
    fn kind(&self) -> &'static str {
        STORE_KIND
    }

    async fn get_by_id(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
        id: &str,
    ) -> Result<Option<Value>, DriverError> {
        let guard = self.collections.read();
        Ok(guard
            .get(collection)
            .and_then(|c| c.by_id.get(id))
            .map(|entry| entry.record.clone()))
    }

    async fn get_by_ids(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
        ids: &[String],
    ) -> Result<Vec<Value>, DriverError> {
        let guard = self.collections.read();
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| coll.by_id.get(id).map(|entry| entry.record.clone()))
            .collect())
    }

    async fn get_by_text(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
        query: &str,
    ) -> Result<Vec<Value>, DriverError> {
        let guard = self.collections.read();
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let id_field = coll.id_field.as_deref().unwrap_or(DEFAULT_ID_FIELD);
        let records: Vec<&Value> = coll.records_in_order().collect();
        let docs: Vec<String> = records
            .iter()
            .map(|record| search::searchable_text(record, id_field))
            .collect();
        let ranked = search::rank(&docs, query);
        tracing::debug!(collection, query, hits = ranked.len(), "memory text search");
        Ok(ranked
            .into_iter()
            .map(|index| records[index].clone())
            .collect())
    }

    async fn get_all(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
    ) -> Result<Vec<Value>, DriverError> {
        let guard = self.collections.read();
        Ok(guard
            .get(collection)
            .map(|c| c.records_in_order().cloned().collect())
            .unwrap_or_default())
    }

    async fn create(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
        record: Value,
        id_field: &str,
    ) -> Result<Value, DriverError> {
        let mut map = into_object(record)?;
        let (id, generated_id) = match map.get(id_field) {
            Some(Value::String(id)) => (id.clone(), false),
            None | Some(Value::Null) => {
                map.remove(id_field);
                (uuid::Uuid::new_v4().to_string(), true)
            }
            Some(other) => {
                return Err(DriverError::InvalidRecord(format!(
                    "{id_field} must be a string, got {other}"
                )))
            }
        };
        let fingerprint = self.policy.fingerprint(&Value::Object(map.clone()));
        if generated_id {
            map.insert(id_field.to_string(), Value::String(id.clone()));
        }
        let record = Value::Object(map);

        let mut guard = self.collections.write();
        let coll = guard.entry(collection.to_string()).or_default();
        if let Some(existing) = coll.holder_of(fingerprint.as_ref()) {
            return Err(Conflict::DuplicateContent {
                collection: collection.to_string(),
                id: existing.clone(),
            }
            .into());
        }
        if coll.by_id.contains_key(&id) {
            return Err(Conflict::DuplicateId {
                collection: collection.to_string(),
                id,
            }
            .into());
        }

        let seq = coll.next_seq;
        coll.next_seq += 1;
        coll.id_field.get_or_insert_with(|| id_field.to_string());
        coll.order.insert(seq, id.clone());
        coll.remember_fingerprint(&id, fingerprint.as_ref());
        coll.by_id.insert(
            id.clone(),
            Entry {
                seq,
                record: record.clone(),
                fingerprint,
                generated_id,
            },
        );
        tracing::debug!(collection, %id, seq, "memory create");
        Ok(record)
    }

    async fn replace(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
        id: &str,
        record: Value,
        id_field: &str,
    ) -> Result<Value, DriverError> {
        let mut map = into_object(record)?;
        ensure_same_id(&map, id_field, id)?;
        map.insert(id_field.to_string(), Value::String(id.to_string()));

        let mut guard = self.collections.write();
        let coll = guard
            .get_mut(collection)
            .filter(|c| c.by_id.contains_key(id))
            .ok_or_else(|| DriverError::not_found(collection, id))?;
        let stored = coll.store(id, Value::Object(map), id_field, &self.policy)?;
        tracing::debug!(collection, id, "memory replace");
        Ok(stored)
    }

    async fn merge(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
        id: &str,
        partial: Value,
        id_field: &str,
    ) -> Result<Value, DriverError> {
        let partial = into_object(partial)?;
        ensure_same_id(&partial, id_field, id)?;

        let mut guard = self.collections.write();
        let coll = guard
            .get_mut(collection)
            .ok_or_else(|| DriverError::not_found(collection, id))?;
        let mut merged = coll
            .by_id
            .get(id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| DriverError::not_found(collection, id))?;
        if let Value::Object(target) = &mut merged {
            for (key, value) in partial {
                if key != id_field {
                    target.insert(key, value);
                }
            }
        }
        let stored = coll.store(id, merged, id_field, &self.policy)?;
        tracing::debug!(collection, id, "memory merge");
        Ok(stored)
    }

    async fn delete(
        &self,
        collection: &str,
        _identity: Option<&CallerIdentity>,
        selector: DeleteSelector,
    ) -> Result<Vec<Value>, DriverError> {
        let mut guard = self.collections.write();
        let Some(coll) = guard.get_mut(collection) else {
            return match selector {
                DeleteSelector::One(id) => Err(DriverError::not_found(collection, &id)),
                _ => Ok(Vec::new()),
            };
        };
        let removed = match selector {
            DeleteSelector::One(id) => {
                let record = coll
                    .remove(&id)
                    .ok_or_else(|| DriverError::not_found(collection, &id))?;
                vec![record]
            }
            DeleteSelector::Many(ids) => ids.iter().filter_map(|id| coll.remove(id)).collect(),
            DeleteSelector::All => {
                let ids: Vec<String> = coll.order.values().cloned().collect();
                ids.iter().filter_map(|id| coll.remove(id)).collect()
            }
        };
        tracing::debug!(collection, removed = removed.len(), "memory delete");
        Ok(removed)
    }
}
