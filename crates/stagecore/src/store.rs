use crate::{StageError, StageId, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A stored value plus the stage that last wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProduct {
    pub key: String,
    pub value: Value,
    /// Advisory only; used for diagnostics.
    pub producer: Option<StageId>,
}

/// Concurrency-safe key/value store shared by every stage of a pipeline.
///
/// A single coarse lock guards the map. Writes replace any previous value for
/// the same key (last writer wins) and there is no atomicity across keys.
/// Nothing is cleared implicitly between runs.
#[derive(Debug, Default)]
pub struct DataProductStore {
    entries: RwLock<HashMap<String, DataProduct>>,
}

impl DataProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking stage must not make the store unusable for the rest of the run.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DataProduct>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DataProduct>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), None);
    }

    /// Store a value and remember which stage produced it.
    pub fn put_from(&self, producer: &str, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), Some(producer.to_string()));
    }

    fn insert(&self, key: String, value: Value, producer: Option<StageId>) {
        tracing::trace!(key = %key, producer = ?producer, "Storing data product");
        let product = DataProduct {
            key: key.clone(),
            value,
            producer,
        };
        self.write().insert(key, product);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).map(|p| p.value.clone())
    }

    /// Get a value or fail with `MissingProduct`.
    pub fn require(&self, key: &str) -> Result<Value, StageError> {
        self.get(key)
            .ok_or_else(|| StageError::MissingProduct(key.to_string()))
    }

    pub fn entry(&self, key: &str) -> Option<DataProduct> {
        self.read().get(key).cloned()
    }

    pub fn put_typed<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(value)?;
        self.put(key, Value::from_json(json));
        Ok(())
    }

    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<T, StageError> {
        let value = self.require(key)?;
        serde_json::from_value(value.to_json()).map_err(|_| StageError::InvalidProductType {
            key: key.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().remove(key).map(|p| p.value)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of every product as a JSON object keyed by product name.
    pub fn serialize_all(&self) -> serde_json::Value {
        let entries = self.read();
        let map: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(key, product)| (key.clone(), product.value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn clear(&self) {
        let mut entries = self.write();
        tracing::debug!(count = entries.len(), "Clearing data product store");
        entries.clear();
    }
}
