//! In-memory entity store.
//!
//! A `BTreeMap` keyed by `(partition, sort)` gives the sorted range queries
//! the [`EntityStore`] contract requires; a single mutex around the map
//! makes every operation atomic. This is the local/dev and test backend.

use super::{EntityStore, Item, ItemKey, StoreError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type Table = BTreeMap<(String, String), Item>;

/// In-memory [`EntityStore`] implementation.
///
/// Cloning is cheap and clones share the same underlying table.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    items: Arc<Mutex<Table>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently stored. Test diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the table mutex is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    /// Whether the store holds no items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the table mutex is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>, StoreError> {
        self.items
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

fn apply_patch(item: &mut Item, patch: Item) {
    for (attr, value) in patch {
        if value.is_null() {
            item.remove(&attr);
        } else {
            item.insert(attr, value);
        }
    }
}

fn tuple_key(key: &ItemKey) -> (String, String) {
    (key.partition.clone(), key.sort.clone())
}

impl EntityStore for MemoryStore {
    fn get(&self, key: &ItemKey) -> impl Future<Output = Result<Option<Item>, StoreError>> + Send {
        let result = self.lock().map(|table| table.get(&tuple_key(key)).cloned());
        async move { result }
    }

    fn put(&self, key: &ItemKey, item: Item) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.lock().map(|mut table| {
            table.insert(tuple_key(key), item);
        });
        async move { result }
    }

    fn create(
        &self,
        key: &ItemKey,
        item: Item,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.lock().and_then(|mut table| {
            let tuple = tuple_key(key);
            if table.contains_key(&tuple) {
                return Err(StoreError::ConditionFailed);
            }
            table.insert(tuple, item);
            Ok(())
        });
        async move { result }
    }

    fn update(
        &self,
        key: &ItemKey,
        patch: Item,
    ) -> impl Future<Output = Result<Item, StoreError>> + Send {
        let result = self.lock().and_then(|mut table| {
            let item = table.get_mut(&tuple_key(key)).ok_or(StoreError::NotFound)?;
            apply_patch(item, patch);
            Ok(item.clone())
        });
        async move { result }
    }

    fn update_when(
        &self,
        key: &ItemKey,
        guard_attr: &str,
        expected: &Value,
        patch: Item,
    ) -> impl Future<Output = Result<Item, StoreError>> + Send {
        let result = self.lock().and_then(|mut table| {
            let item = table
                .get_mut(&tuple_key(key))
                .ok_or(StoreError::ConditionFailed)?;
            if item.get(guard_attr) != Some(expected) {
                return Err(StoreError::ConditionFailed);
            }
            apply_patch(item, patch);
            Ok(item.clone())
        });
        async move { result }
    }

    fn delete(&self, key: &ItemKey) -> impl Future<Output = Result<bool, StoreError>> + Send {
        let result = self
            .lock()
            .map(|mut table| table.remove(&tuple_key(key)).is_some());
        async move { result }
    }

    fn delete_when(
        &self,
        key: &ItemKey,
        guard_attr: &str,
        expected: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.lock().and_then(|mut table| {
            let tuple = tuple_key(key);
            let guard_holds = table
                .get(&tuple)
                .is_some_and(|item| item.get(guard_attr) == Some(expected));
            if !guard_holds {
                return Err(StoreError::ConditionFailed);
            }
            table.remove(&tuple);
            Ok(())
        });
        async move { result }
    }

    fn add(
        &self,
        key: &ItemKey,
        attr: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send {
        let result = self.lock().and_then(|mut table| {
            let item = table.get_mut(&tuple_key(key)).ok_or(StoreError::NotFound)?;
            let current = item.get(attr).and_then(Value::as_i64).unwrap_or(0);
            let mut next = current + delta;
            if let Some(floor) = floor {
                next = next.max(floor);
            }
            item.insert(attr.to_string(), Value::from(next));
            Ok(next)
        });
        async move { result }
    }

    fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send {
        let range_start = (partition.to_string(), sort_prefix.to_string());
        let result = self.lock().map(|table| {
            table
                .range(range_start..)
                .take_while(|((p, s), _)| p == partition && s.starts_with(sort_prefix))
                .map(|(_, item)| item.clone())
                .take(limit.unwrap_or(usize::MAX))
                .collect()
        });
        async move { result }
    }

    fn scan(&self, sort_key: &str) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send {
        let result = self.lock().map(|table| {
            table
                .iter()
                .filter(|((_, s), _)| s == sort_key)
                .map(|(_, item)| item.clone())
                .collect()
        });
        async move { result }
    }
}
