//! The entity-store abstraction.
//!
//! The registration core coordinates exclusively through a key-value store
//! offering conditional single-item writes, atomic counters, and sorted
//! range queries — the contract of DynamoDB-style stores. No application
//! code may read-modify-write a counter or emulate a conditional write with
//! a read followed by a put; those primitives are what close the
//! duplicate-registration and capacity races.
//!
//! Items are JSON objects; repositories (de)serialize typed domain values
//! at the boundary.

mod memory;

pub use memory::MemoryStore;

use serde_json::Value;
use std::future::Future;
use thiserror::Error;

/// A stored item: a flat JSON object of named attributes.
pub type Item = serde_json::Map<String, Value>;

/// Composite key addressing one item: a partition key plus a sort key.
///
/// Items within one partition are ordered by their sort key, which is what
/// makes [`EntityStore::query`] a sorted range query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    /// Partition (hash) key.
    pub partition: String,
    /// Sort (range) key.
    pub sort: String,
}

impl ItemKey {
    /// Create a key from partition and sort components.
    #[must_use]
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition, self.sort)
    }
}

/// Failure modes of the entity store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A conditional write's precondition did not hold (key already
    /// present on create, key absent or guard attribute mismatch on a
    /// guarded update).
    #[error("Conditional check failed")]
    ConditionFailed,

    /// The addressed item does not exist.
    #[error("Item not found")]
    NotFound,

    /// The backend failed; the operation may or may not have applied.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A key-value store with conditional writes, atomic counters and sorted
/// range queries.
///
/// Patch semantics for [`update`](EntityStore::update) and
/// [`update_when`](EntityStore::update_when): each patch attribute is set on
/// the item, except that a `null` patch value *removes* the attribute (the
/// analogue of an UpdateExpression `REMOVE`).
pub trait EntityStore: Send + Sync {
    /// Read one item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn get(&self, key: &ItemKey) -> impl Future<Output = Result<Option<Item>, StoreError>> + Send;

    /// Unconditionally write one item, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the write fails.
    fn put(&self, key: &ItemKey, item: Item) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write one item only if the key does not already exist.
    ///
    /// This is the duplicate-prevention primitive: of two concurrent
    /// creates for the same key, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConditionFailed`] if the key exists,
    /// [`StoreError::Backend`] if the write fails.
    fn create(
        &self,
        key: &ItemKey,
        item: Item,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Merge a patch into an existing item and return the updated item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key is absent,
    /// [`StoreError::Backend`] if the write fails.
    fn update(
        &self,
        key: &ItemKey,
        patch: Item,
    ) -> impl Future<Output = Result<Item, StoreError>> + Send;

    /// Merge a patch into an existing item only if a guard attribute
    /// currently equals the expected value.
    ///
    /// This is the invariant-guard primitive: of two concurrent guarded
    /// updates expecting the same prior value, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConditionFailed`] if the key is absent or the
    /// guard attribute differs, [`StoreError::Backend`] if the write fails.
    fn update_when(
        &self,
        key: &ItemKey,
        guard_attr: &str,
        expected: &Value,
        patch: Item,
    ) -> impl Future<Output = Result<Item, StoreError>> + Send;

    /// Delete one item. Returns whether the key existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the delete fails.
    fn delete(&self, key: &ItemKey) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Delete one item only if a guard attribute currently equals the
    /// expected value.
    ///
    /// The conditional-delete primitive: a caller that branches on a value
    /// it read can make the delete contingent on that value still holding,
    /// instead of deleting whatever happens to be there now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConditionFailed`] if the key is absent or the
    /// guard attribute differs, [`StoreError::Backend`] if the delete
    /// fails.
    fn delete_when(
        &self,
        key: &ItemKey,
        guard_attr: &str,
        expected: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically add `delta` to a numeric attribute and return the new
    /// value, clamped to `floor` when given. A missing attribute counts
    /// as zero.
    ///
    /// The addition happens inside the store in a single step; callers must
    /// never emulate it with a read followed by a write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key is absent,
    /// [`StoreError::Backend`] if the update fails.
    fn add(
        &self,
        key: &ItemKey,
        attr: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Range-query one partition for items whose sort key starts with
    /// `sort_prefix`, in ascending sort-key order, up to `limit` items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send;

    /// Return every item whose sort key equals `sort_key`, across all
    /// partitions. A finite, non-restartable snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn scan(&self, sort_key: &str) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send;
}
