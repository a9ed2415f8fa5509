//! # Guestlist Testing
//!
//! Testing utilities for the Guestlist registration engine:
//!
//! - [`mocks::FixedClock`]: deterministic time
//! - [`faults::FlakyStore`]: fail the next N calls of a chosen store
//!   operation, for retry and partial-failure paths
//! - [`faults::HookStore`]: run a one-shot hook before a store operation,
//!   for deterministic race interleavings
//! - [`fixtures`]: event draft builders
//!
//! # Example
//!
//! ```
//! use guestlist_testing::mocks::FixedClock;
//! use guestlist_core::environment::Clock;
//! use chrono::Utc;
//!
//! let clock = FixedClock::new(Utc::now());
//! assert_eq!(clock.now(), clock.now()); // always the same
//! ```

/// Mock implementations of environment traits.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use guestlist_core::environment::Clock;

    /// Fixed clock for deterministic tests. Always returns the same time.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a fixed clock reporting the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }
}

/// Fault-injection wrappers around an [`EntityStore`].
///
/// [`EntityStore`]: guestlist_core::store::EntityStore
pub mod faults {
    use futures::future::BoxFuture;
    use guestlist_core::store::{EntityStore, Item, ItemKey, StoreError};
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    /// A store operation, for targeting fault injection.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum StoreOp {
        /// [`EntityStore::get`]
        Get,
        /// [`EntityStore::put`]
        Put,
        /// [`EntityStore::create`]
        Create,
        /// [`EntityStore::update`]
        Update,
        /// [`EntityStore::update_when`]
        UpdateWhen,
        /// [`EntityStore::delete`]
        Delete,
        /// [`EntityStore::delete_when`]
        DeleteWhen,
        /// [`EntityStore::add`]
        Add,
        /// [`EntityStore::query`]
        Query,
        /// [`EntityStore::scan`]
        Scan,
    }

    /// Wraps a store and fails queued calls of chosen operations.
    ///
    /// Failures are consumed in FIFO order per operation; once the queue is
    /// empty the wrapped store behaves normally again.
    #[derive(Clone)]
    pub struct FlakyStore<S> {
        inner: S,
        failures: Arc<Mutex<HashMap<StoreOp, VecDeque<StoreError>>>>,
    }

    impl<S> FlakyStore<S> {
        /// Wrap a store with no failures queued.
        #[must_use]
        pub fn new(inner: S) -> Self {
            Self {
                inner,
                failures: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        /// Queue one failure for the next call of `op`.
        pub fn fail_next(&self, op: StoreOp, error: StoreError) {
            self.fail_times(op, 1, error);
        }

        /// Queue `times` failures for the next calls of `op`.
        pub fn fail_times(&self, op: StoreOp, times: usize, error: StoreError) {
            if let Ok(mut failures) = self.failures.lock() {
                let queue = failures.entry(op).or_default();
                for _ in 0..times {
                    queue.push_back(error.clone());
                }
            }
        }

        fn take(&self, op: StoreOp) -> Option<StoreError> {
            let mut failures = self.failures.lock().ok()?;
            failures.get_mut(&op).and_then(VecDeque::pop_front)
        }
    }

    impl<S: EntityStore> EntityStore for FlakyStore<S> {
        fn get(
            &self,
            key: &ItemKey,
        ) -> impl Future<Output = Result<Option<Item>, StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Get) {
                    return Err(err);
                }
                self.inner.get(key).await
            }
        }

        fn put(
            &self,
            key: &ItemKey,
            item: Item,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Put) {
                    return Err(err);
                }
                self.inner.put(key, item).await
            }
        }

        fn create(
            &self,
            key: &ItemKey,
            item: Item,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Create) {
                    return Err(err);
                }
                self.inner.create(key, item).await
            }
        }

        fn update(
            &self,
            key: &ItemKey,
            patch: Item,
        ) -> impl Future<Output = Result<Item, StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Update) {
                    return Err(err);
                }
                self.inner.update(key, patch).await
            }
        }

        fn update_when(
            &self,
            key: &ItemKey,
            guard_attr: &str,
            expected: &Value,
            patch: Item,
        ) -> impl Future<Output = Result<Item, StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::UpdateWhen) {
                    return Err(err);
                }
                self.inner.update_when(key, guard_attr, expected, patch).await
            }
        }

        fn delete(&self, key: &ItemKey) -> impl Future<Output = Result<bool, StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Delete) {
                    return Err(err);
                }
                self.inner.delete(key).await
            }
        }

        fn delete_when(
            &self,
            key: &ItemKey,
            guard_attr: &str,
            expected: &Value,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::DeleteWhen) {
                    return Err(err);
                }
                self.inner.delete_when(key, guard_attr, expected).await
            }
        }

        fn add(
            &self,
            key: &ItemKey,
            attr: &str,
            delta: i64,
            floor: Option<i64>,
        ) -> impl Future<Output = Result<i64, StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Add) {
                    return Err(err);
                }
                self.inner.add(key, attr, delta, floor).await
            }
        }

        fn query(
            &self,
            partition: &str,
            sort_prefix: &str,
            limit: Option<usize>,
        ) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Query) {
                    return Err(err);
                }
                self.inner.query(partition, sort_prefix, limit).await
            }
        }

        fn scan(&self, sort_key: &str) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send {
            async move {
                if let Some(err) = self.take(StoreOp::Scan) {
                    return Err(err);
                }
                self.inner.scan(sort_key).await
            }
        }
    }

    type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

    /// Wraps a store and runs one-shot async hooks before chosen
    /// operations.
    ///
    /// This is how tests interleave a rival operation at an exact point in
    /// a multi-step flow — e.g. sneaking a concurrent registration in
    /// between the engine's capacity read and its counter increment.
    #[derive(Clone)]
    pub struct HookStore<S> {
        inner: S,
        hooks: Arc<Mutex<HashMap<StoreOp, VecDeque<Hook>>>>,
    }

    impl<S> HookStore<S> {
        /// Wrap a store with no hooks installed.
        #[must_use]
        pub fn new(inner: S) -> Self {
            Self {
                inner,
                hooks: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        /// Install a one-shot hook to run before the next call of `op`.
        ///
        /// The hook is removed before it runs, so store calls made *by* the
        /// hook do not re-trigger it.
        pub fn on_next<F, Fut>(&self, op: StoreOp, hook: F)
        where
            F: FnOnce() -> Fut + Send + 'static,
            Fut: Future<Output = ()> + Send + 'static,
        {
            if let Ok(mut hooks) = self.hooks.lock() {
                hooks
                    .entry(op)
                    .or_default()
                    .push_back(Box::new(move || Box::pin(hook())));
            }
        }

        async fn run_hook(&self, op: StoreOp) {
            let hook = self
                .hooks
                .lock()
                .ok()
                .and_then(|mut hooks| hooks.get_mut(&op).and_then(VecDeque::pop_front));
            if let Some(hook) = hook {
                hook().await;
            }
        }
    }

    impl<S: EntityStore> EntityStore for HookStore<S> {
        fn get(
            &self,
            key: &ItemKey,
        ) -> impl Future<Output = Result<Option<Item>, StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Get).await;
                self.inner.get(key).await
            }
        }

        fn put(
            &self,
            key: &ItemKey,
            item: Item,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Put).await;
                self.inner.put(key, item).await
            }
        }

        fn create(
            &self,
            key: &ItemKey,
            item: Item,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Create).await;
                self.inner.create(key, item).await
            }
        }

        fn update(
            &self,
            key: &ItemKey,
            patch: Item,
        ) -> impl Future<Output = Result<Item, StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Update).await;
                self.inner.update(key, patch).await
            }
        }

        fn update_when(
            &self,
            key: &ItemKey,
            guard_attr: &str,
            expected: &Value,
            patch: Item,
        ) -> impl Future<Output = Result<Item, StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::UpdateWhen).await;
                self.inner.update_when(key, guard_attr, expected, patch).await
            }
        }

        fn delete(&self, key: &ItemKey) -> impl Future<Output = Result<bool, StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Delete).await;
                self.inner.delete(key).await
            }
        }

        fn delete_when(
            &self,
            key: &ItemKey,
            guard_attr: &str,
            expected: &Value,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::DeleteWhen).await;
                self.inner.delete_when(key, guard_attr, expected).await
            }
        }

        fn add(
            &self,
            key: &ItemKey,
            attr: &str,
            delta: i64,
            floor: Option<i64>,
        ) -> impl Future<Output = Result<i64, StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Add).await;
                self.inner.add(key, attr, delta, floor).await
            }
        }

        fn query(
            &self,
            partition: &str,
            sort_prefix: &str,
            limit: Option<usize>,
        ) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Query).await;
                self.inner.query(partition, sort_prefix, limit).await
            }
        }

        fn scan(&self, sort_key: &str) -> impl Future<Output = Result<Vec<Item>, StoreError>> + Send {
            async move {
                self.run_hook(StoreOp::Scan).await;
                self.inner.scan(sort_key).await
            }
        }
    }
}

/// Builders for common test entities.
pub mod fixtures {
    use guestlist_core::types::{EventDraft, EventId};

    /// An event draft with filler descriptive fields and an explicit id.
    #[must_use]
    pub fn event_draft(event_id: &str, capacity: u32, waitlist_enabled: bool) -> EventDraft {
        EventDraft {
            event_id: Some(EventId::new(event_id)),
            title: format!("Event {event_id}"),
            description: "test event".to_string(),
            date: "2024-07-01".to_string(),
            location: "HQ".to_string(),
            organizer: "ops".to_string(),
            status: "active".to_string(),
            capacity,
            waitlist_enabled,
        }
    }
}

/// Install a fmt tracing subscriber honoring `RUST_LOG`, once. Safe to call
/// from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
