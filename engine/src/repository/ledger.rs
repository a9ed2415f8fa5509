//! Registration ledger.
//!
//! Owns the registration records and the waitlist ordering. Every
//! registration is stored twice: a primary record in the user's partition
//! (authoritative, the conditional-create target that enforces "at most one
//! registration per pair") and an index record in the event's partition so
//! event-side listings are range queries instead of scans. Waitlisted index
//! records embed the ordering token in their sort key, which makes the
//! waitlist a priority queue backed by a sorted range read.
//!
//! Primary and index records are written and removed together. The store
//! gives no multi-item transaction, so the second write is rolled back /
//! surfaced on failure rather than left silently divergent.

use super::{from_item, to_item};
use crate::keys;
use guestlist_core::error::{GuestlistError, Result};
use guestlist_core::store::{EntityStore, Item, ItemKey, StoreError};
use guestlist_core::types::{
    EventId, OrderingToken, Registration, RegistrationStatus, UserId,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

/// Attribute holding the registration status, the guard attribute for
/// conditional status flips.
pub const STATUS_ATTR: &str = "registrationStatus";

/// How many times `remove_entry` re-reads the record after its guarded
/// delete fails because the status changed underneath it.
const REMOVAL_REREADS: usize = 1;

/// Registration records and waitlist ordering.
pub struct RegistrationLedger<S> {
    store: Arc<S>,
}

impl<S: EntityStore> RegistrationLedger<S> {
    /// Create a ledger over the given store.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn index_key(registration: &Registration) -> Result<ItemKey> {
        match registration.status {
            RegistrationStatus::Registered => Ok(keys::registered_index_key(
                &registration.event_id,
                &registration.user_id,
            )),
            RegistrationStatus::Waitlisted => {
                let token = registration.waitlist_token.ok_or_else(|| {
                    GuestlistError::inconsistency(format!(
                        "waitlisted registration {}/{} has no ordering token",
                        registration.user_id, registration.event_id
                    ))
                })?;
                Ok(keys::waitlist_index_key(
                    &registration.event_id,
                    token,
                    &registration.user_id,
                ))
            }
        }
    }

    /// Look up the registration for a pair, if any.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::Store`] on backend failure.
    pub async fn get_registration(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<Registration>> {
        match self
            .store
            .get(&keys::registration_primary_key(user_id, event_id))
            .await?
        {
            Some(item) => Ok(Some(from_item(item)?)),
            None => Ok(None),
        }
    }

    /// Create a `registered`-status entry for the pair.
    ///
    /// The primary write is a conditional create — the mechanism that makes
    /// double registration impossible under concurrency.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::AlreadyRegistered`] if any registration
    /// already exists for the pair.
    pub async fn create_registered_entry(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        now: DateTime<Utc>,
    ) -> Result<Registration> {
        let registration = Registration {
            user_id: user_id.clone(),
            event_id: event_id.clone(),
            status: RegistrationStatus::Registered,
            registered_at: now,
            waitlist_token: None,
        };
        self.create_entry(registration).await
    }

    /// Create a `waitlisted`-status entry carrying the given ordering token.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::AlreadyRegistered`] if any registration
    /// already exists for the pair.
    pub async fn create_waitlist_entry(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        now: DateTime<Utc>,
        token: OrderingToken,
    ) -> Result<Registration> {
        let registration = Registration {
            user_id: user_id.clone(),
            event_id: event_id.clone(),
            status: RegistrationStatus::Waitlisted,
            registered_at: now,
            waitlist_token: Some(token),
        };
        self.create_entry(registration).await
    }

    async fn create_entry(&self, registration: Registration) -> Result<Registration> {
        let primary_key =
            keys::registration_primary_key(&registration.user_id, &registration.event_id);
        let index_key = Self::index_key(&registration)?;
        let item = to_item(&registration)?;

        match self.store.create(&primary_key, item.clone()).await {
            Ok(()) => {}
            Err(StoreError::ConditionFailed) => {
                return Err(GuestlistError::AlreadyRegistered {
                    user_id: registration.user_id,
                    event_id: registration.event_id,
                });
            }
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = self.store.create(&index_key, item).await {
            // Keep primary and index a unit: undo the primary write.
            if let Err(rollback_err) = self.store.delete(&primary_key).await {
                tracing::warn!(
                    user_id = %registration.user_id,
                    event_id = %registration.event_id,
                    error = %rollback_err,
                    "rollback of primary registration record failed, primary left without an index entry"
                );
            }
            return Err(err.into());
        }
        Ok(registration)
    }

    /// Remove the registration for a pair, primary and index together, and
    /// return the removed record.
    ///
    /// The primary delete is guarded on the status that was read, so the
    /// returned record is exactly what was removed. A guard failure means
    /// the record was removed or promoted concurrently; the pair is
    /// re-read and the delete retried against the new status, which is how
    /// an unregister serializes against a concurrent promotion of the same
    /// user.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::RegistrationNotFound`] if no registration exists
    ///   (or a concurrent remove won the race)
    /// - [`GuestlistError::StoreInconsistency`] if the status kept changing
    ///   across the re-read
    pub async fn remove_entry(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Registration> {
        let primary_key = keys::registration_primary_key(user_id, event_id);

        for _ in 0..=REMOVAL_REREADS {
            let registration =
                self.get_registration(user_id, event_id).await?.ok_or_else(|| {
                    // Of two concurrent removals, only the one whose guarded
                    // delete succeeded proceeds; the other lands here. This
                    // is what keeps the counter from being decremented twice
                    // for one entry.
                    GuestlistError::RegistrationNotFound {
                        user_id: user_id.clone(),
                        event_id: event_id.clone(),
                    }
                })?;

            let expected = serde_json::to_value(registration.status)
                .map_err(|err| GuestlistError::Store(StoreError::Backend(err.to_string())))?;
            match self
                .store
                .delete_when(&primary_key, STATUS_ATTR, &expected)
                .await
            {
                Ok(()) => {
                    self.store.delete(&Self::index_key(&registration)?).await?;
                    return Ok(registration);
                }
                Err(StoreError::ConditionFailed) => {
                    tracing::debug!(
                        user_id = %user_id,
                        event_id = %event_id,
                        status = %registration.status,
                        "registration changed during removal, re-reading"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(GuestlistError::inconsistency(format!(
            "registration {user_id}/{event_id} kept changing during removal"
        )))
    }

    /// Flip a waitlisted entry to `registered`, guarded on its current
    /// status, and relocate its index record.
    ///
    /// Returns `Ok(None)` when the guard fails — the entry was already
    /// promoted or removed by a concurrent operation — so callers can
    /// re-query the waitlist head instead of double-promoting.
    /// `registeredAt` is left unchanged by promotion.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::Store`] on backend failure.
    pub async fn promote_entry(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<Registration>> {
        let Some(registration) = self.get_registration(user_id, event_id).await? else {
            return Ok(None);
        };
        if !registration.is_waitlisted() {
            return Ok(None);
        }
        let wait_index_key = Self::index_key(&registration)?;

        let mut patch = Item::new();
        patch.insert(STATUS_ATTR.to_string(), json!("registered"));
        patch.insert("waitlistToken".to_string(), Value::Null);

        let primary_key = keys::registration_primary_key(user_id, event_id);
        let updated = match self
            .store
            .update_when(&primary_key, STATUS_ATTR, &json!("waitlisted"), patch)
            .await
        {
            Ok(item) => item,
            Err(StoreError::ConditionFailed) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let promoted: Registration = from_item(updated)?;

        self.store.delete(&wait_index_key).await?;
        self.store
            .put(
                &keys::registered_index_key(event_id, user_id),
                to_item(&promoted)?,
            )
            .await?;
        Ok(Some(promoted))
    }

    /// Flip a `registered` entry to `waitlisted` with the given token.
    ///
    /// Only used by the engine's capacity-race compensation: the entry was
    /// created moments ago by the same request, the counter turned out to be
    /// over capacity, and the entry is rolled back onto the waitlist.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::StoreInconsistency`] if the entry is no
    /// longer in `registered` status.
    pub async fn move_to_waitlist(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        token: OrderingToken,
    ) -> Result<Registration> {
        let mut patch = Item::new();
        patch.insert(STATUS_ATTR.to_string(), json!("waitlisted"));
        patch.insert(
            "waitlistToken".to_string(),
            serde_json::to_value(token)
                .map_err(|err| GuestlistError::Store(StoreError::Backend(err.to_string())))?,
        );

        let primary_key = keys::registration_primary_key(user_id, event_id);
        let updated = match self
            .store
            .update_when(&primary_key, STATUS_ATTR, &json!("registered"), patch)
            .await
        {
            Ok(item) => item,
            Err(StoreError::ConditionFailed) => {
                return Err(GuestlistError::inconsistency(format!(
                    "cannot move {user_id}/{event_id} to the waitlist: entry is no longer registered"
                )));
            }
            Err(err) => return Err(err.into()),
        };
        let waitlisted: Registration = from_item(updated)?;

        self.store
            .delete(&keys::registered_index_key(event_id, user_id))
            .await?;
        self.store
            .put(&Self::index_key(&waitlisted)?, to_item(&waitlisted)?)
            .await?;
        Ok(waitlisted)
    }

    /// All registrations for a user, any status, via a primary-key range
    /// query.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::Store`] on backend failure.
    pub async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Registration>> {
        let items = self
            .store
            .query(
                &keys::user_partition(user_id),
                keys::REGISTRATION_PRIMARY_PREFIX,
                None,
            )
            .await?;
        items.into_iter().map(from_item).collect()
    }

    /// All registrations for an event, any status, via the index:
    /// registered entries first, then waitlisted entries in token order.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::Store`] on backend failure.
    pub async fn list_by_event(&self, event_id: &EventId) -> Result<Vec<Registration>> {
        let partition = keys::event_partition(event_id);
        let mut items = self
            .store
            .query(&partition, keys::REGISTERED_INDEX_PREFIX, None)
            .await?;
        items.extend(
            self.store
                .query(&partition, keys::WAITLIST_INDEX_PREFIX, None)
                .await?,
        );
        items.into_iter().map(from_item).collect()
    }

    /// The earliest waitlisted registration for an event, or `None`.
    ///
    /// A sorted range read with limit 1; FIFO order is the sort-key order
    /// of the embedded ordering tokens.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::Store`] on backend failure.
    pub async fn first_waitlisted(&self, event_id: &EventId) -> Result<Option<Registration>> {
        let items = self
            .store
            .query(
                &keys::event_partition(event_id),
                keys::WAITLIST_INDEX_PREFIX,
                Some(1),
            )
            .await?;
        match items.into_iter().next() {
            Some(item) => Ok(Some(from_item(item)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use guestlist_core::store::MemoryStore;

    fn ledger() -> RegistrationLedger<MemoryStore> {
        RegistrationLedger::new(Arc::new(MemoryStore::new()))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn one_registration_per_pair_in_any_status() {
        let ledger = ledger();
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));

        ledger
            .create_registered_entry(&u1, &e1, now())
            .await
            .unwrap();

        let err = ledger
            .create_registered_entry(&u1, &e1, now())
            .await
            .unwrap_err();
        assert!(matches!(err, GuestlistError::AlreadyRegistered { .. }));

        // A waitlist entry for the same pair is just as much a duplicate.
        let err = ledger
            .create_waitlist_entry(&u1, &e1, now(), OrderingToken::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestlistError::AlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn primary_and_index_records_stay_in_step() {
        let ledger = ledger();
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));

        let created = ledger
            .create_registered_entry(&u1, &e1, now())
            .await
            .unwrap();

        let by_user = ledger.list_by_user(&u1).await.unwrap();
        let by_event = ledger.list_by_event(&e1).await.unwrap();
        assert_eq!(by_user, vec![created.clone()]);
        assert_eq!(by_event, vec![created]);

        ledger.remove_entry(&u1, &e1).await.unwrap();
        assert!(ledger.list_by_user(&u1).await.unwrap().is_empty());
        assert!(ledger.list_by_event(&e1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_a_waitlisted_entry_clears_the_queue_record() {
        let ledger = ledger();
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));

        ledger
            .create_waitlist_entry(&u1, &e1, now(), OrderingToken::new(5))
            .await
            .unwrap();
        assert!(ledger.first_waitlisted(&e1).await.unwrap().is_some());

        ledger.remove_entry(&u1, &e1).await.unwrap();
        assert!(ledger.first_waitlisted(&e1).await.unwrap().is_none());
        assert!(ledger.list_by_event(&e1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_write_failure_rolls_back_the_primary_record() {
        let store = Arc::new(MemoryStore::new());
        let ledger = RegistrationLedger::new(Arc::clone(&store));
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));

        // Occupy the index slot so the second write of create_entry fails.
        store
            .put(&ItemKey::new("event#e1", "reg#u1"), Item::new())
            .await
            .unwrap();

        let err = ledger
            .create_registered_entry(&u1, &e1, now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GuestlistError::Store(StoreError::ConditionFailed)
        ));
        // The primary write was undone; the pair can register again later.
        assert!(ledger.get_registration(&u1, &e1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_rollback_still_surfaces_the_index_error() {
        let store = Arc::new(guestlist_testing::faults::FlakyStore::new(
            MemoryStore::new(),
        ));
        let ledger = RegistrationLedger::new(Arc::clone(&store));
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));

        store
            .put(&ItemKey::new("event#e1", "reg#u1"), Item::new())
            .await
            .unwrap();
        store.fail_next(
            guestlist_testing::faults::StoreOp::Delete,
            StoreError::Backend("down".to_string()),
        );

        let err = ledger
            .create_registered_entry(&u1, &e1, now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GuestlistError::Store(StoreError::ConditionFailed)
        ));
        // Rollback failed too: the primary record survives for later
        // reconciliation instead of vanishing silently.
        assert!(ledger.get_registration(&u1, &e1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_of_absent_entry_is_not_found() {
        let ledger = ledger();
        let err = ledger
            .remove_entry(&UserId::new("u1"), &EventId::new("e1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuestlistError::RegistrationNotFound { .. }));
    }

    #[tokio::test]
    async fn first_waitlisted_follows_token_order_not_insertion_order() {
        let ledger = ledger();
        let e1 = EventId::new("e1");

        ledger
            .create_waitlist_entry(&UserId::new("late"), &e1, now(), OrderingToken::new(20))
            .await
            .unwrap();
        ledger
            .create_waitlist_entry(&UserId::new("early"), &e1, now(), OrderingToken::new(10))
            .await
            .unwrap();

        let head = ledger.first_waitlisted(&e1).await.unwrap().unwrap();
        assert_eq!(head.user_id, UserId::new("early"));
    }

    #[tokio::test]
    async fn promote_flips_status_once_and_keeps_registered_at() {
        let ledger = ledger();
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));
        let created_at = now();

        ledger
            .create_waitlist_entry(&u1, &e1, created_at, OrderingToken::new(1))
            .await
            .unwrap();

        let promoted = ledger.promote_entry(&u1, &e1).await.unwrap().unwrap();
        assert!(promoted.is_registered());
        assert_eq!(promoted.registered_at, created_at);
        assert!(promoted.waitlist_token.is_none());

        // The wait-queue record is gone, the registered index record exists.
        assert!(ledger.first_waitlisted(&e1).await.unwrap().is_none());
        let by_event = ledger.list_by_event(&e1).await.unwrap();
        assert_eq!(by_event.len(), 1);
        assert!(by_event[0].is_registered());

        // Double promotion fails the guard instead of applying twice.
        assert!(ledger.promote_entry(&u1, &e1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn promote_of_absent_or_registered_entry_reports_guard_failure() {
        let ledger = ledger();
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));

        assert!(ledger.promote_entry(&u1, &e1).await.unwrap().is_none());

        ledger
            .create_registered_entry(&u1, &e1, now())
            .await
            .unwrap();
        assert!(ledger.promote_entry(&u1, &e1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn move_to_waitlist_rolls_a_registered_entry_back() {
        let ledger = ledger();
        let (u1, e1) = (UserId::new("u1"), EventId::new("e1"));

        ledger
            .create_registered_entry(&u1, &e1, now())
            .await
            .unwrap();
        let moved = ledger
            .move_to_waitlist(&u1, &e1, OrderingToken::new(7))
            .await
            .unwrap();

        assert!(moved.is_waitlisted());
        assert_eq!(moved.waitlist_token, Some(OrderingToken::new(7)));
        let head = ledger.first_waitlisted(&e1).await.unwrap().unwrap();
        assert_eq!(head.user_id, u1);

        // No stale registered index record survives.
        let by_event = ledger.list_by_event(&e1).await.unwrap();
        assert_eq!(by_event.len(), 1);
        assert!(by_event[0].is_waitlisted());
    }

    #[tokio::test]
    async fn list_by_user_spans_events_and_statuses() {
        let ledger = ledger();
        let u1 = UserId::new("u1");

        ledger
            .create_registered_entry(&u1, &EventId::new("e1"), now())
            .await
            .unwrap();
        ledger
            .create_waitlist_entry(&u1, &EventId::new("e2"), now(), OrderingToken::new(3))
            .await
            .unwrap();

        let registrations = ledger.list_by_user(&u1).await.unwrap();
        assert_eq!(registrations.len(), 2);
    }
}
