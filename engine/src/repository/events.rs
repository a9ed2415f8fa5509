//! Event repository.
//!
//! Owns event metadata and the `currentRegistrations` counter. The counter
//! is only ever mutated through the atomic [`increment`] / [`decrement`]
//! operations below, and only by the registration engine.
//!
//! [`increment`]: EventRepository::increment_registration_count
//! [`decrement`]: EventRepository::decrement_registration_count

use super::{from_item, to_item};
use crate::keys;
use guestlist_core::environment::Clock;
use guestlist_core::error::{GuestlistError, Result};
use guestlist_core::store::{EntityStore, Item, StoreError};
use guestlist_core::types::{Event, EventDraft, EventId, EventPatch};
use std::sync::Arc;
use uuid::Uuid;

/// Attribute holding the registered-count cache.
pub const CURRENT_REGISTRATIONS_ATTR: &str = "currentRegistrations";

/// CRUD over event records plus the atomic registration counter.
pub struct EventRepository<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: EntityStore> EventRepository<S> {
    /// Create a repository over the given store.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create an event. Generates an event id when the draft carries none.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] if `capacity` is zero, the title
    ///   is blank, or a supplied event id is blank
    /// - [`GuestlistError::EventAlreadyExists`] on a duplicate id
    pub async fn create_event(&self, draft: EventDraft) -> Result<Event> {
        if draft.capacity == 0 {
            return Err(GuestlistError::invalid_input("capacity must be positive"));
        }
        if draft.title.trim().is_empty() {
            return Err(GuestlistError::invalid_input("title must not be empty"));
        }
        let event_id = match draft.event_id {
            Some(id) if id.is_blank() => {
                return Err(GuestlistError::invalid_input("eventId must not be empty"));
            }
            Some(id) => id,
            None => EventId::new(Uuid::new_v4().to_string()),
        };

        let now = self.clock.now();
        let event = Event {
            event_id: event_id.clone(),
            title: draft.title,
            description: draft.description,
            date: draft.date,
            location: draft.location,
            organizer: draft.organizer,
            status: draft.status,
            capacity: draft.capacity,
            waitlist_enabled: draft.waitlist_enabled,
            current_registrations: 0,
            created_at: now,
            updated_at: now,
        };

        match self
            .store
            .create(&keys::event_meta_key(&event_id), to_item(&event)?)
            .await
        {
            Ok(()) => {
                tracing::debug!(event_id = %event_id, capacity = event.capacity, "event created");
                Ok(event)
            }
            Err(StoreError::ConditionFailed) => {
                Err(GuestlistError::EventAlreadyExists { event_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch an event by id.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::EventNotFound`] if absent.
    pub async fn get_event(&self, event_id: &EventId) -> Result<Event> {
        match self.store.get(&keys::event_meta_key(event_id)).await? {
            Some(item) => from_item(item),
            None => Err(GuestlistError::EventNotFound {
                event_id: event_id.clone(),
            }),
        }
    }

    /// List all events as a finite snapshot, optionally filtered by status
    /// equality.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::Store`] on backend failure.
    pub async fn list_events(&self, status_filter: Option<&str>) -> Result<Vec<Event>> {
        let items = self.store.scan(keys::EVENT_META_SORT).await?;
        let mut events = Vec::with_capacity(items.len());
        for item in items {
            let event: Event = from_item(item)?;
            if status_filter.is_none_or(|status| event.status == status) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Merge a partial update into an event and bump `updatedAt`.
    ///
    /// Reducing `capacity` below the current registration count is accepted;
    /// existing registrations are untouched and only new registrations
    /// observe the reduced limit.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] if the patch is empty or sets a
    ///   zero capacity
    /// - [`GuestlistError::EventNotFound`] if absent
    pub async fn update_event(&self, event_id: &EventId, patch: EventPatch) -> Result<Event> {
        if patch.is_empty() {
            return Err(GuestlistError::invalid_input("no fields to update"));
        }
        if patch.capacity == Some(0) {
            return Err(GuestlistError::invalid_input("capacity must be positive"));
        }

        let mut changes: Item = to_item(&patch)?;
        let updated_at = serde_json::to_value(self.clock.now())
            .map_err(|err| GuestlistError::Store(StoreError::Backend(err.to_string())))?;
        changes.insert("updatedAt".to_string(), updated_at);

        match self
            .store
            .update(&keys::event_meta_key(event_id), changes)
            .await
        {
            Ok(item) => from_item(item),
            Err(StoreError::NotFound) => Err(GuestlistError::EventNotFound {
                event_id: event_id.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete an event record. Registrations are not cascade-deleted.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::EventNotFound`] if absent.
    pub async fn delete_event(&self, event_id: &EventId) -> Result<()> {
        if self.store.delete(&keys::event_meta_key(event_id)).await? {
            tracing::debug!(event_id = %event_id, "event deleted");
            Ok(())
        } else {
            Err(GuestlistError::EventNotFound {
                event_id: event_id.clone(),
            })
        }
    }

    /// Atomically add 1 to `currentRegistrations` and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::EventNotFound`] if the event is absent.
    pub async fn increment_registration_count(&self, event_id: &EventId) -> Result<u32> {
        self.adjust_count(event_id, 1, None).await
    }

    /// Atomically subtract 1 from `currentRegistrations`, floored at 0, and
    /// return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::EventNotFound`] if the event is absent.
    pub async fn decrement_registration_count(&self, event_id: &EventId) -> Result<u32> {
        self.adjust_count(event_id, -1, Some(0)).await
    }

    async fn adjust_count(
        &self,
        event_id: &EventId,
        delta: i64,
        floor: Option<i64>,
    ) -> Result<u32> {
        let new_value = match self
            .store
            .add(
                &keys::event_meta_key(event_id),
                CURRENT_REGISTRATIONS_ATTR,
                delta,
                floor,
            )
            .await
        {
            Ok(value) => value,
            Err(StoreError::NotFound) => {
                return Err(GuestlistError::EventNotFound {
                    event_id: event_id.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        u32::try_from(new_value).map_err(|_| {
            GuestlistError::inconsistency(format!(
                "registration counter for event {event_id} went negative ({new_value})"
            ))
        })
    }
}
