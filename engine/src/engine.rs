//! The registration state machine.
//!
//! Legal transitions for a `(user, event)` pair:
//!
//! ```text
//! ABSENT ──register──▶ REGISTERED          (capacity available)
//! ABSENT ──register──▶ WAITLISTED          (full, waitlist enabled)
//! WAITLISTED ──promotion──▶ REGISTERED     (an unregister freed a slot)
//! REGISTERED ──unregister──▶ ABSENT
//! WAITLISTED ──unregister──▶ ABSENT
//! ```
//!
//! Demotion (`REGISTERED → WAITLISTED`) never occurs as a caller-visible
//! transition; the only status rollback is the internal compensation for a
//! lost capacity race, which happens before the register call returns.
//!
//! Concurrency: the duplicate-registration race is closed by the ledger's
//! conditional create; the capacity race is closed by re-checking the
//! counter *after* the atomic increment and compensating when the slot
//! turned out to be taken. Promotion reserves the freed slot (increment,
//! re-check) before flipping the head entry's status, so a promotion can
//! never push the counter past capacity either.

use crate::config::EngineConfig;
use crate::repository::{EventRepository, RegistrationLedger, UserRepository};
use crate::retry::retry_with_backoff;
use crate::token::TokenMint;
use guestlist_core::environment::Clock;
use guestlist_core::error::{GuestlistError, Result};
use guestlist_core::store::EntityStore;
use guestlist_core::types::{Event, EventId, Registration, UserId};
use std::sync::Arc;

/// How many times `first_waitlisted` is re-queried after a promotion guard
/// failure before the inconsistency is reported.
const PROMOTION_REQUERIES: usize = 1;

/// Orchestrates registration and unregistration across the user repository,
/// event repository and registration ledger.
pub struct RegistrationEngine<S> {
    users: UserRepository<S>,
    events: EventRepository<S>,
    ledger: RegistrationLedger<S>,
    clock: Arc<dyn Clock>,
    tokens: TokenMint,
    config: EngineConfig,
}

impl<S: EntityStore> RegistrationEngine<S> {
    /// Create an engine over the given store and clock with default
    /// configuration.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, clock, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            users: UserRepository::new(Arc::clone(&store), Arc::clone(&clock)),
            events: EventRepository::new(Arc::clone(&store), Arc::clone(&clock)),
            ledger: RegistrationLedger::new(store),
            clock,
            tokens: TokenMint::new(),
            config,
        }
    }

    /// The user repository, for user CRUD.
    #[must_use]
    pub const fn users(&self) -> &UserRepository<S> {
        &self.users
    }

    /// The event repository, for event CRUD.
    #[must_use]
    pub const fn events(&self) -> &EventRepository<S> {
        &self.events
    }

    /// The registration ledger. Read access for callers; mutations should
    /// go through [`register`](Self::register) and
    /// [`unregister`](Self::unregister).
    #[must_use]
    pub const fn ledger(&self) -> &RegistrationLedger<S> {
        &self.ledger
    }

    /// Register a user for an event.
    ///
    /// Outcome is a `registered` entry while capacity lasts, a `waitlisted`
    /// entry when the event is full and its waitlist is enabled, and a
    /// `CapacityExceeded` failure otherwise.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] on blank ids
    /// - [`GuestlistError::UserNotFound`] / [`GuestlistError::EventNotFound`]
    ///   (user checked first)
    /// - [`GuestlistError::AlreadyRegistered`] if the pair already has a
    ///   registration in any status
    /// - [`GuestlistError::CapacityExceeded`] if full with no waitlist
    /// - [`GuestlistError::StoreInconsistency`] if the counter could not be
    ///   reconciled after retries
    pub async fn register(&self, user_id: &UserId, event_id: &EventId) -> Result<Registration> {
        validate_pair(user_id, event_id)?;

        if !self.users.user_exists(user_id).await? {
            return Err(GuestlistError::UserNotFound {
                user_id: user_id.clone(),
            });
        }
        let event = self.events.get_event(event_id).await?;

        // Advisory fast path; the ledger's conditional create below is the
        // authoritative duplicate check.
        if self.ledger.get_registration(user_id, event_id).await?.is_some() {
            return Err(GuestlistError::AlreadyRegistered {
                user_id: user_id.clone(),
                event_id: event_id.clone(),
            });
        }

        let now = self.clock.now();
        if event.has_capacity() {
            return self.register_with_slot(user_id, event_id, &event, now).await;
        }
        if event.waitlist_enabled {
            let token = self.tokens.next(now);
            let registration = self
                .ledger
                .create_waitlist_entry(user_id, event_id, now, token)
                .await?;
            tracing::info!(user_id = %user_id, event_id = %event_id, token = %token, "user waitlisted");
            return Ok(registration);
        }
        Err(GuestlistError::CapacityExceeded {
            event_id: event_id.clone(),
        })
    }

    /// Capacity looked available: create the entry, claim the slot, and
    /// compensate if the post-increment count proves the race was lost.
    async fn register_with_slot(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        event: &Event,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Registration> {
        let registration = self
            .ledger
            .create_registered_entry(user_id, event_id, now)
            .await?;

        let count = self.increment_counter(event_id).await?;
        if count <= event.capacity {
            tracing::info!(user_id = %user_id, event_id = %event_id, count, "user registered");
            return Ok(registration);
        }

        // Lost the capacity race: another registration claimed the last
        // slot between our read and our increment. Give the slot back.
        tracing::warn!(
            user_id = %user_id,
            event_id = %event_id,
            count,
            capacity = event.capacity,
            "capacity race lost, compensating"
        );
        self.decrement_counter(event_id).await?;

        if event.waitlist_enabled {
            let token = self.tokens.next(self.clock.now());
            let waitlisted = self
                .ledger
                .move_to_waitlist(user_id, event_id, token)
                .await?;
            tracing::info!(user_id = %user_id, event_id = %event_id, token = %token, "user moved to waitlist after capacity race");
            return Ok(waitlisted);
        }

        self.ledger.remove_entry(user_id, event_id).await?;
        Err(GuestlistError::CapacityExceeded {
            event_id: event_id.clone(),
        })
    }

    /// Unregister a user from an event.
    ///
    /// Removing a `registered` entry frees a slot and promotes the earliest
    /// waitlisted user, if any; removing a `waitlisted` entry touches
    /// neither the counter nor the waitlist.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] on blank ids
    /// - [`GuestlistError::RegistrationNotFound`] if the pair has no
    ///   registration
    /// - [`GuestlistError::StoreInconsistency`] if the counter or a
    ///   promotion could not be reconciled after retries
    pub async fn unregister(&self, user_id: &UserId, event_id: &EventId) -> Result<()> {
        validate_pair(user_id, event_id)?;

        let removed = self.ledger.remove_entry(user_id, event_id).await?;
        tracing::info!(
            user_id = %user_id,
            event_id = %event_id,
            status = %removed.status,
            "registration removed"
        );

        if removed.is_registered() {
            // The entry is already gone, so failures past this point are
            // retried and then reported, never swallowed.
            self.decrement_counter(event_id).await?;
            self.promote_next(event_id).await?;
        }
        Ok(())
    }

    /// Promote at most one waitlisted entry into the slot a just-removed
    /// registration freed.
    ///
    /// The slot is reserved first (atomic increment plus capacity
    /// re-check); only then is the head entry's status flipped under its
    /// conditional guard. A guard failure means a concurrent unregister
    /// promoted the same head, so the reservation is released and the
    /// waitlist re-queried once.
    async fn promote_next(&self, event_id: &EventId) -> Result<()> {
        let event = self.events.get_event(event_id).await?;

        for attempt in 0..=PROMOTION_REQUERIES {
            let Some(head) = self.ledger.first_waitlisted(event_id).await? else {
                return Ok(());
            };

            let count = self.increment_counter(event_id).await?;
            if count > event.capacity {
                // A concurrent register claimed the freed slot first; the
                // head keeps its place in the queue.
                self.decrement_counter(event_id).await?;
                tracing::info!(event_id = %event_id, "freed slot reclaimed by a concurrent registration, promotion skipped");
                return Ok(());
            }

            match self.ledger.promote_entry(&head.user_id, event_id).await? {
                Some(promoted) => {
                    tracing::info!(
                        user_id = %promoted.user_id,
                        event_id = %event_id,
                        count,
                        "waitlisted user promoted"
                    );
                    return Ok(());
                }
                None => {
                    // Concurrent promotion or removal of the same head.
                    self.decrement_counter(event_id).await?;
                    tracing::warn!(
                        user_id = %head.user_id,
                        event_id = %event_id,
                        attempt,
                        "promotion guard failed, re-querying waitlist"
                    );
                }
            }
        }

        Err(GuestlistError::inconsistency(format!(
            "waitlist promotion for event {event_id} unresolved after re-query"
        )))
    }

    /// Full event records for every event the user is `registered` for.
    ///
    /// Waitlisted registrations are excluded by contract. An unknown user
    /// yields an empty list; events deleted out from under a registration
    /// are skipped.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] on a blank id
    /// - [`GuestlistError::Store`] on backend failure
    pub async fn get_user_events(&self, user_id: &UserId) -> Result<Vec<Event>> {
        if user_id.is_blank() {
            return Err(GuestlistError::invalid_input("userId must not be empty"));
        }

        let registrations = self.ledger.list_by_user(user_id).await?;
        let mut events = Vec::new();
        for registration in registrations
            .iter()
            .filter(|registration| registration.is_registered())
        {
            match self.events.get_event(&registration.event_id).await {
                Ok(event) => events.push(event),
                Err(GuestlistError::EventNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(events)
    }

    /// All registrations for a user, both statuses.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] on a blank id
    /// - [`GuestlistError::Store`] on backend failure
    pub async fn get_user_registrations(&self, user_id: &UserId) -> Result<Vec<Registration>> {
        if user_id.is_blank() {
            return Err(GuestlistError::invalid_input("userId must not be empty"));
        }
        self.ledger.list_by_user(user_id).await
    }

    /// All registrations for an event, both statuses; registered entries
    /// first, then the waitlist in promotion order.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] on a blank id
    /// - [`GuestlistError::Store`] on backend failure
    pub async fn get_event_registrations(&self, event_id: &EventId) -> Result<Vec<Registration>> {
        if event_id.is_blank() {
            return Err(GuestlistError::invalid_input("eventId must not be empty"));
        }
        self.ledger.list_by_event(event_id).await
    }

    async fn increment_counter(&self, event_id: &EventId) -> Result<u32> {
        retry_with_backoff(&self.config.counter_retry, || {
            self.events.increment_registration_count(event_id)
        })
        .await
        .map_err(|err| counter_inconsistency(event_id, "increment", &err))
    }

    async fn decrement_counter(&self, event_id: &EventId) -> Result<u32> {
        retry_with_backoff(&self.config.counter_retry, || {
            self.events.decrement_registration_count(event_id)
        })
        .await
        .map_err(|err| counter_inconsistency(event_id, "decrement", &err))
    }
}

fn counter_inconsistency(
    event_id: &EventId,
    operation: &str,
    err: &GuestlistError,
) -> GuestlistError {
    GuestlistError::inconsistency(format!(
        "registration counter {operation} for event {event_id} failed after retries: {err}"
    ))
}

fn validate_pair(user_id: &UserId, event_id: &EventId) -> Result<()> {
    if user_id.is_blank() {
        return Err(GuestlistError::invalid_input("userId must not be empty"));
    }
    if event_id.is_blank() {
        return Err(GuestlistError::invalid_input("eventId must not be empty"));
    }
    Ok(())
}
