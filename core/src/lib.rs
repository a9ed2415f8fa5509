//! # Guestlist Core
//!
//! Shared foundation for the Guestlist registration engine:
//!
//! - [`types`]: users, events, registrations, the waitlist ordering token
//! - [`error`]: the failure taxonomy surfaced to callers
//! - [`environment`]: injected collaborators (the clock)
//! - [`store`]: the entity-store contract and its in-memory backend
//!
//! The registration core never shares in-process mutable state between
//! invocations; everything it coordinates goes through the
//! [`store::EntityStore`] conditional-write and atomic-counter primitives.

pub mod environment;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ErrorKind, GuestlistError, Result};
pub use types::{
    Event, EventDraft, EventId, EventPatch, OrderingToken, Registration, RegistrationStatus, User,
    UserId,
};
