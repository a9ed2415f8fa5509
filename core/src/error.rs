//! Error taxonomy for registration operations.

use crate::store::StoreError;
use crate::types::{EventId, UserId};
use thiserror::Error;

/// Result type alias for registration operations.
pub type Result<T> = std::result::Result<T, GuestlistError>;

/// Coarse error category, the contract the HTTP layer maps onto status
/// codes: missing resource, conflict, bad request, or internal failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced user, event or registration is absent.
    NotFound,
    /// Duplicate identity, duplicate registration, or exhausted capacity.
    Conflict,
    /// The caller supplied an empty or malformed field.
    InvalidInput,
    /// Backend failure or an unresolved invariant guard.
    Internal,
}

/// Failure modes of the registration engine and its repositories.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GuestlistError {
    // ═══════════════════════════════════════════════════════════
    // Missing resources
    // ═══════════════════════════════════════════════════════════

    /// Referenced user does not exist.
    #[error("User {user_id} not found")]
    UserNotFound {
        /// The missing user.
        user_id: UserId,
    },

    /// Referenced event does not exist.
    #[error("Event {event_id} not found")]
    EventNotFound {
        /// The missing event.
        event_id: EventId,
    },

    /// No registration exists for the user/event pair.
    #[error("Registration for user {user_id} and event {event_id} not found")]
    RegistrationNotFound {
        /// The user half of the pair.
        user_id: UserId,
        /// The event half of the pair.
        event_id: EventId,
    },

    // ═══════════════════════════════════════════════════════════
    // Conflicts
    // ═══════════════════════════════════════════════════════════

    /// A user with this identity key already exists.
    #[error("User {user_id} already exists")]
    UserAlreadyExists {
        /// The duplicate identity.
        user_id: UserId,
    },

    /// An event with this identity key already exists.
    #[error("Event {event_id} already exists")]
    EventAlreadyExists {
        /// The duplicate identity.
        event_id: EventId,
    },

    /// The user already has a registration for this event, in any status.
    #[error("User {user_id} is already registered for event {event_id}")]
    AlreadyRegistered {
        /// The user.
        user_id: UserId,
        /// The event.
        event_id: EventId,
    },

    /// The event is full and the waitlist is disabled or not applicable.
    #[error("Event {event_id} is at full capacity and the waitlist is not enabled")]
    CapacityExceeded {
        /// The full event.
        event_id: EventId,
    },

    // ═══════════════════════════════════════════════════════════
    // Caller mistakes
    // ═══════════════════════════════════════════════════════════

    /// An empty or malformed required field.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input.
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // System failures
    // ═══════════════════════════════════════════════════════════

    /// An invariant-guarding conditional operation failed unexpectedly
    /// after retry. The caller-visible state may need reconciliation.
    #[error("Store inconsistency: {detail}")]
    StoreInconsistency {
        /// Which invariant could not be restored.
        detail: String,
    },

    /// The entity store reported a backend failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl GuestlistError {
    /// Shorthand for [`GuestlistError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`GuestlistError::StoreInconsistency`].
    #[must_use]
    pub fn inconsistency(detail: impl Into<String>) -> Self {
        Self::StoreInconsistency {
            detail: detail.into(),
        }
    }

    /// The coarse category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound { .. }
            | Self::EventNotFound { .. }
            | Self::RegistrationNotFound { .. } => ErrorKind::NotFound,
            Self::UserAlreadyExists { .. }
            | Self::EventAlreadyExists { .. }
            | Self::AlreadyRegistered { .. }
            | Self::CapacityExceeded { .. } => ErrorKind::Conflict,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::StoreInconsistency { .. } | Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` for missing-resource errors.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound)
    }

    /// Returns `true` for duplicate/capacity conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict)
    }
}
