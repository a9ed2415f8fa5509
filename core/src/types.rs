//! Domain types for the Guestlist registration engine.
//!
//! This module contains the identifiers, entities and value objects shared
//! across the workspace: users, events, registrations and the waitlist
//! ordering token. Serialized attribute names are camelCase to match the
//! entity-store item layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a user.
///
/// Caller-supplied, immutable, and never empty once validated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a `UserId` from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty or whitespace-only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Unique identifier for an event.
///
/// Caller-supplied or generated at creation time; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create an `EventId` from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty or whitespace-only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Waitlist ordering
// ============================================================================

/// Strictly increasing ordering value assigned to waitlist entries.
///
/// Tokens fix the FIFO promotion order: the waitlisted registration with the
/// smallest token is promoted first. The fixed-width rendering from
/// [`OrderingToken::sortable`] makes lexicographic sort-key order equal to
/// numeric token order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderingToken(u64);

impl OrderingToken {
    /// Wrap a raw token value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw token value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Zero-padded fixed-width rendering for use inside sort keys.
    #[must_use]
    pub fn sortable(&self) -> String {
        format!("{:020}", self.0)
    }
}

impl fmt::Display for OrderingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A user who can register for events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Caller-supplied identity key.
    pub user_id: UserId,
    /// Display name, non-empty.
    pub name: String,
    /// Set once at creation; never mutated.
    pub created_at: DateTime<Utc>,
}

/// An event users can register for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Identity key, caller-supplied or generated.
    pub event_id: EventId,
    /// Event title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Scheduled date, as supplied by the caller.
    pub date: String,
    /// Venue or address.
    pub location: String,
    /// Organizer name.
    pub organizer: String,
    /// Descriptive lifecycle status (e.g. "active", "cancelled"); not
    /// interpreted by the registration logic.
    pub status: String,
    /// Maximum number of `registered` (not waitlisted) users. Always > 0.
    pub capacity: u32,
    /// Whether overflow is queued on the waitlist instead of rejected.
    pub waitlist_enabled: bool,
    /// Cached count of `registered`-status registrations. Maintained
    /// exclusively by the registration engine through atomic counter
    /// updates; must equal the ledger's count of registered entries.
    pub current_registrations: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Whether the event currently has a free registered slot.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.current_registrations < self.capacity
    }
}

/// Fields for creating an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    /// Optional caller-supplied identity key; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Event title, non-empty.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Scheduled date.
    pub date: String,
    /// Venue or address.
    pub location: String,
    /// Organizer name.
    pub organizer: String,
    /// Descriptive lifecycle status.
    pub status: String,
    /// Maximum registered users, must be > 0.
    pub capacity: u32,
    /// Whether overflow is waitlisted.
    #[serde(default)]
    pub waitlist_enabled: bool,
}

/// Partial update for an event. `None` fields are left untouched.
///
/// `current_registrations` and `created_at` are deliberately absent: the
/// counter is owned by the registration engine and the creation timestamp is
/// immutable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// New location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// New organizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// New capacity. Reducing capacity below the current registration count
    /// is accepted; only new registrations observe the reduced limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// New waitlist setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waitlist_enabled: Option<bool>,
}

impl EventPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.date.is_none()
            && self.location.is_none()
            && self.organizer.is_none()
            && self.status.is_none()
            && self.capacity.is_none()
            && self.waitlist_enabled.is_none()
    }
}

// ============================================================================
// Registrations
// ============================================================================

/// Status of a registration. A single enum field; a user is never both
/// registered and waitlisted for the same event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Holds one of the event's capacity slots.
    Registered,
    /// Queued for promotion, ordered by [`OrderingToken`].
    Waitlisted,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Waitlisted => write!(f, "waitlisted"),
        }
    }
}

/// The record linking one user to one event, unique per pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// The registered or waitlisted user.
    pub user_id: UserId,
    /// The event.
    pub event_id: EventId,
    /// Current status.
    #[serde(rename = "registrationStatus")]
    pub status: RegistrationStatus,
    /// Set once when the record is created (whether registered or
    /// waitlisted); promotion does not reset it.
    pub registered_at: DateTime<Utc>,
    /// Waitlist ordering token. Present iff `status` is `Waitlisted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waitlist_token: Option<OrderingToken>,
}

impl Registration {
    /// Whether this registration holds a capacity slot.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self.status, RegistrationStatus::Registered)
    }

    /// Whether this registration is queued on the waitlist.
    #[must_use]
    pub const fn is_waitlisted(&self) -> bool {
        matches!(self.status, RegistrationStatus::Waitlisted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ordering_token_sortable_is_lexicographically_ordered() {
        let small = OrderingToken::new(9);
        let large = OrderingToken::new(10);
        assert!(small.sortable() < large.sortable());
        assert_eq!(small.sortable().len(), large.sortable().len());
    }

    #[test]
    fn registration_status_serializes_lowercase() {
        let json = serde_json::to_string(&RegistrationStatus::Waitlisted).unwrap();
        assert_eq!(json, "\"waitlisted\"");
    }

    #[test]
    fn registration_uses_original_attribute_names() {
        let registration = Registration {
            user_id: UserId::new("u1"),
            event_id: EventId::new("e1"),
            status: RegistrationStatus::Registered,
            registered_at: Utc::now(),
            waitlist_token: None,
        };
        let value = serde_json::to_value(&registration).unwrap();
        assert!(value.get("registrationStatus").is_some());
        assert!(value.get("registeredAt").is_some());
        assert!(value.get("waitlistToken").is_none());
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(EventPatch::default().is_empty());
        let patch = EventPatch {
            capacity: Some(5),
            ..EventPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(UserId::new("  ").is_blank());
        assert!(EventId::new("").is_blank());
        assert!(!UserId::new("u1").is_blank());
    }
}
