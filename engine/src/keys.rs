//! Single-table key scheme.
//!
//! All records live in one logical table addressed by `(partition, sort)`:
//!
//! | record                     | partition           | sort                       |
//! |----------------------------|---------------------|----------------------------|
//! | user profile               | `user#<userId>`     | `profile`                  |
//! | event metadata             | `event#<eventId>`   | `meta`                     |
//! | registration, primary      | `user#<userId>`     | `event#<eventId>`          |
//! | registration index (reg.)  | `event#<eventId>`   | `reg#<userId>`             |
//! | registration index (wait.) | `event#<eventId>`   | `wait#<token20>#<userId>`  |
//!
//! Waitlisted index entries embed the zero-padded ordering token in the
//! sort key, so "the first waitlisted entry" is a prefix range query with
//! limit 1 and FIFO order falls out of sort-key order. The user-id suffix
//! keeps keys unique even if two processes ever minted the same token.

use guestlist_core::store::ItemKey;
use guestlist_core::types::{EventId, OrderingToken, UserId};

/// Sort key of user profile records.
pub const USER_PROFILE_SORT: &str = "profile";

/// Sort key of event metadata records.
pub const EVENT_META_SORT: &str = "meta";

/// Sort-key prefix of primary registration records in a user partition.
pub const REGISTRATION_PRIMARY_PREFIX: &str = "event#";

/// Sort-key prefix of registered-status index records in an event partition.
pub const REGISTERED_INDEX_PREFIX: &str = "reg#";

/// Sort-key prefix of waitlisted-status index records in an event partition.
pub const WAITLIST_INDEX_PREFIX: &str = "wait#";

pub(crate) fn user_partition(user_id: &UserId) -> String {
    format!("user#{user_id}")
}

pub(crate) fn event_partition(event_id: &EventId) -> String {
    format!("event#{event_id}")
}

pub(crate) fn user_profile_key(user_id: &UserId) -> ItemKey {
    ItemKey::new(user_partition(user_id), USER_PROFILE_SORT)
}

pub(crate) fn event_meta_key(event_id: &EventId) -> ItemKey {
    ItemKey::new(event_partition(event_id), EVENT_META_SORT)
}

pub(crate) fn registration_primary_key(user_id: &UserId, event_id: &EventId) -> ItemKey {
    ItemKey::new(
        user_partition(user_id),
        format!("{REGISTRATION_PRIMARY_PREFIX}{event_id}"),
    )
}

pub(crate) fn registered_index_key(event_id: &EventId, user_id: &UserId) -> ItemKey {
    ItemKey::new(
        event_partition(event_id),
        format!("{REGISTERED_INDEX_PREFIX}{user_id}"),
    )
}

pub(crate) fn waitlist_index_key(
    event_id: &EventId,
    token: OrderingToken,
    user_id: &UserId,
) -> ItemKey {
    ItemKey::new(
        event_partition(event_id),
        format!("{WAITLIST_INDEX_PREFIX}{}#{user_id}", token.sortable()),
    )
}
