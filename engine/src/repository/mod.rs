//! Store-backed repositories.
//!
//! Each repository owns one record kind: [`users::UserRepository`] the user
//! profiles, [`events::EventRepository`] the event metadata (including the
//! `currentRegistrations` counter), and [`ledger::RegistrationLedger`] the
//! registration records and waitlist ordering. Domain values are serialized
//! to store items at this boundary; store-level failures are translated
//! into the [`GuestlistError`] taxonomy here and nowhere else.

pub mod events;
pub mod ledger;
pub mod users;

pub use events::EventRepository;
pub use ledger::RegistrationLedger;
pub use users::UserRepository;

use guestlist_core::error::GuestlistError;
use guestlist_core::store::{Item, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub(crate) fn to_item<T: Serialize>(value: &T) -> Result<Item, GuestlistError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GuestlistError::Store(StoreError::Backend(
            "serialized record is not an object".to_string(),
        ))),
        Err(err) => Err(GuestlistError::Store(StoreError::Backend(format!(
            "failed to serialize record: {err}"
        )))),
    }
}

pub(crate) fn from_item<T: DeserializeOwned>(item: Item) -> Result<T, GuestlistError> {
    serde_json::from_value(Value::Object(item)).map_err(|err| {
        GuestlistError::Store(StoreError::Backend(format!("malformed stored item: {err}")))
    })
}
