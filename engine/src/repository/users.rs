//! User repository.

use super::{from_item, to_item};
use crate::keys;
use guestlist_core::environment::Clock;
use guestlist_core::error::{GuestlistError, Result};
use guestlist_core::store::{EntityStore, StoreError};
use guestlist_core::types::{User, UserId};
use std::sync::Arc;

/// CRUD over user records.
pub struct UserRepository<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: EntityStore> UserRepository<S> {
    /// Create a repository over the given store.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a user.
    ///
    /// The write is a conditional check-and-create against the store, never
    /// a read followed by a write, so concurrent creates for the same id
    /// cannot both succeed.
    ///
    /// # Errors
    ///
    /// - [`GuestlistError::InvalidInput`] if `user_id` or `name` is empty or
    ///   whitespace-only
    /// - [`GuestlistError::UserAlreadyExists`] if the id is taken
    pub async fn create_user(&self, user_id: UserId, name: impl Into<String>) -> Result<User> {
        let name = name.into();
        if user_id.is_blank() {
            return Err(GuestlistError::invalid_input("userId must not be empty"));
        }
        if name.trim().is_empty() {
            return Err(GuestlistError::invalid_input("name must not be empty"));
        }

        let user = User {
            user_id: user_id.clone(),
            name,
            created_at: self.clock.now(),
        };

        match self
            .store
            .create(&keys::user_profile_key(&user_id), to_item(&user)?)
            .await
        {
            Ok(()) => {
                tracing::debug!(user_id = %user_id, "user created");
                Ok(user)
            }
            Err(StoreError::ConditionFailed) => Err(GuestlistError::UserAlreadyExists { user_id }),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::UserNotFound`] if absent.
    pub async fn get_user(&self, user_id: &UserId) -> Result<User> {
        match self.store.get(&keys::user_profile_key(user_id)).await? {
            Some(item) => from_item(item),
            None => Err(GuestlistError::UserNotFound {
                user_id: user_id.clone(),
            }),
        }
    }

    /// Non-failing existence check, used to validate foreign keys.
    ///
    /// # Errors
    ///
    /// Returns [`GuestlistError::Store`] only on backend failure.
    pub async fn user_exists(&self, user_id: &UserId) -> Result<bool> {
        Ok(self
            .store
            .get(&keys::user_profile_key(user_id))
            .await?
            .is_some())
    }
}
