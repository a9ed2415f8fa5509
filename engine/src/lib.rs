//! # Guestlist Engine
//!
//! The registration & capacity engine: users register for events subject to
//! a capacity limit; overflow is queued on an optional FIFO waitlist; a
//! freed slot promotes the waitlist head.
//!
//! The interesting machinery is the [`engine::RegistrationEngine`] state
//! machine and the [`repository::RegistrationLedger`] it drives. Capacity
//! is tracked as a cached counter on the event record, kept consistent with
//! the ledger exclusively through the store's atomic-counter and
//! conditional-write primitives — the engine holds no locks and no shared
//! in-memory state between invocations.
//!
//! # Example
//!
//! ```
//! use guestlist_core::environment::SystemClock;
//! use guestlist_core::store::MemoryStore;
//! use guestlist_core::types::{EventDraft, EventId, UserId};
//! use guestlist_engine::RegistrationEngine;
//! use std::sync::Arc;
//!
//! # async fn example() -> guestlist_core::Result<()> {
//! let engine = RegistrationEngine::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock));
//!
//! engine.users().create_user(UserId::new("u1"), "Alice").await?;
//! let event = engine
//!     .events()
//!     .create_event(EventDraft {
//!         event_id: Some(EventId::new("launch")),
//!         title: "Launch party".to_string(),
//!         description: String::new(),
//!         date: "2024-07-01".to_string(),
//!         location: "HQ".to_string(),
//!         organizer: "ops".to_string(),
//!         status: "active".to_string(),
//!         capacity: 100,
//!         waitlist_enabled: true,
//!     })
//!     .await?;
//!
//! let registration = engine.register(&UserId::new("u1"), &event.event_id).await?;
//! assert!(registration.is_registered());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod keys;
pub mod repository;
pub mod retry;
pub mod token;

pub use config::EngineConfig;
pub use engine::RegistrationEngine;
pub use repository::{EventRepository, RegistrationLedger, UserRepository};
pub use retry::RetryPolicy;
pub use token::TokenMint;
