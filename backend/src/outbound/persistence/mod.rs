//! PostgreSQL persistence adapter using Diesel ORM.
//!
//! Provides the [`EntityStore`](crate::domain::ports::EntityStore)
//! implementation backed by PostgreSQL through `diesel-async` and `bb8`
//! connection pooling.
//!
//! - **Thin adapter**: only translates between rows and domain types.
//! - **Internal models**: row structs (`models.rs`) and the schema
//!   (`schema.rs`) never leave this module.
//! - **Typed errors**: database failures map to
//!   [`EntityStoreError`](crate::domain::ports::EntityStoreError).
//!
//! # Example
//!
//! ```ignore
//! use nearby_backend::outbound::persistence::{DbPool, DieselEntityStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/nearby")).await?;
//! let store = DieselEntityStore::new(pool);
//! ```

mod diesel_entity_store;
pub(crate) mod diesel_helpers;
mod models;
mod pool;
mod schema;

pub use diesel_entity_store::DieselEntityStore;
pub use pool::{DbPool, PoolConfig, PoolError};
