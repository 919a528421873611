//! `PostgreSQL` store for the Seatline registration engine.
//!
//! Implements [`AdmissionStore`](seatline_core::store::AdmissionStore) and
//! [`RegistrationQuery`](seatline_core::store::RegistrationQuery) on sqlx:
//!
//! - Row locks via `SELECT ... FOR UPDATE` inside the caller's transaction
//! - Versioned counter writes; a moved version is a `WriteConflict`
//! - Serialization failures and deadlocks surface as `WriteConflict`
//! - Keyset listings on `(registered_at, id)` backed by a composite index
//!
//! # Example
//!
//! ```ignore
//! use seatline_postgres::PostgresRegistrationStore;
//! use seatline_runtime::AdmissionController;
//! use std::sync::Arc;
//!
//! let store = Arc::new(PostgresRegistrationStore::connect(&url, 10).await?);
//! store.migrate().await?;
//! let controller = AdmissionController::new(store, clock);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;

pub use store::PostgresRegistrationStore;
