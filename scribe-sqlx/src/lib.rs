//! # scribe-sqlx
//!
//! SQLx-backed database collaborators for the Scribe request interceptor.
//!
//! Each source wraps a SQLx pool under a connection name and implements
//! `scribe_intercept::DatabaseSource`: statements executed through the
//! source are reported to attached query listeners, and transactions begun
//! through it are tracked so the interceptor's leak detector can find and
//! roll back whatever a request left open.
//!
//! Backends are feature-gated: `sqlite` (default) and `postgres`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scribe_intercept::RequestInterceptor;
//! use scribe_sqlx::SqliteSource;
//!
//! let source = SqliteSource::connect("default", "sqlite://app.db").await?;
//! let interceptor = RequestInterceptor::builder()
//!     .database(Arc::new(source.clone()))
//!     .build();
//! ```

pub mod error;
pub mod ledger;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::{SqlxError, SqlxResult};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresSource, PostgresTransaction};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteSource, SqliteTransaction};
