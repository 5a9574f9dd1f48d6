//! # Scribe
//!
//! Per-request observability interceptor: one composite log line per HTTP
//! request, correlating timing, executed SQL, cache commands, captured
//! failures and transaction-leak detection.
//!
//! This meta-crate re-exports the workspace members:
//!
//! - [`intercept`] - the core interceptor, configuration, channels and
//!   collaborator traits (always available)
//! - [`sqlx`] - instrumented SQLx database sources (features `sqlite`,
//!   `postgres`)
//! - [`axum`] - the Tower layer for Axum applications (feature `axum`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use scribe_log::axum::ScribeLayer;
//! use scribe_log::intercept::{InterceptConfig, RequestInterceptor};
//! use scribe_log::sqlx::SqliteSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteSource::connect("default", "sqlite://app.db").await?;
//!     let interceptor = Arc::new(
//!         RequestInterceptor::builder()
//!             .config(InterceptConfig::new().skip_path("/health"))
//!             .database(Arc::new(db.clone()))
//!             .build(),
//!     );
//!
//!     let app: Router = Router::new()
//!         .route("/users/{id}", get(|| async { "ok" }))
//!         .layer(ScribeLayer::new(interceptor));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

/// Core interceptor, configuration, channels and collaborator traits.
pub mod intercept {
    pub use scribe_intercept::*;
}

/// Instrumented SQLx database sources.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sqlx {
    pub use scribe_sqlx::*;
}

/// Axum/Tower integration layer.
#[cfg(feature = "axum")]
pub mod axum {
    pub use scribe_axum::*;
}

// Re-export key types at the crate root
pub use scribe_intercept::{
    CapturedFailure, InterceptConfig, InterceptError, MemoryChannel, RequestInfo,
    RequestInterceptor, Severity,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use scribe_intercept::prelude::*;

    #[cfg(feature = "axum")]
    pub use scribe_axum::{FailureExt, ScribeLayer};
    #[cfg(feature = "postgres")]
    pub use scribe_sqlx::PostgresSource;
    #[cfg(feature = "sqlite")]
    pub use scribe_sqlx::SqliteSource;
}
