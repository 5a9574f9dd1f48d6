//! # scribe-intercept
//!
//! Core of the Scribe request interceptor: one composite log line per HTTP
//! request, correlating timing, executed SQL, cache commands and
//! transaction-leak detection.
//!
//! The interceptor wraps the host framework's "call next handler"
//! continuation. While the handler runs, listeners attached to registered
//! data sources append formatted fragments to a request-scoped buffer; once
//! the response is produced the interceptor assembles the summary line,
//! POST dump, fragments, captured failure and leak report into a single
//! string and dispatches it to a pluggable log channel at `info` or `error`
//! severity.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use scribe_intercept::{
//!     InterceptConfig, MemoryChannel, RequestInfo, RequestInterceptor,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let channel = Arc::new(MemoryChannel::new());
//! let interceptor = RequestInterceptor::builder()
//!     .config(InterceptConfig::new().skip_path("/health"))
//!     .channel(channel.clone())
//!     .build();
//!
//! interceptor
//!     .intercept(RequestInfo::new("10.0.0.5", "GET", "/users/42"), || async {})
//!     .await
//!     .unwrap();
//!
//! let (_, line) = channel.last().unwrap();
//! assert!(line.starts_with("10.0.0.5 GET users/42 ["));
//! # }
//! ```
//!
//! Database and cache clients participate through the capability traits in
//! [`source`]; concrete integrations live in sibling crates
//! (`scribe-sqlx`, `scribe-axum`).

pub mod cache;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod fragment;
pub mod interceptor;
pub mod logging;
pub mod registry;
pub mod request;
pub mod sink;
pub mod source;
pub mod sql;

pub use cache::{MemoryCache, MemoryCacheConnection};
pub use config::{ExceptionConfig, HandlerAction, InterceptConfig, SkipRules};
pub use context::{RequestId, RequestScope};
pub use detector::{LEAK_MESSAGE, LeakReport};
pub use error::{AttachError, ConfigError, InterceptError, InterceptResult};
pub use fragment::{Fragment, FragmentKind};
pub use interceptor::{InterceptorBuilder, RequestInterceptor};
pub use request::{CapturedFailure, RequestInfo, ResponseInspect};
pub use sink::{
    ChannelRegistry, LogChannel, MemoryChannel, Severity, SharedChannel, TracingChannel,
};
pub use source::{
    CacheConnection, CacheSource, CommandArg, CommandEvent, CommandListener, DatabaseSource,
    FragmentListener, QueryEvent, QueryListener, SharedCommandListener, SharedQueryListener,
};
pub use sql::ParamValue;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::InterceptConfig;
    pub use crate::error::{InterceptError, InterceptResult};
    pub use crate::interceptor::RequestInterceptor;
    pub use crate::request::{CapturedFailure, RequestInfo, ResponseInspect};
    pub use crate::sink::{LogChannel, Severity};
    pub use crate::source::{CacheSource, DatabaseSource};
}
