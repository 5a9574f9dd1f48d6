//! Data-source collaborator interfaces.
//!
//! The interceptor never probes for concrete client libraries. Instead,
//! database and cache clients are registered at startup behind the
//! capability traits in this module: a [`DatabaseSource`] can notify about
//! executed queries and roll back leaked transactions, a [`CacheSource`]
//! enumerates live connections which in turn accept command listeners.
//! Attachment is best-effort; a source that cannot attach simply goes
//! uncaptured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::{self, RequestId};
use crate::error::AttachError;
use crate::fragment::Fragment;
use crate::sql::{self, ParamValue};

/// Notification about one executed database query.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// Name of the connection the query ran on.
    pub connection: String,
    /// Parameterized SQL text.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<ParamValue>,
    /// Execution duration.
    pub duration: Duration,
}

/// Notification about one executed cache command.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    /// Name of the connection the command ran on.
    pub connection: String,
    /// Command name, e.g. `GET`.
    pub command: String,
    /// Command arguments.
    pub args: Vec<CommandArg>,
    /// Execution duration.
    pub duration: Duration,
}

/// One cache-command argument; list-valued arguments are flattened to a
/// comma-joined string when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    /// A scalar argument.
    Value(String),
    /// A list argument.
    List(Vec<String>),
}

impl CommandArg {
    /// Flatten the argument to the string that appears in the log line.
    pub fn render(&self) -> String {
        match self {
            Self::Value(value) => value.clone(),
            Self::List(values) => values.join(", "),
        }
    }
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<Vec<String>> for CommandArg {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// Render a command argument list as it appears inside the parentheses of a
/// cache fragment: each argument single-quoted, arguments comma-separated.
pub fn render_args(args: &[CommandArg]) -> String {
    args.iter()
        .map(|arg| format!("'{}'", arg.render()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Receiver for executed-query notifications.
pub trait QueryListener: Send + Sync {
    /// Called after a query completed successfully.
    fn query_executed(&self, event: &QueryEvent);
}

/// Receiver for executed-command notifications.
pub trait CommandListener: Send + Sync {
    /// Called after a cache command completed.
    fn command_executed(&self, event: &CommandEvent);
}

/// A query listener shared with data sources.
pub type SharedQueryListener = Arc<dyn QueryListener>;

/// A command listener shared with cache connections.
pub type SharedCommandListener = Arc<dyn CommandListener>;

/// A database client the interceptor can observe.
#[async_trait]
pub trait DatabaseSource: Send + Sync {
    /// Connection name used in log fragments and registry keys.
    fn name(&self) -> &str;

    /// Attach a listener notified about every executed query.
    ///
    /// Called at most once per process for a given source; failures degrade
    /// capture for this source and are never surfaced to the request.
    fn attach(&self, listener: SharedQueryListener) -> Result<(), AttachError>;

    /// Force-roll-back transactions opened within `scope` that are still
    /// active, returning one connection name per rolled-back transaction.
    async fn rollback_leaked(&self, scope: RequestId) -> Vec<String>;
}

/// A cache client whose connections the interceptor can observe.
///
/// Connections may be created lazily by the application; the interceptor
/// re-enumerates them at the end of every request and instruments the ones
/// it has not seen before.
pub trait CacheSource: Send + Sync {
    /// Source name used in registry keys.
    fn name(&self) -> &str;

    /// Currently known live connections.
    fn connections(&self) -> Vec<Arc<dyn CacheConnection>>;
}

/// One live connection of a [`CacheSource`].
pub trait CacheConnection: Send + Sync {
    /// Connection name used in log fragments and registry keys.
    fn name(&self) -> &str;

    /// Attach a listener notified about every executed command.
    fn listen(&self, listener: SharedCommandListener) -> Result<(), AttachError>;
}

/// The listener the interceptor attaches everywhere: turns events into
/// fragments on the active request's buffer.
///
/// Appends are a no-op when no request scope is active on the current task,
/// so operations performed outside an instrumented request are simply not
/// captured.
#[derive(Debug, Default)]
pub struct FragmentListener;

impl FragmentListener {
    /// Create the listener.
    pub fn new() -> Self {
        Self
    }
}

impl QueryListener for FragmentListener {
    fn query_executed(&self, event: &QueryEvent) {
        if sql::is_self_check(&event.sql) {
            return;
        }
        let statement = sql::interpolate(event.sql.trim(), &event.params);
        context::append(Fragment::sql(&event.connection, &statement, event.duration));
    }
}

impl CommandListener for FragmentListener {
    fn command_executed(&self, event: &CommandEvent) {
        context::append(Fragment::cache_command(
            &event.connection,
            &event.command,
            &render_args(&event.args),
            event.duration,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestScope;

    #[test]
    fn test_render_args_flattens_lists() {
        let args = vec![
            CommandArg::from("user:1"),
            CommandArg::List(vec!["a".into(), "b".into()]),
        ];
        assert_eq!(render_args(&args), "'user:1', 'a, b'");
    }

    #[tokio::test]
    async fn test_fragment_listener_formats_queries() {
        let listener = FragmentListener::new();
        let scope = RequestScope::new();
        scope
            .enter(async {
                listener.query_executed(&QueryEvent {
                    connection: "default".into(),
                    sql: "SELECT * FROM users WHERE id = ?".into(),
                    params: vec![ParamValue::Int(42)],
                    duration: Duration::from_millis(1),
                });
            })
            .await;

        let fragments = scope.drain();
        assert_eq!(fragments.len(), 1);
        assert_eq!(
            fragments[0].to_string(),
            "[SQL] [connection:default] SELECT * FROM users WHERE id = 42 [1.00000ms]"
        );
    }

    #[tokio::test]
    async fn test_fragment_listener_suppresses_self_check() {
        let listener = FragmentListener::new();
        let scope = RequestScope::new();
        scope
            .enter(async {
                listener.query_executed(&QueryEvent {
                    connection: "default".into(),
                    sql: "SELECT 1".into(),
                    params: Vec::new(),
                    duration: Duration::from_micros(10),
                });
            })
            .await;
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn test_fragment_listener_formats_commands() {
        let listener = FragmentListener::new();
        let scope = RequestScope::new();
        scope
            .enter(async {
                listener.command_executed(&CommandEvent {
                    connection: "sessions".into(),
                    command: "DEL".into(),
                    args: vec![CommandArg::List(vec!["k1".into(), "k2".into()])],
                    duration: Duration::from_micros(250),
                });
            })
            .await;

        let fragments = scope.drain();
        assert_eq!(
            fragments[0].to_string(),
            "[CACHE] [connection:sessions] DEL('k1, k2') (0.25000ms)"
        );
    }
}
