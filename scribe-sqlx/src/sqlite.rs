//! Instrumented SQLite source.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Sqlite, Transaction};

use scribe_intercept::{
    AttachError, DatabaseSource, ParamValue, QueryEvent, RequestId, SharedQueryListener, context,
};

use crate::error::{SqlxError, SqlxResult};
use crate::ledger::{LedgerEntry, TxnLedger};

struct SourceInner {
    name: String,
    pool: SqlitePool,
    listeners: RwLock<Vec<SharedQueryListener>>,
    ledger: TxnLedger<Transaction<'static, Sqlite>>,
}

impl SourceInner {
    fn emit(&self, sql: &str, params: &[ParamValue], duration: Duration) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        let event = QueryEvent {
            connection: self.name.clone(),
            sql: sql.to_string(),
            params: params.to_vec(),
            duration,
        };
        for listener in listeners {
            listener.query_executed(&event);
        }
    }
}

/// A named SQLite connection pool whose executed statements are reported to
/// attached query listeners.
///
/// # Example
///
/// ```rust,ignore
/// use scribe_sqlx::SqliteSource;
///
/// let source = SqliteSource::connect("default", "sqlite::memory:").await?;
/// source.execute("INSERT INTO users (name) VALUES (?)", &["alice".into()]).await?;
/// ```
#[derive(Clone)]
pub struct SqliteSource {
    inner: Arc<SourceInner>,
}

impl SqliteSource {
    /// Connect a new pool under the given connection name.
    pub async fn connect(name: impl Into<String>, url: &str) -> SqlxResult<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        Ok(Self::from_pool(name, pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(name: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                name: name.into(),
                pool,
                listeners: RwLock::new(Vec::new()),
                ledger: TxnLedger::new(),
            }),
        }
    }

    /// The connection name used in log fragments.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Execute a statement, returning the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[ParamValue]) -> SqlxResult<u64> {
        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let result = query.execute(&self.inner.pool).await?;
        self.inner.emit(sql, params, started.elapsed());
        Ok(result.rows_affected())
    }

    /// Fetch all rows of a query.
    pub async fn fetch_all(&self, sql: &str, params: &[ParamValue]) -> SqlxResult<Vec<SqliteRow>> {
        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = query.fetch_all(&self.inner.pool).await?;
        self.inner.emit(sql, params, started.elapsed());
        Ok(rows)
    }

    /// Fetch at most one row of a query.
    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> SqlxResult<Option<SqliteRow>> {
        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let row = query.fetch_optional(&self.inner.pool).await?;
        self.inner.emit(sql, params, started.elapsed());
        Ok(row)
    }

    /// Begin a transaction.
    ///
    /// The transaction is parked in the source's ledger, tagged with the
    /// active request when there is one; a transaction still parked when
    /// its request ends is rolled back by the leak detector.
    pub async fn begin(&self) -> SqlxResult<SqliteTransaction> {
        let txn = self.inner.pool.begin().await?;
        let id = self.inner.ledger.insert(txn, context::current_id());
        Ok(SqliteTransaction {
            id,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of transactions currently open on this source.
    pub fn open_transactions(&self) -> usize {
        self.inner.ledger.open_count()
    }
}

#[async_trait]
impl DatabaseSource for SqliteSource {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn attach(&self, listener: SharedQueryListener) -> Result<(), AttachError> {
        self.inner.listeners.write().push(listener);
        Ok(())
    }

    async fn rollback_leaked(&self, scope: RequestId) -> Vec<String> {
        let mut names = Vec::new();
        for txn in self.inner.ledger.drain_scope(scope) {
            if let Err(error) = txn.rollback().await {
                tracing::debug!(
                    target: "scribe::sqlx",
                    source = %self.inner.name,
                    %error,
                    "rollback of leaked transaction failed"
                );
            }
            names.push(self.inner.name.clone());
        }
        names
    }
}

/// Handle to a transaction begun on a [`SqliteSource`].
///
/// Statements run through the handle are reported to listeners like pool
/// statements. Dropping the handle without committing leaves the
/// transaction open; the leak detector will find and roll it back at the
/// end of the owning request.
pub struct SqliteTransaction {
    id: u64,
    inner: Arc<SourceInner>,
}

impl SqliteTransaction {
    /// Execute a statement inside the transaction.
    pub async fn execute(&mut self, sql: &str, params: &[ParamValue]) -> SqlxResult<u64> {
        let LedgerEntry { mut txn, scope } = self
            .inner
            .ledger
            .take(self.id)
            .ok_or(SqlxError::TransactionClosed)?;

        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let result = query.execute(&mut *txn).await;
        self.inner.ledger.restore(self.id, LedgerEntry { txn, scope });

        let affected = result?.rows_affected();
        self.inner.emit(sql, params, started.elapsed());
        Ok(affected)
    }

    /// Fetch all rows of a query inside the transaction.
    pub async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> SqlxResult<Vec<SqliteRow>> {
        let LedgerEntry { mut txn, scope } = self
            .inner
            .ledger
            .take(self.id)
            .ok_or(SqlxError::TransactionClosed)?;

        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let result = query.fetch_all(&mut *txn).await;
        self.inner.ledger.restore(self.id, LedgerEntry { txn, scope });

        let rows = result?;
        self.inner.emit(sql, params, started.elapsed());
        Ok(rows)
    }

    /// Commit the transaction.
    pub async fn commit(self) -> SqlxResult<()> {
        let entry = self
            .inner
            .ledger
            .take(self.id)
            .ok_or(SqlxError::TransactionClosed)?;
        entry.txn.commit().await?;
        Ok(())
    }

    /// Roll the transaction back.
    pub async fn rollback(self) -> SqlxResult<()> {
        let entry = self
            .inner
            .ledger
            .take(self.id)
            .ok_or(SqlxError::TransactionClosed)?;
        entry.txn.rollback().await?;
        Ok(())
    }

    /// Whether the transaction is still open.
    pub fn is_open(&self) -> bool {
        self.inner.ledger.contains(self.id)
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    param: &ParamValue,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match param {
        ParamValue::Null => query.bind(None::<String>),
        ParamValue::Bool(value) => query.bind(*value),
        ParamValue::Int(value) => query.bind(*value),
        ParamValue::Float(value) => query.bind(*value),
        ParamValue::Text(value) => query.bind(value.clone()),
        ParamValue::Timestamp(value) => query.bind(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use scribe_intercept::{QueryListener, RequestScope};
    use sqlx::Row;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<QueryEvent>>,
    }

    impl QueryListener for Recorder {
        fn query_executed(&self, event: &QueryEvent) {
            self.events.lock().push(event.clone());
        }
    }

    async fn source_with_table() -> SqliteSource {
        // A single connection so every statement sees the same in-memory
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let source = SqliteSource::from_pool("default", pool);
        source
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
                &[],
            )
            .await
            .unwrap();
        source
    }

    #[tokio::test]
    async fn test_pool_statements_notify_listeners() {
        let source = source_with_table().await;
        let recorder = Arc::new(Recorder::default());
        DatabaseSource::attach(&source, recorder.clone()).unwrap();

        source
            .execute(
                "INSERT INTO users (name) VALUES (?)",
                &[ParamValue::Text("alice".into())],
            )
            .await
            .unwrap();

        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].connection, "default");
        assert_eq!(events[0].sql, "INSERT INTO users (name) VALUES (?)");
        assert_eq!(events[0].params, vec![ParamValue::Text("alice".into())]);
    }

    #[tokio::test]
    async fn test_fetch_round_trip() {
        let source = source_with_table().await;
        source
            .execute(
                "INSERT INTO users (name) VALUES (?)",
                &[ParamValue::Text("bob".into())],
            )
            .await
            .unwrap();

        let row = source
            .fetch_optional(
                "SELECT name FROM users WHERE name = ?",
                &[ParamValue::Text("bob".into())],
            )
            .await
            .unwrap()
            .unwrap();
        let name: String = row.get("name");
        assert_eq!(name, "bob");

        let rows = source.fetch_all("SELECT id, name FROM users", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_committed_transaction_is_not_leaked() {
        let source = source_with_table().await;
        let scope = RequestScope::new();

        let source_for_request = source.clone();
        scope
            .enter(async move {
                let mut txn = source_for_request.begin().await.unwrap();
                txn.execute(
                    "INSERT INTO users (name) VALUES (?)",
                    &[ParamValue::Text("carol".into())],
                )
                .await
                .unwrap();
                txn.commit().await.unwrap();
            })
            .await;

        assert_eq!(source.open_transactions(), 0);
        assert!(
            DatabaseSource::rollback_leaked(&source, scope.id())
                .await
                .is_empty()
        );

        let rows = source.fetch_all("SELECT id FROM users", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_leaked_transaction_is_rolled_back() {
        let source = source_with_table().await;
        let scope = RequestScope::new();

        let source_for_request = source.clone();
        scope
            .enter(async move {
                let mut txn = source_for_request.begin().await.unwrap();
                txn.execute(
                    "INSERT INTO users (name) VALUES (?)",
                    &[ParamValue::Text("dave".into())],
                )
                .await
                .unwrap();
                // Handle dropped without commit: the transaction stays open.
                drop(txn);
            })
            .await;
        assert_eq!(source.open_transactions(), 1);

        let rolled_back = DatabaseSource::rollback_leaked(&source, scope.id()).await;
        assert_eq!(rolled_back, vec!["default".to_string()]);
        assert_eq!(source.open_transactions(), 0);

        let rows = source.fetch_all("SELECT id FROM users", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_force_rolled_back_handle_reports_closed() {
        let source = source_with_table().await;
        let scope = RequestScope::new();

        let source_for_request = source.clone();
        let txn = scope
            .enter(async move { source_for_request.begin().await.unwrap() })
            .await;
        assert!(txn.is_open());

        DatabaseSource::rollback_leaked(&source, scope.id()).await;
        assert!(!txn.is_open());
        assert!(matches!(
            txn.commit().await,
            Err(SqlxError::TransactionClosed)
        ));
    }

    #[tokio::test]
    async fn test_transaction_outside_request_is_untouched() {
        let source = source_with_table().await;
        let txn = source.begin().await.unwrap();

        let unrelated = RequestScope::new();
        assert!(
            DatabaseSource::rollback_leaked(&source, unrelated.id())
                .await
                .is_empty()
        );
        assert!(txn.is_open());
        txn.rollback().await.unwrap();
    }
}
