//! Instrumented PostgreSQL source.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Transaction};

use scribe_intercept::{
    AttachError, DatabaseSource, ParamValue, QueryEvent, RequestId, SharedQueryListener, context,
};

use crate::error::{SqlxError, SqlxResult};
use crate::ledger::{LedgerEntry, TxnLedger};

struct SourceInner {
    name: String,
    pool: PgPool,
    listeners: RwLock<Vec<SharedQueryListener>>,
    ledger: TxnLedger<Transaction<'static, Postgres>>,
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

/// A named PostgreSQL connection pool whose executed statements are
/// reported to attached query listeners.
#[derive(Clone)]
pub struct PostgresSource {
    inner: Arc<SourceInner>,
}

impl PostgresSource {
    /// Connect a new pool under the given connection name.
    pub async fn connect(name: impl Into<String>, url: &str) -> SqlxResult<Self> {
        let pool = PgPoolOptions::new().connect(url).await?;
        Ok(Self::from_pool(name, pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(name: impl Into<String>, pool: PgPool) -> Self {
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
    pub fn pool(&self) -> &PgPool {
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
    pub async fn fetch_all(&self, sql: &str, params: &[ParamValue]) -> SqlxResult<Vec<PgRow>> {
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
    ) -> SqlxResult<Option<PgRow>> {
        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let row = query.fetch_optional(&self.inner.pool).await?;
        self.inner.emit(sql, params, started.elapsed());
        Ok(row)
    }

    /// Begin a transaction, parked in the ledger and tagged with the active
    /// request when there is one.
    pub async fn begin(&self) -> SqlxResult<PostgresTransaction> {
        let txn = self.inner.pool.begin().await?;
        let id = self.inner.ledger.insert(txn, context::current_id());
        Ok(PostgresTransaction {
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
impl DatabaseSource for PostgresSource {
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

/// Handle to a transaction begun on a [`PostgresSource`].
pub struct PostgresTransaction {
    id: u64,
    inner: Arc<SourceInner>,
}

impl PostgresTransaction {
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
    ) -> SqlxResult<Vec<PgRow>> {
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
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    param: &ParamValue,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    match param {
        ParamValue::Null => query.bind(None::<String>),
        ParamValue::Bool(value) => query.bind(*value),
        ParamValue::Int(value) => query.bind(*value),
        ParamValue::Float(value) => query.bind(*value),
        ParamValue::Text(value) => query.bind(value.clone()),
        ParamValue::Timestamp(value) => query.bind(value.clone()),
    }
}
