//! Statement execution against a connection or an in-flight transaction.

use sea_orm::sea_query::{InsertStatement, SelectStatement};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr, ExecResult,
    FromQueryResult, JsonValue, QueryResult, Statement, StatementBuilder, TransactionTrait,
};

use crate::error::ActionError;
use crate::record::Record;

/// Where statements run: the pool or an open transaction.
#[derive(Clone, Copy)]
pub enum Runner<'a> {
    Conn(&'a DatabaseConnection),
    Tx(&'a DatabaseTransaction),
}

fn into_record(row: &QueryResult) -> Result<Record, DbErr> {
    match JsonValue::from_query_result(row, "")? {
        JsonValue::Object(map) => Ok(map),
        _ => Ok(Record::new()),
    }
}

impl<'a> Runner<'a> {
    /// The caller's transaction when one was passed, the connection otherwise.
    pub fn new(conn: &'a DatabaseConnection, tx: Option<&'a DatabaseTransaction>) -> Self {
        tx.map_or(Self::Conn(conn), Self::Tx)
    }

    pub fn backend(self) -> DatabaseBackend {
        match self {
            Self::Conn(c) => c.get_database_backend(),
            Self::Tx(t) => t.get_database_backend(),
        }
    }

    pub fn supports_returning(self) -> bool {
        match self {
            Self::Conn(c) => c.support_returning(),
            Self::Tx(t) => t.support_returning(),
        }
    }

    fn build<S: StatementBuilder>(self, stmt: &S) -> Statement {
        let statement = self.backend().build(stmt);
        tracing::trace!(sql = %statement.sql, "statement");
        statement
    }

    async fn query_all(self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        match self {
            Self::Conn(c) => c.query_all(stmt).await,
            Self::Tx(t) => t.query_all(stmt).await,
        }
    }

    pub async fn fetch_all(self, stmt: &SelectStatement) -> Result<Vec<Record>, DbErr> {
        let rows = self.query_all(self.build(stmt)).await?;
        rows.iter().map(into_record).collect()
    }

    pub async fn fetch_one(self, stmt: &SelectStatement) -> Result<Option<Record>, DbErr> {
        let mut stmt = stmt.clone();
        stmt.limit(1);
        Ok(self.fetch_all(&stmt).await?.into_iter().next())
    }

    /// Value of the `total` column of a count query.
    pub async fn count(self, stmt: &SelectStatement) -> Result<u64, DbErr> {
        let rows = self.query_all(self.build(stmt)).await?;
        let total = match rows.first() {
            Some(row) => row.try_get::<i64>("", "total")?,
            None => 0,
        };
        Ok(u64::try_from(total).unwrap_or_default())
    }

    pub async fn execute<S: StatementBuilder>(self, stmt: &S) -> Result<ExecResult, DbErr> {
        let stmt = self.build(stmt);
        match self {
            Self::Conn(c) => c.execute(stmt).await,
            Self::Tx(t) => t.execute(stmt).await,
        }
    }

    /// Run an INSERT carrying a RETURNING clause and decode the returned rows.
    pub async fn insert_returning(self, stmt: &InsertStatement) -> Result<Vec<Record>, DbErr> {
        let rows = self.query_all(self.build(stmt)).await?;
        rows.iter().map(into_record).collect()
    }
}

/// Transaction boundary of one action.
///
/// When the caller passed a transaction the action joins it and leaves
/// commit and rollback to the caller.
pub enum TxScope<'a> {
    Owned(DatabaseTransaction),
    Joined(&'a DatabaseTransaction),
}

impl<'a> TxScope<'a> {
    pub async fn begin(
        conn: &DatabaseConnection,
        outer: Option<&'a DatabaseTransaction>,
    ) -> Result<Self, ActionError> {
        match outer {
            Some(tx) => Ok(Self::Joined(tx)),
            None => Ok(Self::Owned(conn.begin().await?)),
        }
    }

    pub fn runner(&self) -> Runner<'_> {
        match self {
            Self::Owned(tx) => Runner::Tx(tx),
            Self::Joined(tx) => Runner::Tx(*tx),
        }
    }

    /// Commit on success, roll back on failure; a joined scope does neither.
    pub async fn finish<T>(self, result: Result<T, ActionError>) -> Result<T, ActionError> {
        match (self, result) {
            (Self::Owned(tx), Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            (Self::Owned(tx), Err(err)) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
            (Self::Joined(_), result) => result,
        }
    }
}
