use sea_orm::sea_query::{
    self, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, QueryResult, SqlErr, Statement};

use vitrine_core::VitrineResult;

pub(crate) fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

pub(crate) fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_query::Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> VitrineResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    Ok(exec_db(conn, stmt).await?)
}

/// Like [`exec`] but keeps the driver error so constraint failures can be inspected.
pub(crate) async fn exec_db<C, S>(conn: &C, stmt: &S) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> VitrineResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> VitrineResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

/// Reads a `COUNT(*)`-style scalar aliased as `column`.
pub(crate) async fn query_count<C, S>(conn: &C, stmt: &S, column: &str) -> VitrineResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let Some(row) = query_one(conn, stmt).await? else {
        return Ok(0);
    };
    let count: i64 = row.try_get("", column)?;
    Ok(count.max(0) as u64)
}
