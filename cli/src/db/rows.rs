//! Row storage for mirrored tables.
//!
//! Every function runs on a caller-supplied connection, normally a
//! transaction, so a whole reconciliation or migration pass commits or rolls
//! back as one unit. Table and column names come from compiled-in table specs.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{Row as _, SqliteConnection};
use std::collections::HashSet;
use strava_mirror_engine::{ColumnType, Row, RowId, SchemaVersion, TableSpec, Value, RAW_COLUMN};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Integer(i) => query.bind(*i),
        Value::Real(r) => query.bind(*r),
        Value::Boolean(b) => query.bind(*b),
    }
}

fn bind_id<'q>(query: SqliteQuery<'q>, id: &'q RowId) -> SqliteQuery<'q> {
    match id {
        RowId::Integer(i) => query.bind(*i),
        RowId::Text(s) => query.bind(s.as_str()),
    }
}

/// Create a table with its declared columns plus the raw snapshot column.
///
/// Does nothing when the table already exists.
pub async fn create_table(conn: &mut SqliteConnection, spec: &TableSpec) -> Result<(), sqlx::Error> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        spec.name,
        spec.sql_columns()
    );
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

/// Insert a row, or replace the stored row with the same id wholesale.
pub async fn upsert_row(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    row: &Row,
) -> Result<(), sqlx::Error> {
    let columns = spec.column_names();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        spec.name,
        columns.join(", "),
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for value in &row.values {
        query = bind_value(query, value);
    }
    query.bind(row.raw.as_str()).execute(&mut *conn).await?;

    Ok(())
}

/// Delete rows by id. Unknown ids are ignored.
///
/// Returns the number of rows actually deleted.
pub async fn delete_rows(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    ids: &[RowId],
) -> Result<u64, sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = ?", spec.name);

    let mut deleted = 0;
    for id in ids {
        let result = bind_id(sqlx::query(&sql), id)
            .execute(&mut *conn)
            .await?;
        deleted += result.rows_affected();
    }

    Ok(deleted)
}

/// Read every id stored in a table.
pub async fn read_ids(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
) -> Result<HashSet<RowId>, sqlx::Error> {
    let sql = format!("SELECT id FROM {}", spec.name);
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

    rows.iter()
        .map(|row| match spec.id_column().column_type {
            ColumnType::Integer => row.try_get::<i64, _>(0).map(RowId::Integer),
            _ => row.try_get::<String, _>(0).map(RowId::Text),
        })
        .collect()
}

/// Read every raw snapshot stored in a table.
pub async fn read_raw_snapshots(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let sql = format!("SELECT {} FROM {}", RAW_COLUMN, table);
    sqlx::query_scalar::<_, String>(&sql)
        .fetch_all(&mut *conn)
        .await
}

/// Check if a table exists.
pub async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool, sqlx::Error> {
    let result: (bool,) = sqlx::query_as(
        r#"SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)"#,
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;

    Ok(result.0)
}

/// Rename a table.
pub async fn rename_table(
    conn: &mut SqliteConnection,
    from: &str,
    to: &str,
) -> Result<(), sqlx::Error> {
    let sql = format!("ALTER TABLE {} RENAME TO {}", from, to);
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

/// Drop a table if it exists.
pub async fn drop_table(conn: &mut SqliteConnection, table: &str) -> Result<(), sqlx::Error> {
    let sql = format!("DROP TABLE IF EXISTS {}", table);
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

/// Read the schema version persisted in the database header.
pub async fn read_schema_version(conn: &mut SqliteConnection) -> Result<SchemaVersion, sqlx::Error> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;

    SchemaVersion::try_from(version).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Persist the schema version in the database header.
pub async fn write_schema_version(
    conn: &mut SqliteConnection,
    version: SchemaVersion,
) -> Result<(), sqlx::Error> {
    let sql = format!("PRAGMA user_version = {}", version);
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}
