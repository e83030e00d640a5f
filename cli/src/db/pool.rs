//! The mirror database handle.

use crate::db::schema;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use strava_mirror_engine::{Schema, TableSpec};

/// Type alias for the database pool.
pub type Pool = SqlitePool;

/// An open mirror whose schema has been reconciled.
///
/// The store is a single file used by one process, so the pool holds exactly
/// one connection and every transaction is serialized on it.
#[derive(Debug, Clone)]
pub struct MirrorDatabase {
    pool: Pool,
    schema: Arc<Schema>,
}

impl MirrorDatabase {
    /// Open (creating if needed) the store at `path` and reconcile its schema.
    ///
    /// The handle is only returned once the schema matches `schema`; a failed
    /// reconciliation closes the connection and leaves the file at its
    /// previous version.
    pub async fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = create_pool(path).await?;

        if let Err(e) = schema::initialize(&pool, &schema).await {
            pool.close().await;
            return Err(e);
        }

        tracing::debug!("Opened mirror {} at schema version {}", path.display(), schema.version);

        Ok(Self {
            pool,
            schema: Arc::new(schema),
        })
    }

    /// Open the store, run `body` with it, and close it on every exit path.
    pub async fn scoped<F, Fut, T>(path: impl AsRef<Path>, schema: Schema, body: F) -> Result<T>
    where
        F: FnOnce(MirrorDatabase) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let db = Self::open(path, schema).await?;
        let pool = db.pool.clone();

        let result = body(db).await;
        pool.close().await;

        result
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The schema the store was reconciled with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get a table spec by name.
    pub fn table(&self, name: &str) -> Result<&TableSpec> {
        Ok(self.schema.table(name)?)
    }

    /// Close the connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Create a single-connection pool on the store file.
async fn create_pool(path: &Path) -> std::result::Result<Pool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use strava_mirror_engine::{BIKE_TABLE, SCHEMA_VERSION};

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("strava.sqlite");

        let db = MirrorDatabase::open(&path, Schema::strava()).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.schema().version, SCHEMA_VERSION);
        assert!(db.table(BIKE_TABLE).is_ok());
        assert!(matches!(
            db.table("gear"),
            Err(MirrorError::Engine(strava_mirror_engine::Error::UnknownTable(_)))
        ));
        db.close().await;
    }

    #[tokio::test]
    async fn scoped_closes_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strava.sqlite");

        let mut kept = None;
        let count = MirrorDatabase::scoped(&path, Schema::strava(), |db| {
            kept = Some(db.clone());
            async move {
                let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activity")
                    .fetch_one(db.pool())
                    .await?;
                Ok(count.0)
            }
        })
        .await
        .unwrap();

        assert_eq!(count, 0);
        assert!(kept.unwrap().pool().is_closed());
    }

    #[tokio::test]
    async fn scoped_closes_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strava.sqlite");

        let mut kept = None;
        let result: Result<()> = MirrorDatabase::scoped(&path, Schema::strava(), |db| {
            kept = Some(db.clone());
            async move {
                sqlx::query("SELECT * FROM no_such_table")
                    .execute(db.pool())
                    .await?;
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(MirrorError::Storage(_))));
        assert!(kept.unwrap().pool().is_closed());
    }

    #[tokio::test]
    async fn reopen_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strava.sqlite");

        MirrorDatabase::open(&path, Schema::strava())
            .await
            .unwrap()
            .close()
            .await;
        let db = MirrorDatabase::open(&path, Schema::strava()).await.unwrap();

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION as i64);
    }
}
