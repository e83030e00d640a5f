//! Schema reconciliation on open.
//!
//! Brings a store to the compiled schema version. A stale store has every
//! table renamed aside, recreated from its current spec and refilled from the
//! raw snapshots of the aside table. Everything, including the version bump,
//! runs in one transaction.

use crate::db::rows;
use crate::error::{MirrorError, Result};
use sqlx::{SqliteConnection, SqlitePool};
use strava_mirror_engine::{aside_name, MigrationPlan, Schema};

/// Reconcile the store's schema version with `schema`.
pub async fn initialize(pool: &SqlitePool, schema: &Schema) -> Result<MigrationPlan> {
    let mut tx = pool.begin().await?;

    let stored = rows::read_schema_version(&mut tx).await?;
    let plan = MigrationPlan::new(stored, schema)?;

    match plan {
        MigrationPlan::UpToDate => {
            for table in &schema.tables {
                rows::create_table(&mut tx, table).await?;
            }
        }
        MigrationPlan::Stale { from, to } => {
            tracing::info!("Migrating schema from version {} to {}", from, to);
            migrate(&mut tx, schema)
                .await
                .map_err(|e| MirrorError::Migration {
                    from,
                    to,
                    source: Box::new(e),
                })?;
        }
    }

    tx.commit().await?;
    Ok(plan)
}

async fn migrate(conn: &mut SqliteConnection, schema: &Schema) -> Result<()> {
    let mut aside = Vec::new();
    for table in &schema.tables {
        if !rows::table_exists(conn, &table.name).await? {
            tracing::debug!("{}: no existing table, nothing to rehydrate", table.name);
            continue;
        }

        let old = aside_name(&table.name);
        rows::drop_table(conn, &old).await?;
        rows::rename_table(conn, &table.name, &old).await?;
        aside.push((table, old));
    }

    for table in &schema.tables {
        rows::create_table(conn, table).await?;
    }

    for (table, old) in aside {
        let snapshots = rows::read_raw_snapshots(conn, &old).await?;
        for raw in &snapshots {
            let row = table.project_snapshot(raw)?;
            rows::upsert_row(conn, table, &row).await?;
        }
        rows::drop_table(conn, &old).await?;

        tracing::info!("{}: rehydrated {} rows", table.name, snapshots.len());
    }

    rows::write_schema_version(conn, schema.version).await?;
    Ok(())
}
