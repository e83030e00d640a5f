//! Diff sync of remote records into mirrored tables.
//!
//! Each table is synced in its own transaction: the stored ids are read, the
//! remote stream is consumed record by record under a [`Reconciler`], rows are
//! upserted as they arrive and stale rows are deleted at the end. A failure
//! anywhere rolls the table back to its state before the sync; tables synced
//! earlier keep their committed changes.

use crate::db::{rows, MirrorDatabase};
use crate::error::{MirrorError, Result};
use crate::strava::StravaError;
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};
use serde_json::Value;
use std::future::Future;
use strava_mirror_engine::{
    ReconcileStats, Reconciler, Step, SyncMode, ACTIVITY_TABLE, BIKE_TABLE,
};

/// A remote that delivers raw bike and activity records.
pub trait RecordSource {
    /// Every bike of the athlete.
    fn bikes(&self) -> impl Future<Output = std::result::Result<Vec<Value>, StravaError>>;

    /// Activities started before `before`, newest first.
    ///
    /// The stream is pulled lazily; dropping it must stop further fetching.
    fn activities(
        &self,
        before: DateTime<Utc>,
    ) -> impl Stream<Item = std::result::Result<Value, StravaError>> + '_;
}

/// Counters of a complete sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub bikes: ReconcileStats,
    pub activities: ReconcileStats,
}

/// Sync one table from a stream of raw records.
pub async fn sync_table<S, E>(
    db: &MirrorDatabase,
    table: &str,
    records: S,
    mode: SyncMode,
) -> Result<ReconcileStats>
where
    S: Stream<Item = std::result::Result<Value, E>>,
    MirrorError: From<E>,
{
    let spec = db.table(table)?;
    let mut tx = db.pool().begin().await?;

    let stored = rows::read_ids(&mut tx, spec).await?;
    let mut reconciler = Reconciler::new(stored, mode);

    let mut records = std::pin::pin!(records);
    while let Some(raw) = records.next().await {
        let row = spec.project(&raw?)?;
        let known = reconciler.is_stored(&row.id);

        match reconciler.observe(&row.id) {
            Step::Upsert => {
                tracing::debug!(
                    "{} {}: {}",
                    table,
                    row.id,
                    if known { "seen" } else { "new" }
                );
                rows::upsert_row(&mut tx, spec, &row).await?;
            }
            Step::Stop => {
                tracing::debug!("{}: recent history unchanged, stopping at {}", table, row.id);
                break;
            }
        }
    }

    let result = reconciler.finish();
    for id in &result.stale {
        tracing::debug!("{} {}: deleted", table, id);
    }
    rows::delete_rows(&mut tx, spec, &result.stale).await?;

    tx.commit().await?;

    tracing::info!("{} upsert stats: {}", table, result.stats);
    Ok(result.stats)
}

/// Sync bikes, always in full, then activities.
///
/// `full` selects full mode for activities; otherwise the activity sync stops
/// once recent history is confirmed unchanged.
pub async fn sync(
    db: &MirrorDatabase,
    source: &impl RecordSource,
    full: bool,
) -> Result<SyncReport> {
    let bikes = source.bikes().await?;
    let bikes = sync_table(
        db,
        BIKE_TABLE,
        stream::iter(bikes.into_iter().map(Ok::<_, StravaError>)),
        SyncMode::Full,
    )
    .await?;

    let activities = sync_table(
        db,
        ACTIVITY_TABLE,
        source.activities(Utc::now()),
        SyncMode::from_full_flag(full),
    )
    .await?;

    Ok(SyncReport { bikes, activities })
}
