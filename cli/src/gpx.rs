//! GPX files of mirrored activities.
//!
//! Files live in one directory, named `{activity id}.gpx` or
//! `{activity id}.gpx.gz`. Activities found in a Strava bulk export are
//! hard-linked from it; the rest are downloaded from the website.

use crate::db::MirrorDatabase;
use crate::error::Result;
use crate::strava::StravaWeb;
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::SqlitePool;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Accepted file suffixes, in lookup order.
const SUFFIXES: [&str; 2] = [".gpx", ".gpx.gz"];

/// Counters of a GPX pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpxStats {
    pub linked: usize,
    pub downloaded: usize,
}

/// Find the GPX file stored for `id` in `dir`, with its suffix.
pub async fn find_gpx(dir: &Path, id: i64) -> Option<(PathBuf, &'static str)> {
    for suffix in SUFFIXES {
        let path = dir.join(format!("{}{}", id, suffix));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Some((path, suffix));
        }
    }
    None
}

/// Hard-link activities missing from `dir` out of a Strava bulk export.
///
/// The export names files either by activity id or by upload id.
pub async fn link_backup_activities(pool: &SqlitePool, dir: &Path, backup: &Path) -> Result<usize> {
    let activities: Vec<(i64, i64)> =
        sqlx::query_as("SELECT id, upload_id FROM activity WHERE upload_id IS NOT NULL")
            .fetch_all(pool)
            .await?;

    let mut linked = 0;
    for (id, upload_id) in activities {
        if find_gpx(dir, id).await.is_some() {
            continue;
        }

        let found = match find_gpx(backup, id).await {
            Some(found) => Some(found),
            None => find_gpx(backup, upload_id).await,
        };
        if let Some((source, suffix)) = found {
            let link = dir.join(format!("{}{}", id, suffix));
            tracing::debug!("Linking {} to {}", link.display(), source.display());
            tokio::fs::hard_link(&source, &link).await?;
            linked += 1;
        }
    }

    tracing::info!("Linked gpx for {} activities from backup", linked);
    Ok(linked)
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Download one activity as `{id}.gpx.gz`.
///
/// The file is written beside the target and renamed over it, so an
/// interrupted download never leaves a truncated file under the final name.
pub async fn download_gpx(web: &StravaWeb, id: i64, dir: &Path) -> Result<PathBuf> {
    let gpx = web.gpx(id).await?;

    let path = dir.join(format!("{}.gpx.gz", id));
    let tmp = dir.join(format!("{}.gpx.gz.tmp", id));
    tokio::fs::write(&tmp, gzip(&gpx)?).await?;
    tokio::fs::rename(&tmp, &path).await?;

    Ok(path)
}

/// Download every uploaded activity with location data missing from `dir`.
pub async fn download_activities(pool: &SqlitePool, web: &StravaWeb, dir: &Path) -> Result<usize> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM activity WHERE upload_id IS NOT NULL AND has_location_data",
    )
    .fetch_all(pool)
    .await?;

    let mut downloaded = 0;
    for id in ids {
        if find_gpx(dir, id).await.is_some() {
            continue;
        }

        tracing::debug!("Downloading gpx for activity {}", id);
        download_gpx(web, id, dir).await?;
        downloaded += 1;
    }

    tracing::info!("Downloaded gpx for {} new activities", downloaded);
    Ok(downloaded)
}

/// Fill `dir_activities`: link from the backup first, then download the rest.
pub async fn sync(
    db: &MirrorDatabase,
    web: &StravaWeb,
    dir_activities: &Path,
    dir_activities_backup: Option<&Path>,
) -> Result<GpxStats> {
    tokio::fs::create_dir_all(dir_activities).await?;

    let linked = match dir_activities_backup {
        Some(backup) => link_backup_activities(db.pool(), dir_activities, backup).await?,
        None => 0,
    };
    let downloaded = download_activities(db.pool(), web, dir_activities).await?;

    Ok(GpxStats { linked, downloaded })
}
