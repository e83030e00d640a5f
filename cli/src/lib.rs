//! Strava Mirror - keeps a local SQLite copy of Strava bikes and activities.
//!
//! Remote records are stored as typed columns plus their raw JSON snapshot.
//! The snapshot lets a newer schema rebuild every table locally, without
//! downloading anything again.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gpx;
pub mod reports;
pub mod strava;
pub mod sync;

pub use db::MirrorDatabase;
pub use error::{MirrorError, Result};
pub use strava::{StravaClient, StravaError, StravaWeb};
pub use sync::{sync, sync_table, RecordSource, SyncReport};
