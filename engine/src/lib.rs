//! # Strava Mirror Engine
//!
//! The pure core of a local mirror of Strava bikes and activities.
//!
//! This crate knows the shape of every mirrored table, how to flatten a raw
//! remote record into a row, how to reconcile a remote record stream against
//! the rows already stored, and when a stored schema must be rehydrated. It
//! performs no IO; the `strava-mirror` binary drives it against SQLite.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of files, network, or database
//! - **Raw snapshots**: Every row keeps the remote record it came from, so any
//!   later change of columns can be replayed without re-fetching
//! - **Strict projection**: A record missing a field is rejected, never stored
//!   as a partial row
//!
//! ## Core Concepts
//!
//! ### Table specs
//!
//! A [`TableSpec`] lists a table's columns (`id` first) and its projection
//! function. [`Schema::strava`] returns the shipped [`Bike`] and [`Activity`]
//! tables at [`SCHEMA_VERSION`].
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] walks a remote stream once:
//! - [`SyncMode::Full`] upserts everything and deletes stored rows the remote
//!   no longer reports
//! - [`SyncMode::Incremental`] stops once more than
//!   [`INCREMENTAL_SEEN_THRESHOLD`] known rows have been seen and never deletes
//!
//! ### Migration
//!
//! [`MigrationPlan`] compares the stored schema version with the compiled one.
//!
//! ## Quick Start
//!
//! ```rust
//! use strava_mirror_engine::{plan, RowId, Schema, SyncMode, BIKE_TABLE};
//! use serde_json::json;
//!
//! let schema = Schema::strava();
//! let bikes = schema.table(BIKE_TABLE).unwrap();
//!
//! let row = bikes.project(&json!({"id": "b2", "name": "Gravel"})).unwrap();
//! assert_eq!(row.id, RowId::from("b2"));
//!
//! let stored = vec![RowId::from("b1"), RowId::from("b2")];
//! let (upserts, result) = plan(stored, vec![row.id], SyncMode::Full);
//! assert_eq!(upserts, vec![RowId::from("b2")]);
//! assert_eq!(result.stale, vec![RowId::from("b1")]);
//! ```

pub mod error;
pub mod migration;
pub mod reconcile;
pub mod row;
pub mod schema;
pub mod tables;

// Re-export main types at crate root
pub use error::{Error, ProjectionError};
pub use migration::{aside_name, MigrationPlan, ASIDE_SUFFIX};
pub use reconcile::{
    plan, ReconcileResult, ReconcileStats, Reconciler, Step, SyncMode,
    INCREMENTAL_SEEN_THRESHOLD,
};
pub use row::{Row, RowId, Value};
pub use schema::{Column, ColumnType, Fields, ProjectFn, Schema, TableSpec, ID_COLUMN, RAW_COLUMN};
pub use tables::{Activity, Bike, ACTIVITY_TABLE, BIKE_TABLE, SCHEMA_VERSION};

/// Type aliases for clarity
pub type TableName = String;
pub type SchemaVersion = u32;
