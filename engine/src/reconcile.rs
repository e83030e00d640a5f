//! Reconciliation of a remote record stream against stored rows.
//!
//! The [`Reconciler`] decides, record by record, whether an incoming row gets
//! upserted and when to stop consuming the stream. It does no IO: the caller
//! pulls records, projects them, asks [`Reconciler::observe`] what to do, and
//! finally applies the deletions returned by [`Reconciler::finish`].
//!
//! # Algorithm
//!
//! 1. Snapshot the ids currently stored for the table
//! 2. For each incoming row, in stream order:
//!    - a known id is removed from the snapshot and counted as seen; in
//!      incremental mode, once more than [`INCREMENTAL_SEEN_THRESHOLD`] known
//!      rows have been seen the stream is abandoned without upserting that row
//!    - an unknown id is counted as new
//!    - the row is upserted
//! 3. In full mode every id left in the snapshot is stale and gets deleted;
//!    incremental mode never deletes
//!
//! The incremental stop relies on the remote delivering records newest first.
//! Records backfilled out of recency order can be skipped; the seen counter is
//! cumulative and is not reset by new records in between.

use crate::RowId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of known records an incremental sync tolerates before stopping.
pub const INCREMENTAL_SEEN_THRESHOLD: u64 = 10;

/// How much of the remote stream a sync consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Consume everything and delete rows the remote no longer reports (default)
    #[default]
    Full,
    /// Stop once recent history is confirmed unchanged; never delete
    Incremental,
}

impl SyncMode {
    /// Full mode when `full` is set, incremental otherwise.
    pub fn from_full_flag(full: bool) -> Self {
        if full {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        }
    }
}

/// What to do with an observed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Upsert the row and keep consuming
    Upsert,
    /// Drop the row and stop consuming the stream
    Stop,
}

/// Counters reported after a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    /// Rows not stored before this pass
    pub new: u64,
    /// Rows already stored before this pass
    pub seen: u64,
    /// Stored rows no longer reported by the remote
    pub deleted: u64,
}

impl std::fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} new, {} seen, {} deleted",
            self.new, self.seen, self.deleted
        )
    }
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Ids to delete, sorted; always empty in incremental mode
    pub stale: Vec<RowId>,
    /// Whether the stream was abandoned early
    pub stopped_early: bool,
    /// Pass counters
    pub stats: ReconcileStats,
}

/// Decides which incoming rows to upsert and which stored rows are stale.
#[derive(Debug, Clone)]
pub struct Reconciler {
    mode: SyncMode,
    /// Stored ids not yet reported by the remote
    unseen: HashSet<RowId>,
    stats: ReconcileStats,
    stopped: bool,
}

impl Reconciler {
    /// Create a reconciler over the ids currently stored for a table.
    pub fn new(stored_ids: impl IntoIterator<Item = RowId>, mode: SyncMode) -> Self {
        Self {
            mode,
            unseen: stored_ids.into_iter().collect(),
            stats: ReconcileStats::default(),
            stopped: false,
        }
    }

    /// The mode this reconciler runs in.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Counters so far.
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Whether `id` is stored and has not been observed yet.
    pub fn is_stored(&self, id: &RowId) -> bool {
        self.unseen.contains(id)
    }

    /// Whether [`Step::Stop`] has been returned.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Observe the next row of the stream.
    ///
    /// Once this returns [`Step::Stop`] the caller must not upsert the row nor
    /// pull any further records; later calls keep returning `Stop`.
    pub fn observe(&mut self, id: &RowId) -> Step {
        if self.stopped {
            return Step::Stop;
        }

        if self.unseen.remove(id) {
            self.stats.seen += 1;
            if self.mode == SyncMode::Incremental && self.stats.seen > INCREMENTAL_SEEN_THRESHOLD {
                self.stopped = true;
                return Step::Stop;
            }
        } else {
            self.stats.new += 1;
        }

        Step::Upsert
    }

    /// Finish the pass and return the stored ids to delete.
    pub fn finish(self) -> ReconcileResult {
        let mut stale: Vec<RowId> = match self.mode {
            SyncMode::Full => self.unseen.into_iter().collect(),
            SyncMode::Incremental => Vec::new(),
        };
        stale.sort();

        let stats = ReconcileStats {
            deleted: stale.len() as u64,
            ..self.stats
        };

        ReconcileResult {
            stale,
            stopped_early: self.stopped,
            stats,
        }
    }
}

/// Run a whole pass over already-materialised ids.
///
/// Returns the ids to upsert, in stream order, and the reconciliation result.
pub fn plan(
    stored_ids: impl IntoIterator<Item = RowId>,
    incoming: impl IntoIterator<Item = RowId>,
    mode: SyncMode,
) -> (Vec<RowId>, ReconcileResult) {
    let mut reconciler = Reconciler::new(stored_ids, mode);
    let mut upserts = Vec::new();

    for id in incoming {
        match reconciler.observe(&id) {
            Step::Upsert => upserts.push(id),
            Step::Stop => break,
        }
    }

    (upserts, reconciler.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: impl IntoIterator<Item = i64>) -> Vec<RowId> {
        range.into_iter().map(RowId::Integer).collect()
    }

    fn text_ids(names: &[&str]) -> Vec<RowId> {
        names.iter().map(|n| RowId::from(*n)).collect()
    }

    #[test]
    fn full_sync_replaces_bike_set() {
        let stored = text_ids(&["b1", "b2", "b3"]);
        let incoming = text_ids(&["b2", "b3", "b4"]);

        let (upserts, result) = plan(stored, incoming, SyncMode::Full);

        assert_eq!(upserts, text_ids(&["b2", "b3", "b4"]));
        assert_eq!(result.stale, text_ids(&["b1"]));
        assert_eq!(
            result.stats,
            ReconcileStats {
                new: 1,
                seen: 2,
                deleted: 1
            }
        );
        assert!(!result.stopped_early);
    }

    #[test]
    fn full_sync_of_unchanged_set_deletes_nothing() {
        let (upserts, result) = plan(ids(1..=5), ids((1..=5).rev()), SyncMode::Full);

        assert_eq!(upserts.len(), 5);
        assert!(result.stale.is_empty());
        assert_eq!(result.stats.seen, 5);
        assert_eq!(result.stats.new, 0);
    }

    #[test]
    fn empty_stream_in_full_mode_deletes_everything() {
        let (upserts, result) = plan(ids(1..=3), ids([]), SyncMode::Full);

        assert!(upserts.is_empty());
        assert_eq!(result.stale, ids(1..=3));
    }

    #[test]
    fn incremental_stops_after_threshold_of_known_records() {
        // 12 stored, remote reports the same 12 newest first
        let (upserts, result) = plan(ids(1..=12), ids((1..=12).rev()), SyncMode::Incremental);

        assert_eq!(upserts, ids((3..=12).rev()));
        assert!(result.stopped_early);
        assert!(result.stale.is_empty());
        assert_eq!(result.stats.seen, 11);
        assert_eq!(result.stats.new, 0);
    }

    #[test]
    fn incremental_ingests_new_records_before_stopping() {
        // 3 new activities on top of 20 known ones
        let (upserts, result) = plan(ids(1..=20), ids((1..=23).rev()), SyncMode::Incremental);

        assert_eq!(upserts.len(), 3 + 10);
        assert_eq!(upserts[..3], ids([23, 22, 21])[..]);
        assert_eq!(result.stats.new, 3);
        assert!(result.stopped_early);
    }

    #[test]
    fn incremental_seen_counter_is_not_reset_by_new_records() {
        // known, new, known, new ... the counter still reaches the threshold
        let stored = ids((0..11).map(|i| i * 2));
        let incoming: Vec<_> = (0..11).flat_map(|i| [i * 2, 1000 + i]).map(RowId::Integer).collect();

        let (upserts, result) = plan(stored, incoming, SyncMode::Incremental);

        assert!(result.stopped_early);
        assert_eq!(result.stats.seen, 11);
        assert_eq!(result.stats.new, 10);
        assert_eq!(upserts.len(), 20);
    }

    #[test]
    fn incremental_without_enough_known_records_reads_everything() {
        let (upserts, result) = plan(ids(1..=10), ids((1..=15).rev()), SyncMode::Incremental);

        assert_eq!(upserts.len(), 15);
        assert!(!result.stopped_early);
        assert!(result.stale.is_empty());
    }

    #[test]
    fn incremental_never_deletes_missing_rows() {
        let (_, result) = plan(ids(1..=30), ids([]), SyncMode::Incremental);
        assert!(result.stale.is_empty());
        assert_eq!(result.stats.deleted, 0);
    }

    #[test]
    fn observe_after_stop_keeps_stopping() {
        let mut reconciler = Reconciler::new(ids(1..=11), SyncMode::Incremental);
        for id in ids(1..=10) {
            assert_eq!(reconciler.observe(&id), Step::Upsert);
        }
        assert_eq!(reconciler.observe(&RowId::Integer(11)), Step::Stop);
        assert!(reconciler.is_stopped());
        assert_eq!(reconciler.observe(&RowId::Integer(99)), Step::Stop);
        assert_eq!(reconciler.stats().new, 0);
    }

    #[test]
    fn is_stored_tracks_unobserved_ids() {
        let mut reconciler = Reconciler::new(ids([1, 2]), SyncMode::Full);
        assert!(reconciler.is_stored(&RowId::Integer(1)));
        assert!(!reconciler.is_stored(&RowId::Integer(3)));

        reconciler.observe(&RowId::Integer(1));
        assert!(!reconciler.is_stored(&RowId::Integer(1)));
    }

    #[test]
    fn duplicate_ids_in_stream_count_as_new_the_second_time() {
        let (upserts, result) = plan(ids([1]), ids([1, 1]), SyncMode::Full);
        assert_eq!(upserts.len(), 2);
        assert_eq!(result.stats.seen, 1);
        assert_eq!(result.stats.new, 1);
    }

    #[test]
    fn sync_mode_from_flag() {
        assert_eq!(SyncMode::from_full_flag(true), SyncMode::Full);
        assert_eq!(SyncMode::from_full_flag(false), SyncMode::Incremental);
        assert_eq!(SyncMode::default(), SyncMode::Full);
    }

    #[test]
    fn stats_display() {
        let stats = ReconcileStats {
            new: 2,
            seen: 11,
            deleted: 0,
        };
        assert_eq!(stats.to_string(), "2 new, 11 seen, 0 deleted");
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #[test]
            fn prop_full_sync_deletes_exactly_the_unreported(
                stored in proptest::collection::btree_set(0i64..200, 0..60),
                keep in proptest::collection::vec(any::<bool>(), 60),
            ) {
                let reported: Vec<i64> = stored
                    .iter()
                    .zip(keep.iter())
                    .filter(|(_, keep)| **keep)
                    .map(|(id, _)| *id)
                    .collect();

                let (upserts, result) = plan(ids(stored.iter().copied()), ids(reported.iter().copied()), SyncMode::Full);

                let expected_stale: BTreeSet<i64> = stored
                    .iter()
                    .copied()
                    .filter(|id| !reported.contains(id))
                    .collect();
                prop_assert_eq!(result.stale, ids(expected_stale));
                prop_assert_eq!(upserts, ids(reported));
            }

            #[test]
            fn prop_incremental_never_deletes(
                stored in proptest::collection::btree_set(0i64..100, 0..50),
                incoming in proptest::collection::vec(0i64..100, 0..80),
            ) {
                let (_, result) = plan(ids(stored), ids(incoming), SyncMode::Incremental);
                prop_assert!(result.stale.is_empty());
                prop_assert_eq!(result.stats.deleted, 0);
            }

            #[test]
            fn prop_incremental_bound(
                k in 0i64..=10,
                known in 10i64..200,
            ) {
                // newest first: k new ids, then `known` already stored ids
                let stored = ids(1..=known);
                let incoming = ids((1..=known + k).rev());

                let (upserts, result) = plan(stored, incoming, SyncMode::Incremental);

                prop_assert!(upserts.len() as i64 <= k + 10);
                prop_assert_eq!(result.stats.new as i64, k);
                prop_assert_eq!(result.stopped_early, known > 10);
            }

            #[test]
            fn prop_replay_is_idempotent(
                stored in proptest::collection::btree_set(0i64..100, 0..40),
            ) {
                let (_, first) = plan(ids(stored.iter().copied()), ids(stored.iter().copied()), SyncMode::Full);
                prop_assert!(first.stale.is_empty());
                prop_assert_eq!(first.stats.new, 0);
            }
        }
    }
}
