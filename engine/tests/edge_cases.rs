//! Edge case tests for strava-mirror-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use serde_json::json;
use strava_mirror_engine::{
    plan, Activity, Bike, Error, ProjectionError, RowId, Schema, SyncMode, Value, ACTIVITY_TABLE,
    BIKE_TABLE,
};

fn activity(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "upload_id": null,
        "name": "Evening Run",
        "start_date": "2020-12-31T18:00:00Z",
        "moving_time": 1800,
        "elapsed_time": 1850,
        "distance": 5000,
        "total_elevation_gain": 0,
        "gear_id": null,
        "type": "Run",
        "commute": true,
        "start_latlng": null,
    })
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_bike_name() {
    let schema = Schema::strava();
    let row = schema
        .table(BIKE_TABLE)
        .unwrap()
        .project(&json!({"id": "b1", "name": ""}))
        .unwrap();

    assert_eq!(row.values[1], Value::from(""));
}

#[test]
fn unicode_names_survive_raw_snapshot() {
    let schema = Schema::strava();
    let bikes = schema.table(BIKE_TABLE).unwrap();

    let names = vec![
        "日本語テスト",
        "Привет мир",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "quote \" and backslash \\",
    ];

    for (i, name) in names.iter().enumerate() {
        let row = bikes
            .project(&json!({"id": format!("b{}", i), "name": name}))
            .unwrap();
        let replayed = bikes.project_snapshot(&row.raw).unwrap();

        assert_eq!(replayed, row, "Failed for: {}", name);
        assert_eq!(replayed.values[1], Value::from(*name));
    }
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn activity_id_boundaries() {
    let schema = Schema::strava();
    let activities = schema.table(ACTIVITY_TABLE).unwrap();

    for id in [0i64, 1, i64::MAX, 12_345_678_901] {
        let row = activities.project(&activity(id)).unwrap();
        assert_eq!(row.id, RowId::Integer(id));
    }
}

#[test]
fn activity_id_beyond_i64_is_rejected() {
    let mut raw = activity(1);
    raw["id"] = json!(u64::MAX);

    assert!(matches!(
        Activity::from_raw(&raw),
        Err(ProjectionError::TypeMismatch { field, .. }) if field == "id"
    ));
}

#[test]
fn fractional_moving_time_is_rejected() {
    let mut raw = activity(1);
    raw["moving_time"] = json!(12.5);

    assert!(matches!(
        Activity::from_raw(&raw),
        Err(ProjectionError::TypeMismatch { field, got, .. }) if field == "moving_time" && got == "Real"
    ));
}

#[test]
fn integer_distance_is_stored_as_real() {
    let activity = Activity::from_raw(&activity(1)).unwrap();
    assert_eq!(activity.distance, 5000.0);
    assert_eq!(activity.total_elevation_gain, 0.0);
}

// ============================================================================
// Raw Snapshot Edge Cases
// ============================================================================

#[test]
fn deeply_nested_extra_fields_are_kept() {
    let mut nested = json!({"value": "leaf"});
    for _ in 0..50 {
        nested = json!({"nested": nested});
    }

    let mut raw = activity(7);
    raw["map"] = nested;

    let schema = Schema::strava();
    let row = schema.table(ACTIVITY_TABLE).unwrap().project(&raw).unwrap();

    assert_eq!(row.raw_json().unwrap(), raw);
}

#[test]
fn full_precision_reals_survive_snapshot_replay() {
    let spec = Schema::strava();
    let spec = spec.table(ACTIVITY_TABLE).unwrap();

    for distance in [
        "4022449.1830056002",
        "0.30000000000000004",
        "12345.678901234567",
        "9007199254740993.5",
        "1.7976931348623157e308",
    ] {
        let body = activity(11)
            .to_string()
            .replace("\"distance\":5000", &format!("\"distance\":{}", distance));
        let raw: serde_json::Value = serde_json::from_str(&body).unwrap();

        let synced = spec.project(&raw).unwrap();
        let replayed = spec.project_snapshot(&synced.raw).unwrap();

        assert_eq!(synced.values, replayed.values, "distance {}", distance);
        assert_eq!(
            synced.values[6],
            Value::Real(distance.parse::<f64>().unwrap()),
            "distance {}",
            distance
        );
    }
}

#[test]
fn snapshot_that_is_not_an_object_fails() {
    let schema = Schema::strava();
    let result = schema.table(BIKE_TABLE).unwrap().project_snapshot("[1, 2, 3]");

    assert!(matches!(
        result,
        Err(Error::Projection {
            source: ProjectionError::NotAnObject,
            ..
        })
    ));
}

#[test]
fn bike_with_null_name_fails() {
    assert_eq!(
        Bike::from_raw(&json!({"id": "b1", "name": null})),
        Err(ProjectionError::NullField("name".into()))
    );
}

// ============================================================================
// Reconciliation Edge Cases
// ============================================================================

#[test]
fn reconcile_into_empty_store() {
    let incoming: Vec<RowId> = (1..=25).rev().map(RowId::Integer).collect();

    for mode in [SyncMode::Full, SyncMode::Incremental] {
        let (upserts, result) = plan(Vec::new(), incoming.clone(), mode);
        assert_eq!(upserts.len(), 25);
        assert_eq!(result.stats.new, 25);
        assert!(result.stale.is_empty());
        assert!(!result.stopped_early);
    }
}

#[test]
fn mixed_id_kinds_do_not_collide() {
    let stored = vec![RowId::Integer(1), RowId::from("1")];
    let (_, result) = plan(stored, vec![RowId::Integer(1)], SyncMode::Full);

    assert_eq!(result.stale, vec![RowId::from("1")]);
}

#[test]
fn large_full_sync() {
    let stored: Vec<RowId> = (0..10_000).map(RowId::Integer).collect();
    let incoming: Vec<RowId> = (5_000..15_000).rev().map(RowId::Integer).collect();

    let (upserts, result) = plan(stored, incoming, SyncMode::Full);

    assert_eq!(upserts.len(), 10_000);
    assert_eq!(result.stats.new, 5_000);
    assert_eq!(result.stats.seen, 5_000);
    assert_eq!(result.stale.len(), 5_000);
    assert_eq!(result.stale.first(), Some(&RowId::Integer(0)));
    assert_eq!(result.stale.last(), Some(&RowId::Integer(4_999)));
}
