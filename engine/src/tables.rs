//! The tables mirrored from Strava.

use crate::error::ProjectionError;
use crate::schema::{Column, ColumnType, Fields, Schema, TableSpec};
use crate::{SchemaVersion, Value};
use serde::{Deserialize, Serialize};

/// Version of the shipped schema. Bump whenever a table below changes.
pub const SCHEMA_VERSION: SchemaVersion = 1;

/// Name of the bike table.
pub const BIKE_TABLE: &str = "bike";

/// Name of the activity table.
pub const ACTIVITY_TABLE: &str = "activity";

/// A bike from the athlete's gear list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bike {
    pub id: String,
    pub name: String,
}

impl Bike {
    /// Parse a summary gear record.
    pub fn from_raw(raw: &serde_json::Value) -> Result<Self, ProjectionError> {
        let fields = Fields::new(raw)?;
        Ok(Self {
            id: fields.text("id")?,
            name: fields.text("name")?,
        })
    }

    /// Column values in table order.
    pub fn into_values(self) -> Vec<Value> {
        vec![self.id.into(), self.name.into()]
    }

    /// Table spec for bikes.
    pub fn table() -> TableSpec {
        TableSpec::new(
            BIKE_TABLE,
            ColumnType::Text,
            vec![Column::required("name", ColumnType::Text)],
            project_bike,
        )
    }
}

/// A summary activity from the athlete's activity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    /// Null for manually entered activities
    pub upload_id: Option<i64>,
    pub name: String,
    /// ISO 8601 UTC timestamp, as delivered
    pub start_date: String,
    /// Seconds
    pub moving_time: i64,
    /// Seconds
    pub elapsed_time: i64,
    /// Meters
    pub distance: f64,
    /// Meters
    pub total_elevation_gain: f64,
    pub gear_id: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub commute: bool,
    pub has_location_data: bool,
}

impl Activity {
    /// Parse a summary activity record.
    pub fn from_raw(raw: &serde_json::Value) -> Result<Self, ProjectionError> {
        let fields = Fields::new(raw)?;
        let has_location_data = fields
            .get("start_latlng")?
            .as_array()
            .is_some_and(|latlng| !latlng.is_empty());

        Ok(Self {
            id: fields.integer("id")?,
            upload_id: fields.opt_integer("upload_id")?,
            name: fields.text("name")?,
            start_date: fields.text("start_date")?,
            moving_time: fields.integer("moving_time")?,
            elapsed_time: fields.integer("elapsed_time")?,
            distance: fields.real("distance")?,
            total_elevation_gain: fields.real("total_elevation_gain")?,
            gear_id: fields.opt_text("gear_id")?,
            activity_type: fields.text("type")?,
            commute: fields.boolean("commute")?,
            has_location_data,
        })
    }

    /// Column values in table order.
    pub fn into_values(self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.upload_id.into(),
            self.name.into(),
            self.start_date.into(),
            self.moving_time.into(),
            self.elapsed_time.into(),
            self.distance.into(),
            self.total_elevation_gain.into(),
            self.gear_id.into(),
            self.activity_type.into(),
            self.commute.into(),
            self.has_location_data.into(),
        ]
    }

    /// Table spec for activities.
    pub fn table() -> TableSpec {
        TableSpec::new(
            ACTIVITY_TABLE,
            ColumnType::Integer,
            vec![
                Column::nullable("upload_id", ColumnType::Integer),
                Column::required("name", ColumnType::Text),
                Column::required("start_date", ColumnType::Text),
                Column::required("moving_time", ColumnType::Integer),
                Column::required("elapsed_time", ColumnType::Integer),
                Column::required("distance", ColumnType::Real),
                Column::required("total_elevation_gain", ColumnType::Real),
                Column::nullable("gear_id", ColumnType::Text),
                Column::required("type", ColumnType::Text),
                Column::required("commute", ColumnType::Boolean),
                Column::required("has_location_data", ColumnType::Boolean),
            ],
            project_activity,
        )
    }
}

fn project_bike(raw: &serde_json::Value) -> Result<Vec<Value>, ProjectionError> {
    Ok(Bike::from_raw(raw)?.into_values())
}

fn project_activity(raw: &serde_json::Value) -> Result<Vec<Value>, ProjectionError> {
    Ok(Activity::from_raw(raw)?.into_values())
}

impl Schema {
    /// The shipped schema: bikes, then activities.
    pub fn strava() -> Self {
        Schema::new(SCHEMA_VERSION)
            .with_table(Bike::table())
            .with_table(Activity::table())
    }
}
