//! Table definitions and projection.
//!
//! A [`TableSpec`] declares the columns of one mirrored table and the function
//! that flattens a raw remote record into a row for it. A [`Schema`] groups
//! the table specs under a single version number; bumping the version makes
//! every store rehydrate its rows from their raw snapshots on next open.

use crate::error::{ProjectionError, Result};
use crate::{Error, Row, RowId, SchemaVersion, TableName, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Name of the implicit column holding the raw snapshot of each row.
pub const RAW_COLUMN: &str = "json";

/// Name of the identity column every table starts with.
pub const ID_COLUMN: &str = "id";

/// Column types supported by the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
}

impl ColumnType {
    /// SQL type used in `CREATE TABLE`.
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::Text, Value::Text(_))
                | (ColumnType::Integer, Value::Integer(_))
                | (ColumnType::Real, Value::Real(_))
                | (ColumnType::Real, Value::Integer(_))
                | (ColumnType::Boolean, Value::Boolean(_))
        )
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Text => write!(f, "Text"),
            ColumnType::Integer => write!(f, "Integer"),
            ColumnType::Real => write!(f, "Real"),
            ColumnType::Boolean => write!(f, "Boolean"),
        }
    }
}

/// Definition of a column in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
    /// Whether the projection may produce null for this column
    pub nullable: bool,
}

impl Column {
    /// Create a column that must always hold a value.
    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    /// Create a column that may hold null.
    pub fn nullable(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    /// Column definition fragment for `CREATE TABLE`.
    pub fn sql_definition(&self) -> String {
        if self.name == ID_COLUMN {
            format!("{} {} PRIMARY KEY", self.name, self.column_type.sql())
        } else {
            format!("{} {}", self.name, self.column_type.sql())
        }
    }

    fn check(&self, value: &Value) -> std::result::Result<(), ProjectionError> {
        if value.is_null() {
            return if self.nullable {
                Ok(())
            } else {
                Err(ProjectionError::NullField(self.name.clone()))
            };
        }

        if self.column_type.accepts(value) {
            Ok(())
        } else {
            Err(ProjectionError::TypeMismatch {
                field: self.name.clone(),
                expected: self.column_type.to_string(),
                got: value.kind().to_string(),
            })
        }
    }
}

/// Flattens a raw remote record into one value per column.
pub type ProjectFn = fn(&serde_json::Value) -> std::result::Result<Vec<Value>, ProjectionError>;

/// Declarative description of one mirrored table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Table name
    pub name: TableName,
    /// Columns in physical order, `id` first
    pub columns: Vec<Column>,
    project: ProjectFn,
}

impl TableSpec {
    /// Create a table spec. The `id` column of type `id_type` is prepended to
    /// `columns`, so `project` must emit the id as its first value.
    pub fn new(
        name: impl Into<TableName>,
        id_type: ColumnType,
        columns: Vec<Column>,
        project: ProjectFn,
    ) -> Self {
        let mut all = Vec::with_capacity(columns.len() + 1);
        all.push(Column::required(ID_COLUMN, id_type));
        all.extend(columns);
        Self {
            name: name.into(),
            columns: all,
            project,
        }
    }

    /// The identity column.
    pub fn id_column(&self) -> &Column {
        &self.columns[0]
    }

    /// Names of all physical columns, including the raw snapshot column.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .chain(std::iter::once(RAW_COLUMN))
            .collect()
    }

    /// Column definitions for `CREATE TABLE`, including the raw snapshot column.
    pub fn sql_columns(&self) -> String {
        self.columns
            .iter()
            .map(Column::sql_definition)
            .chain(std::iter::once(format!("{} TEXT", RAW_COLUMN)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Project a raw remote record into a row, validated against the columns.
    pub fn project(&self, raw: &serde_json::Value) -> Result<Row> {
        let values = (self.project)(raw).map_err(|e| Error::projection(&self.name, e))?;
        self.check_values(&values)
            .map_err(|e| Error::projection(&self.name, e))?;

        let id = RowId::from_value(&values[0]).ok_or_else(|| {
            Error::projection(&self.name, ProjectionError::NullField(ID_COLUMN.into()))
        })?;

        Ok(Row {
            id,
            values,
            raw: raw.to_string(),
        })
    }

    /// Project a stored raw snapshot (as text) into a row.
    pub fn project_snapshot(&self, raw: &str) -> Result<Row> {
        let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            Error::projection(
                &self.name,
                ProjectionError::TypeMismatch {
                    field: RAW_COLUMN.into(),
                    expected: "JSON".into(),
                    got: e.to_string(),
                },
            )
        })?;
        self.project(&parsed)
    }

    fn check_values(&self, values: &[Value]) -> std::result::Result<(), ProjectionError> {
        if values.len() != self.columns.len() {
            return Err(ProjectionError::ColumnCount {
                expected: self.columns.len(),
                got: values.len(),
            });
        }

        for (column, value) in self.columns.iter().zip(values) {
            column.check(value)?;
        }

        Ok(())
    }
}

/// All mirrored tables under one version number.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Schema version, bumped whenever any table's columns or projection change
    pub version: SchemaVersion,
    /// Table specs in creation order
    pub tables: Vec<TableSpec>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            tables: Vec::new(),
        }
    }

    /// Builder-style method to add a table.
    pub fn with_table(mut self, table: TableSpec) -> Self {
        self.tables.push(table);
        self
    }

    /// Get a table spec by name.
    pub fn table(&self, name: &str) -> Result<&TableSpec> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }
}

/// Typed access to the fields of a raw remote record.
///
/// A field that is absent is always an error. A field that is present but
/// null is only accepted by the `opt_*` accessors.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    object: &'a Map<String, serde_json::Value>,
}

impl<'a> Fields<'a> {
    /// Wrap a raw record, which must be a JSON object.
    pub fn new(raw: &'a serde_json::Value) -> std::result::Result<Self, ProjectionError> {
        raw.as_object()
            .map(|object| Self { object })
            .ok_or(ProjectionError::NotAnObject)
    }

    /// Get a field that must be present, possibly null.
    pub fn get(&self, name: &str) -> std::result::Result<&'a serde_json::Value, ProjectionError> {
        self.object
            .get(name)
            .ok_or_else(|| ProjectionError::MissingField(name.to_string()))
    }

    fn opt(&self, name: &str) -> std::result::Result<Option<&'a serde_json::Value>, ProjectionError> {
        let value = self.get(name)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    fn non_null(&self, name: &str) -> std::result::Result<&'a serde_json::Value, ProjectionError> {
        self.opt(name)?
            .ok_or_else(|| ProjectionError::NullField(name.to_string()))
    }

    /// A string field.
    pub fn text(&self, name: &str) -> std::result::Result<String, ProjectionError> {
        as_text(name, self.non_null(name)?)
    }

    /// A string field that may be null.
    pub fn opt_text(&self, name: &str) -> std::result::Result<Option<String>, ProjectionError> {
        self.opt(name)?.map(|v| as_text(name, v)).transpose()
    }

    /// An integer field.
    pub fn integer(&self, name: &str) -> std::result::Result<i64, ProjectionError> {
        as_integer(name, self.non_null(name)?)
    }

    /// An integer field that may be null.
    pub fn opt_integer(&self, name: &str) -> std::result::Result<Option<i64>, ProjectionError> {
        self.opt(name)?.map(|v| as_integer(name, v)).transpose()
    }

    /// A numeric field, integers included.
    pub fn real(&self, name: &str) -> std::result::Result<f64, ProjectionError> {
        let value = self.non_null(name)?;
        value
            .as_f64()
            .ok_or_else(|| mismatch(name, ColumnType::Real, value))
    }

    /// A boolean field.
    pub fn boolean(&self, name: &str) -> std::result::Result<bool, ProjectionError> {
        let value = self.non_null(name)?;
        value
            .as_bool()
            .ok_or_else(|| mismatch(name, ColumnType::Boolean, value))
    }
}

fn as_text(name: &str, value: &serde_json::Value) -> std::result::Result<String, ProjectionError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(name, ColumnType::Text, value))
}

fn as_integer(name: &str, value: &serde_json::Value) -> std::result::Result<i64, ProjectionError> {
    value
        .as_i64()
        .ok_or_else(|| mismatch(name, ColumnType::Integer, value))
}

fn mismatch(name: &str, expected: ColumnType, value: &serde_json::Value) -> ProjectionError {
    ProjectionError::TypeMismatch {
        field: name.to_string(),
        expected: expected.to_string(),
        got: json_type_name(value).to_string(),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Boolean",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "Integer",
        serde_json::Value::Number(_) => "Real",
        serde_json::Value::String(_) => "Text",
        serde_json::Value::Array(_) => "Array",
        serde_json::Value::Object(_) => "Object",
    }
}
