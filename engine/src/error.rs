//! Error types for the mirror engine.

use crate::{SchemaVersion, TableName};
use thiserror::Error;

/// A raw remote record could not be projected into a row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("field '{0}' is null but the column is not nullable")]
    NullField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("projection produced {got} values for {expected} columns")]
    ColumnCount { expected: usize, got: usize },
}

/// All possible errors from the mirror engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cannot project {table} record: {source}")]
    Projection {
        table: TableName,
        #[source]
        source: ProjectionError,
    },

    #[error("table not found: {0}")]
    UnknownTable(TableName),

    #[error("stored schema version {stored} is newer than supported version {compiled}")]
    SchemaTooNew {
        stored: SchemaVersion,
        compiled: SchemaVersion,
    },
}

impl Error {
    /// Attach the table name to a projection failure.
    pub fn projection(table: impl Into<TableName>, source: ProjectionError) -> Self {
        Error::Projection {
            table: table.into(),
            source,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnknownTable("gear".into());
        assert_eq!(err.to_string(), "table not found: gear");

        let err = Error::SchemaTooNew {
            stored: 7,
            compiled: 3,
        };
        assert_eq!(
            err.to_string(),
            "stored schema version 7 is newer than supported version 3"
        );

        let err = Error::projection("bike", ProjectionError::MissingField("name".into()));
        assert_eq!(
            err.to_string(),
            "cannot project bike record: missing required field: name"
        );

        let err = ProjectionError::TypeMismatch {
            field: "distance".into(),
            expected: "Real".into(),
            got: "String".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch for field 'distance': expected Real, got String"
        );
    }
}
