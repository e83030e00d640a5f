//! Unified error handling for the mirror.

use crate::config::ConfigError;
use crate::strava::StravaError;
use strava_mirror_engine::SchemaVersion;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] strava_mirror_engine::Error),

    #[error("Migration from schema version {from} to {to} failed: {source}")]
    Migration {
        from: SchemaVersion,
        to: SchemaVersion,
        #[source]
        source: Box<MirrorError>,
    },

    #[error("Remote error: {0}")]
    Remote(#[from] StravaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    /// Whether the error came from projecting a remote record.
    pub fn is_projection(&self) -> bool {
        matches!(
            self,
            MirrorError::Engine(strava_mirror_engine::Error::Projection { .. })
        )
    }
}

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use strava_mirror_engine::ProjectionError;

    #[test]
    fn migration_error_display() {
        let err = MirrorError::Migration {
            from: 1,
            to: 2,
            source: Box::new(MirrorError::Engine(strava_mirror_engine::Error::projection(
                "bike",
                ProjectionError::MissingField("name".into()),
            ))),
        };
        assert_eq!(
            err.to_string(),
            "Migration from schema version 1 to 2 failed: Engine error: cannot project bike record: missing required field: name"
        );
    }

    #[test]
    fn projection_errors_are_recognised() {
        let err: MirrorError = strava_mirror_engine::Error::projection(
            "activity",
            ProjectionError::NotAnObject,
        )
        .into();
        assert!(err.is_projection());

        let err: MirrorError = strava_mirror_engine::Error::UnknownTable("gear".into()).into();
        assert!(!err.is_projection());
    }
}
