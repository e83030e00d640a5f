//! Schema version reconciliation.
//!
//! Stores persist a single schema version. When the compiled [`Schema`] is
//! newer, every table is renamed aside, recreated from its current
//! [`TableSpec`](crate::TableSpec), and refilled by replaying each stored raw
//! snapshot through the current projection. This module decides whether that
//! is needed; the store layer carries it out inside one transaction.

use crate::error::Result;
use crate::{Error, Schema, SchemaVersion};

/// Suffix of a table renamed aside during migration.
pub const ASIDE_SUFFIX: &str = "_old";

/// Name a table is renamed to while it is being rehydrated.
pub fn aside_name(table: &str) -> String {
    format!("{}{}", table, ASIDE_SUFFIX)
}

/// What opening a store at a given version requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPlan {
    /// Stored version matches; tables only need to exist
    UpToDate,
    /// Stored version is older; every table is rehydrated
    Stale {
        from: SchemaVersion,
        to: SchemaVersion,
    },
}

impl MigrationPlan {
    /// Compare the stored version against the compiled schema.
    ///
    /// A brand-new store reports version 0 and is therefore stale; with no
    /// tables to rename aside, the migration just creates them.
    pub fn new(stored: SchemaVersion, schema: &Schema) -> Result<Self> {
        match stored.cmp(&schema.version) {
            std::cmp::Ordering::Equal => Ok(MigrationPlan::UpToDate),
            std::cmp::Ordering::Less => Ok(MigrationPlan::Stale {
                from: stored,
                to: schema.version,
            }),
            std::cmp::Ordering::Greater => Err(Error::SchemaTooNew {
                stored,
                compiled: schema.version,
            }),
        }
    }

    /// Check if rehydration is required.
    pub fn is_stale(&self) -> bool {
        matches!(self, MigrationPlan::Stale { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_version_is_up_to_date() {
        let schema = Schema::new(3);
        assert_eq!(MigrationPlan::new(3, &schema), Ok(MigrationPlan::UpToDate));
        assert!(!MigrationPlan::UpToDate.is_stale());
    }

    #[test]
    fn older_version_is_stale() {
        let schema = Schema::new(3);
        let plan = MigrationPlan::new(1, &schema).unwrap();
        assert_eq!(plan, MigrationPlan::Stale { from: 1, to: 3 });
        assert!(plan.is_stale());
    }

    #[test]
    fn fresh_store_is_stale() {
        let plan = MigrationPlan::new(0, &Schema::strava()).unwrap();
        assert!(plan.is_stale());
    }

    #[test]
    fn newer_version_is_rejected() {
        let schema = Schema::new(2);
        assert_eq!(
            MigrationPlan::new(5, &schema),
            Err(Error::SchemaTooNew {
                stored: 5,
                compiled: 2
            })
        );
    }

    #[test]
    fn aside_names() {
        assert_eq!(aside_name("bike"), "bike_old");
        assert_eq!(aside_name("activity"), "activity_old");
    }
}
