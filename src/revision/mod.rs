pub mod ledger;
pub mod migrator;

use std::fmt;

use log::{debug, info, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::error::MigrateError;
use crate::schema::Operation;

pub use ledger::Ledger;
pub use migrator::{MigrationReport, Migrator, RevisionStatus, Target};

/// Identity of a revision: its position in the chain and a short name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevisionId {
    pub index: u32,
    pub name: &'static str,
}

impl RevisionId {
    pub const fn new(index: u32, name: &'static str) -> Self {
        Self { index, name }
    }

    /// The `NNNN_name` form used in the ledger and on the command line.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{}", self.index, self.name)
    }
}

/// One immutable step in an app's schema history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub app: &'static str,
    pub id: RevisionId,
    pub dependencies: Vec<RevisionId>,
    pub operations: Vec<Operation>,
}

impl Revision {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.app, self.id)
    }

    /// Run the operations in order.
    ///
    /// Fails with a dependency-order error, before touching the schema, if
    /// any dependency is missing from `ledger`. Recording this revision in
    /// the ledger is left to the caller so that it can share a transaction.
    pub fn apply(&self, conn: &Connection, ledger: &Ledger) -> Result<(), MigrateError> {
        let _tmr = timer!(Level::Debug; "Revision::apply", "{}", self.qualified_name());

        if let Some(missing) = self
            .dependencies
            .iter()
            .find(|dep| !ledger.is_applied(self.app, dep))
        {
            return Err(MigrateError::DependencyOrder(format!(
                "{} depends on {}.{}, which has not been applied",
                self.qualified_name(),
                self.app,
                missing
            )));
        }

        for operation in &self.operations {
            debug!("{}: {}", self.qualified_name(), operation.describe());
            operation.apply(conn, self.app)?;
        }

        info!("Applied {}", self.qualified_name());
        Ok(())
    }

    /// Run the inverse operations in reverse order.
    pub fn revert(&self, conn: &Connection) -> Result<(), MigrateError> {
        let _tmr = timer!(Level::Debug; "Revision::revert", "{}", self.qualified_name());

        for operation in self.operations.iter().rev() {
            let inverse = operation.inverse();
            debug!("{}: {}", self.qualified_name(), inverse.describe());
            inverse.apply(conn, self.app)?;
        }

        info!("Reverted {}", self.qualified_name());
        Ok(())
    }

    /// SQL the revision would run, forwards or backwards.
    pub fn plan(&self, conn: &Connection, backwards: bool) -> Result<Vec<String>, MigrateError> {
        let mut statements = Vec::new();
        if backwards {
            for operation in self.operations.iter().rev() {
                let inverse = operation.inverse();
                statements.push(format!("-- {}", inverse.describe()));
                statements.extend(inverse.plan(conn, self.app)?);
            }
        } else {
            for operation in &self.operations {
                statements.push(format!("-- {}", operation.describe()));
                statements.extend(operation.plan(conn, self.app)?);
            }
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};

    #[test]
    fn test_label_is_zero_padded() {
        let id = RevisionId::new(27, "project_mapshed_job_uuids");
        assert_eq!(id.label(), "0027_project_mapshed_job_uuids");
        assert_eq!(id.to_string(), id.label());
    }

    #[test]
    fn test_ids_order_by_index() {
        assert!(RevisionId::new(9, "z") < RevisionId::new(10, "a"));
    }

    #[test]
    fn test_backwards_plan_reverses_operations() {
        let conn = Connection::open_in_memory().unwrap();
        let revision = Revision {
            app: "app",
            id: RevisionId::new(2, "notes"),
            dependencies: vec![],
            operations: vec![
                Operation::AddColumn {
                    entity: "widget",
                    column: Column::new("a", ColumnType::Text).nullable(),
                },
                Operation::AddColumn {
                    entity: "widget",
                    column: Column::new("b", ColumnType::Text).nullable(),
                },
            ],
        };

        let plan = revision.plan(&conn, true).unwrap();
        assert_eq!(
            plan,
            vec![
                "-- Drop column b from widget".to_owned(),
                "ALTER TABLE \"app_widget\" DROP COLUMN \"b\"".to_owned(),
                "-- Drop column a from widget".to_owned(),
                "ALTER TABLE \"app_widget\" DROP COLUMN \"a\"".to_owned(),
            ]
        );
    }
}
