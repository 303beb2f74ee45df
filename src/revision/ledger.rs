use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::MigrateError;
use crate::revision::RevisionId;

pub const CREATE_LEDGER_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS revision_ledger (
    app TEXT NOT NULL,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,   -- Timestamp when the revision was applied (UTC)
    PRIMARY KEY (app, name)
);
"#;

/// In-memory view of the `revision_ledger` table.
///
/// The ledger is loaded from a connection and passed explicitly to the
/// code that needs to know what has been applied. Writes go to the
/// connection and the in-memory view together.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    applied: BTreeMap<(String, String), i64>,
}

impl Ledger {
    pub fn ensure_table(conn: &Connection) -> Result<(), MigrateError> {
        conn.execute_batch(CREATE_LEDGER_SQL)?;
        Ok(())
    }

    pub fn load(conn: &Connection) -> Result<Self, MigrateError> {
        Self::ensure_table(conn)?;

        let mut stmt = conn.prepare("SELECT app, name, applied_at FROM revision_ledger")?;
        let applied: BTreeMap<(String, String), i64> = stmt
            .query_map([], |row| Ok(((row.get(0)?, row.get(1)?), row.get(2)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self { applied })
    }

    pub fn is_applied(&self, app: &str, id: &RevisionId) -> bool {
        self.applied_at(app, id).is_some()
    }

    /// Unix timestamp (seconds) at which the revision was applied.
    pub fn applied_at(&self, app: &str, id: &RevisionId) -> Option<i64> {
        self.applied
            .get(&(app.to_owned(), id.label()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn record(
        &mut self,
        conn: &Connection,
        app: &str,
        id: &RevisionId,
    ) -> Result<(), MigrateError> {
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO revision_ledger (app, name, applied_at) VALUES (?, ?, ?)",
            params![app, id.label(), now],
        )?;
        self.applied.insert((app.to_owned(), id.label()), now);
        Ok(())
    }

    pub fn forget(
        &mut self,
        conn: &Connection,
        app: &str,
        id: &RevisionId,
    ) -> Result<(), MigrateError> {
        conn.execute(
            "DELETE FROM revision_ledger WHERE app = ? AND name = ?",
            params![app, id.label()],
        )?;
        self.applied.remove(&(app.to_owned(), id.label()));
        Ok(())
    }
}
