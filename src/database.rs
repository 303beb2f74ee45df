use std::fs;
use std::path::Path;
use std::time::Duration;

use log::info;
use rusqlite::Connection;

use crate::error::MigrateError;

pub struct Database;

impl Database {
    /// Open the database file, creating it (and its folder) when missing.
    ///
    /// Failures to reach the file surface as connection errors rather than
    /// generic database errors so the CLI can tell them apart.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection, MigrateError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    MigrateError::ConnectionError(format!(
                        "Could not create database folder '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            MigrateError::ConnectionError(format!("{}: {}", path.display(), e))
        })?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| MigrateError::ConnectionError(format!("{}: {}", path.display(), e)))?;

        // Fail here rather than at the first migration if the file is not a database
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| MigrateError::ConnectionError(format!("{}: {}", path.display(), e)))?;

        info!("Database opened at: {}", path.display());
        Ok(conn)
    }
}
