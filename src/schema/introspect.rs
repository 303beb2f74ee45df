use rusqlite::{Connection, OptionalExtension};

use crate::error::MigrateError;
use crate::schema::{quote_ident, ColumnType};

/// A column as it currently exists in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn column_type(&self) -> Option<ColumnType> {
        ColumnType::from_declared(&self.declared_type, self.primary_key)
    }

    /// Rebuild the column definition from what SQLite reports.
    pub fn definition_sql(&self, autoincrement: bool) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.declared_type);
        if self.primary_key {
            sql.push_str(" NOT NULL PRIMARY KEY");
            if autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
            return sql;
        }
        sql.push_str(if self.not_null { " NOT NULL" } else { " NULL" });
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// Snapshot of one table's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub autoincrement: bool,
}

impl TableSnapshot {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, MigrateError> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, MigrateError> {
    Ok(self::table(conn, table)?
        .map(|snapshot| snapshot.column(column).is_some())
        .unwrap_or(false))
}

/// Read the shape of `name`, or `None` when the table does not exist.
pub fn table(conn: &Connection, name: &str) -> Result<Option<TableSnapshot>, MigrateError> {
    let create_sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )
        .optional()?;

    let Some(create_sql) = create_sql else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                declared_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default: row.get(4)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(TableSnapshot {
        name: name.to_owned(),
        columns,
        autoincrement: create_sql.to_ascii_uppercase().contains("AUTOINCREMENT"),
    }))
}

/// Help text recorded for the columns of `table`, in column-name order.
pub fn column_docs(conn: &Connection, table: &str) -> Result<Vec<(String, String)>, MigrateError> {
    if !table_exists(conn, "revision_column_docs")? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT column_name, help_text FROM revision_column_docs
         WHERE table_name = ? ORDER BY column_name",
    )?;
    let docs = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs)
}

/// Names of all user tables, excluding SQLite internals.
pub fn table_names(conn: &Connection) -> Result<Vec<String>, MigrateError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
