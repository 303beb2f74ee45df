use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Dependency order error: {0}")]
    DependencyOrder(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(#[from] SchemaConflict),

    #[error("Logger error: {0}")]
    LoggerError(#[from] flexi_logger::FlexiLoggerError),

    #[error("Error: {0}")]
    Error(String),
}

/// Schema states that make an operation impossible to apply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaConflict {
    #[error("entity table '{0}' does not exist")]
    MissingEntity(String),

    #[error("entity table '{0}' already exists")]
    EntityExists(String),

    #[error("column '{column}' already exists on '{table}'")]
    ColumnExists { table: String, column: String },

    #[error("column '{column}' does not exist on '{table}'")]
    MissingColumn { table: String, column: String },

    #[error("column '{column}' on '{table}' is NOT NULL and has no default")]
    MissingDefault { table: String, column: String },
}
