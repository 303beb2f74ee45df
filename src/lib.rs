pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod projects;
pub mod revision;
pub mod revisions;
pub mod schema;
