//! Revision chain of the modeling app.
//!
//! New revisions get their own `mNNNN_<name>.rs` module and are appended
//! to [`modeling_revisions`]; existing entries are never edited.

pub mod m0026_delete_hydroshareresource;
pub mod m0027_project_mapshed_job_uuids;

use crate::error::MigrateError;
use crate::revision::{Migrator, Revision};

pub const APP_LABEL: &str = "modeling";

pub fn modeling_revisions() -> Vec<Revision> {
    vec![
        m0026_delete_hydroshareresource::revision(),
        m0027_project_mapshed_job_uuids::revision(),
    ]
}

pub fn migrator(atomic_ddl: bool) -> Result<Migrator, MigrateError> {
    Migrator::new(APP_LABEL, modeling_revisions(), atomic_ddl)
}
