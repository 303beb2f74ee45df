use crate::revision::{Revision, RevisionId};
use crate::schema::{Column, ColumnType, Operation};

use super::APP_LABEL;

pub const ID: RevisionId = RevisionId::new(27, "project_mapshed_job_uuids");

pub const MAPSHED_JOB_UUID: Column = Column::new("mapshed_job_uuid", ColumnType::Uuid)
    .nullable()
    .help_text(
        "The job used to calculate the MapShed results. Used for getting the results of that job.",
    );

pub const SUBBASIN_MAPSHED_JOB_UUID: Column =
    Column::new("subbasin_mapshed_job_uuid", ColumnType::Uuid)
        .nullable()
        .help_text(
            "The job used to calculate the mapshed results for each HUC-12 sub-basin of the shape.",
        );

/// Record which MapShed jobs produced a project's results.
///
/// Both columns are nullable with no default, so existing rows read null
/// until a job is recorded for them.
pub fn revision() -> Revision {
    Revision {
        app: APP_LABEL,
        id: ID,
        dependencies: vec![super::m0026_delete_hydroshareresource::ID],
        operations: vec![
            Operation::AddColumn {
                entity: "project",
                column: MAPSHED_JOB_UUID,
            },
            Operation::AddColumn {
                entity: "project",
                column: SUBBASIN_MAPSHED_JOB_UUID,
            },
        ],
    }
}
