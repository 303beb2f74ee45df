use crate::revision::{Revision, RevisionId};
use crate::schema::{Column, ColumnType, Operation};

use super::APP_LABEL;

pub const ID: RevisionId = RevisionId::new(26, "delete_hydroshareresource");

/// Squashed baseline of the modeling app.
///
/// Earlier history is folded into this revision: it creates the `project`
/// entity as it stood once revision 0026 had dropped the HydroShare
/// resource table. A database created by the web application at 0026 is
/// adopted with `migrate 0026 --fake` (`Migrator::fake`), which records
/// this revision in the ledger without running it.
pub fn revision() -> Revision {
    Revision {
        app: APP_LABEL,
        id: ID,
        dependencies: vec![],
        operations: vec![Operation::CreateEntity {
            entity: "project",
            columns: project_columns(),
        }],
    }
}

fn project_columns() -> Vec<Column> {
    vec![
        Column::new("id", ColumnType::AutoField),
        Column::new("name", ColumnType::Varchar(255)),
        Column::new("area_of_interest", ColumnType::Text)
            .help_text("Base geometry for all scenarios of project, as GeoJSON."),
        Column::new("area_of_interest_name", ColumnType::Varchar(255))
            .nullable()
            .help_text("A human readable name for the area of interest."),
        Column::new("is_private", ColumnType::Boolean).default("1"),
        Column::new("model_package", ColumnType::Varchar(255))
            .help_text("Which model pack was chosen for this project."),
        Column::new("created_at", ColumnType::DateTime),
        Column::new("modified_at", ColumnType::DateTime),
        Column::new("is_activity", ColumnType::Boolean)
            .default("0")
            .help_text("Projects with special properties."),
        Column::new("gis_data", ColumnType::Text)
            .nullable()
            .help_text("Serialized JSON representation of additional data gathering steps, such as MapShed."),
        Column::new("user_id", ColumnType::Integer).nullable(),
    ]
}
