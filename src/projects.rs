use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::MigrateError;
use crate::revisions::m0027_project_mapshed_job_uuids::{
    MAPSHED_JOB_UUID, SUBBASIN_MAPSHED_JOB_UUID,
};

/// Which MapShed job reference on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Mapshed,
    SubbasinMapshed,
}

impl JobKind {
    fn column(&self) -> &'static str {
        match self {
            JobKind::Mapshed => MAPSHED_JOB_UUID.name,
            JobKind::SubbasinMapshed => SUBBASIN_MAPSHED_JOB_UUID.name,
        }
    }
}

/// Job references recorded on a project. The identifiers are opaque: nothing
/// here checks that the job exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectJobs {
    pub mapshed_job_uuid: Option<Uuid>,
    pub subbasin_mapshed_job_uuid: Option<Uuid>,
}

pub struct Projects;

impl Projects {
    /// Returns `None` when no project has this id.
    pub fn get_jobs(conn: &Connection, project_id: i64) -> Result<Option<ProjectJobs>, MigrateError> {
        let stored: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT mapshed_job_uuid, subbasin_mapshed_job_uuid
                 FROM modeling_project WHERE id = ?",
                [project_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((mapshed, subbasin)) = stored else {
            return Ok(None);
        };

        Ok(Some(ProjectJobs {
            mapshed_job_uuid: parse_job_uuid(mapshed)?,
            subbasin_mapshed_job_uuid: parse_job_uuid(subbasin)?,
        }))
    }

    /// Record (or clear, with `None`) a job reference. Returns false when no
    /// project has this id.
    pub fn set_job(
        conn: &Connection,
        project_id: i64,
        kind: JobKind,
        job: Option<Uuid>,
    ) -> Result<bool, MigrateError> {
        let sql = format!(
            "UPDATE modeling_project SET {} = ? WHERE id = ?",
            kind.column()
        );
        let value = job.map(|uuid| uuid.simple().to_string());
        let updated = conn.execute(&sql, params![value, project_id])?;
        Ok(updated > 0)
    }
}

fn parse_job_uuid(value: Option<String>) -> Result<Option<Uuid>, MigrateError> {
    value
        .map(|s| {
            Uuid::parse_str(&s)
                .map_err(|e| MigrateError::Error(format!("Invalid job uuid '{}': {}", s, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::Target;
    use crate::revisions;

    fn migrated_database() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        revisions::migrator(true)
            .unwrap()
            .migrate(&mut conn, Target::Latest)
            .unwrap();
        conn.execute(
            "INSERT INTO modeling_project
                (name, area_of_interest, model_package, created_at, modified_at)
             VALUES ('Tookany Creek', '{}', 'tr-55', '2017-05-04 09:30:00', '2017-05-04 09:30:00')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_new_project_has_no_jobs() {
        let conn = migrated_database();
        assert_eq!(
            Projects::get_jobs(&conn, 1).unwrap(),
            Some(ProjectJobs::default())
        );
        assert_eq!(Projects::get_jobs(&conn, 99).unwrap(), None);
    }

    #[test]
    fn test_set_and_clear_jobs() {
        let conn = migrated_database();
        let mapshed = Uuid::new_v4();
        let subbasin = Uuid::new_v4();

        assert!(Projects::set_job(&conn, 1, JobKind::Mapshed, Some(mapshed)).unwrap());
        assert!(Projects::set_job(&conn, 1, JobKind::SubbasinMapshed, Some(subbasin)).unwrap());
        assert_eq!(
            Projects::get_jobs(&conn, 1).unwrap().unwrap(),
            ProjectJobs {
                mapshed_job_uuid: Some(mapshed),
                subbasin_mapshed_job_uuid: Some(subbasin),
            }
        );

        let stored: String = conn
            .query_row("SELECT mapshed_job_uuid FROM modeling_project WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored.len(), 32);

        assert!(Projects::set_job(&conn, 1, JobKind::Mapshed, None).unwrap());
        let jobs = Projects::get_jobs(&conn, 1).unwrap().unwrap();
        assert_eq!(jobs.mapshed_job_uuid, None);
        assert_eq!(jobs.subbasin_mapshed_job_uuid, Some(subbasin));
    }

    #[test]
    fn test_set_job_on_missing_project() {
        let conn = migrated_database();
        assert!(!Projects::set_job(&conn, 42, JobKind::Mapshed, Some(Uuid::new_v4())).unwrap());
    }

    #[test]
    fn test_invalid_stored_uuid_is_an_error() {
        let conn = migrated_database();
        conn.execute(
            "UPDATE modeling_project SET mapshed_job_uuid = 'not-a-uuid' WHERE id = 1",
            [],
        )
        .unwrap();
        assert!(Projects::get_jobs(&conn, 1).is_err());
    }
}
