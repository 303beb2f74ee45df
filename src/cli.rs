use std::io::{self, Write};
use std::path::PathBuf;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use flexi_logger::{detailed_format, Duplicate, FileSpec, Logger, LoggerHandle};
use log::{debug, info};
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::Config;
use crate::database::Database;
use crate::error::{MigrateError, SchemaConflict};
use crate::projects::{JobKind, Projects};
use crate::revision::{Migrator, Target};
use crate::revisions;
use crate::schema::{introspect, table_name};

#[derive(Parser)]
#[command(
    name = "mmw-migrate",
    version,
    about = "Schema revision runner for the modeling database"
)]
pub struct Cli {
    /// Database file (overrides the configured path)
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Bring the schema to a revision (default: latest, "zero" reverts everything)
    Migrate {
        /// Revision label or unique prefix, e.g. "0026"
        target: Option<String>,

        /// Record the revisions in the ledger without running them
        #[arg(long)]
        fake: bool,
    },

    /// List revisions and when they were applied
    Status {
        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the SQL a revision runs
    Sql {
        /// Revision label or unique prefix
        revision: String,

        /// Print the SQL that reverts the revision
        #[arg(long)]
        backwards: bool,
    },

    /// Show the columns of an entity, with help text
    Show {
        /// Entity name, e.g. "project"
        entity: String,
    },

    /// Show or record the MapShed jobs of a project
    Jobs {
        project_id: i64,

        /// Record the job that computed the MapShed results
        #[arg(long)]
        mapshed: Option<Uuid>,

        /// Record the job that computed the per sub-basin MapShed results
        #[arg(long)]
        subbasin: Option<Uuid>,

        /// Clear both job references
        #[arg(long, conflicts_with_all = ["mapshed", "subbasin"])]
        clear: bool,
    },
}

impl Cli {
    pub fn handle_command_line() -> Result<(), MigrateError> {
        let args = Cli::parse();

        let project_dirs = ProjectDirs::from("", "", "mmw-migrate").ok_or_else(|| {
            MigrateError::Error("Could not determine the data directory".to_string())
        })?;

        let mut config = Config::load_config(&project_dirs);
        if let Some(db) = args.db {
            config.database.path = db;
        }

        let _logger = Self::start_logger(&config, &project_dirs)?;
        debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());
        debug!("Configuration: {:?}", config);

        let mut conn = Database::open(&config.database.path, config.database.busy_timeout())?;
        let migrator = revisions::migrator(config.database.atomic_ddl)?;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        execute(args.command, &mut conn, &migrator, &mut out)
    }

    fn start_logger(
        config: &Config,
        project_dirs: &ProjectDirs,
    ) -> Result<LoggerHandle, MigrateError> {
        let log_dir = project_dirs.data_local_dir().join("logs");
        let handle = Logger::try_with_str(&config.logging.level)?
            .log_to_file(FileSpec::default().directory(log_dir))
            .format_for_files(detailed_format)
            .duplicate_to_stderr(Duplicate::Warn)
            .start()?;
        Ok(handle)
    }
}

pub fn execute(
    command: Command,
    conn: &mut Connection,
    migrator: &Migrator,
    out: &mut impl Write,
) -> Result<(), MigrateError> {
    match command {
        Command::Migrate { target, fake } => {
            migrate(conn, migrator, target.as_deref(), fake, out)
        }
        Command::Status { json } => status(conn, migrator, json, out),
        Command::Sql {
            revision,
            backwards,
        } => {
            for statement in migrator.sql(conn, &revision, backwards)? {
                if statement.starts_with("--") {
                    writeln!(out, "{}", statement)?;
                } else {
                    writeln!(out, "{};", statement)?;
                }
            }
            Ok(())
        }
        Command::Show { entity } => show(conn, migrator, &entity, out),
        Command::Jobs {
            project_id,
            mapshed,
            subbasin,
            clear,
        } => jobs(conn, project_id, mapshed, subbasin, clear, out),
    }
}

fn migrate(
    conn: &mut Connection,
    migrator: &Migrator,
    target: Option<&str>,
    fake: bool,
    out: &mut impl Write,
) -> Result<(), MigrateError> {
    let target = match target {
        Some(t) => migrator.resolve(t)?,
        None => Target::Latest,
    };

    let report = if fake {
        info!("Faking '{}' to {:?}", migrator.app(), target);
        migrator.fake(conn, target)?
    } else {
        info!("Migrating '{}' to {:?}", migrator.app(), target);
        migrator.migrate(conn, target)?
    };
    let (reverted, applied) = if fake {
        ("Faked revert of", "Faked")
    } else {
        ("Reverted", "Applied")
    };

    for name in &report.reverted {
        writeln!(out, "  {} {}", reverted, name)?;
    }
    for name in &report.applied {
        writeln!(out, "  {} {}", applied, name)?;
    }
    if report.is_empty() {
        writeln!(out, "  No revisions to apply.")?;
    }
    Ok(())
}

fn status(
    conn: &Connection,
    migrator: &Migrator,
    json: bool,
    out: &mut impl Write,
) -> Result<(), MigrateError> {
    let statuses = migrator.status(conn)?;

    if json {
        let text = serde_json::to_string_pretty(&statuses)
            .map_err(|e| MigrateError::Error(format!("Failed to serialize status: {}", e)))?;
        writeln!(out, "{}", text)?;
        return Ok(());
    }

    writeln!(out, "{}", migrator.app())?;
    for status in statuses {
        match status.applied_at {
            Some(ts) => match DateTime::from_timestamp(ts, 0) {
                Some(at) => writeln!(
                    out,
                    " [X] {} (applied {})",
                    status.revision,
                    at.format("%Y-%m-%d %H:%M:%S UTC")
                )?,
                // out of chrono's range, still applied
                None => writeln!(out, " [X] {} (applied at unix {})", status.revision, ts)?,
            },
            None => writeln!(out, " [ ] {}", status.revision)?,
        }
    }
    Ok(())
}

fn show(
    conn: &Connection,
    migrator: &Migrator,
    entity: &str,
    out: &mut impl Write,
) -> Result<(), MigrateError> {
    let table = table_name(migrator.app(), entity);
    let snapshot = introspect::table(conn, &table)?
        .ok_or_else(|| SchemaConflict::MissingEntity(table.clone()))?;
    let docs = introspect::column_docs(conn, &table)?;

    writeln!(out, "{}", table)?;
    for column in &snapshot.columns {
        let nullability = if column.not_null || column.primary_key {
            "NOT NULL"
        } else {
            "NULL"
        };
        write!(out, "  {:<28} {:<14} {:<8}", column.name, column.declared_type, nullability)?;
        match docs.iter().find(|(name, _)| *name == column.name) {
            Some((_, help_text)) => writeln!(out, "  {}", help_text)?,
            None => writeln!(out)?,
        }
    }
    Ok(())
}

fn jobs(
    conn: &Connection,
    project_id: i64,
    mapshed: Option<Uuid>,
    subbasin: Option<Uuid>,
    clear: bool,
    out: &mut impl Write,
) -> Result<(), MigrateError> {
    let mut updates = Vec::new();
    if clear {
        updates.push((JobKind::Mapshed, None));
        updates.push((JobKind::SubbasinMapshed, None));
    }
    if let Some(uuid) = mapshed {
        updates.push((JobKind::Mapshed, Some(uuid)));
    }
    if let Some(uuid) = subbasin {
        updates.push((JobKind::SubbasinMapshed, Some(uuid)));
    }

    for (kind, job) in updates {
        if !Projects::set_job(conn, project_id, kind, job)? {
            return Err(MigrateError::Error(format!(
                "Project {} does not exist",
                project_id
            )));
        }
    }

    let jobs = Projects::get_jobs(conn, project_id)?
        .ok_or_else(|| MigrateError::Error(format!("Project {} does not exist", project_id)))?;

    let render = |job: Option<Uuid>| job.map(|u| u.to_string()).unwrap_or_else(|| "-".to_owned());
    writeln!(out, "mapshed_job_uuid:          {}", render(jobs.mapshed_job_uuid))?;
    writeln!(out, "subbasin_mapshed_job_uuid: {}", render(jobs.subbasin_mapshed_job_uuid))?;
    Ok(())
}
