use log::debug;
use rusqlite::{params, Connection};

use crate::error::{MigrateError, SchemaConflict};
use crate::schema::introspect;
use crate::schema::{quote_ident, table_name, Column, ColumnType};

/// Help text has no home in SQLite's catalog, so operations keep it here.
pub const COLUMN_DOCS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS revision_column_docs (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    help_text TEXT NOT NULL,
    PRIMARY KEY (table_name, column_name)
);
"#;

/// One atomic schema change within a revision.
///
/// The set is closed: every variant has an inverse, which is what
/// reverting a revision applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateEntity {
        entity: &'static str,
        columns: Vec<Column>,
    },
    /// Carries the full column list so that it can be reversed.
    DropEntity {
        entity: &'static str,
        columns: Vec<Column>,
    },
    AddColumn {
        entity: &'static str,
        column: Column,
    },
    DropColumn {
        entity: &'static str,
        column: Column,
    },
    AlterColumn {
        entity: &'static str,
        from: Column,
        to: Column,
    },
}

impl Operation {
    pub fn entity(&self) -> &'static str {
        match self {
            Operation::CreateEntity { entity, .. }
            | Operation::DropEntity { entity, .. }
            | Operation::AddColumn { entity, .. }
            | Operation::DropColumn { entity, .. }
            | Operation::AlterColumn { entity, .. } => *entity,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Operation::CreateEntity { entity, .. } => format!("Create entity {}", entity),
            Operation::DropEntity { entity, .. } => format!("Drop entity {}", entity),
            Operation::AddColumn { entity, column } => {
                format!("Add column {} to {}", column.name, entity)
            }
            Operation::DropColumn { entity, column } => {
                format!("Drop column {} from {}", column.name, entity)
            }
            Operation::AlterColumn { entity, from, .. } => {
                format!("Alter column {} on {}", from.name, entity)
            }
        }
    }

    pub fn inverse(&self) -> Operation {
        match self.clone() {
            Operation::CreateEntity { entity, columns } => Operation::DropEntity { entity, columns },
            Operation::DropEntity { entity, columns } => Operation::CreateEntity { entity, columns },
            Operation::AddColumn { entity, column } => Operation::DropColumn { entity, column },
            Operation::DropColumn { entity, column } => Operation::AddColumn { entity, column },
            Operation::AlterColumn { entity, from, to } => Operation::AlterColumn {
                entity,
                from: to,
                to: from,
            },
        }
    }

    /// Statements this operation would run against the current schema.
    ///
    /// Only `AlterColumn` reads the schema: SQLite cannot alter a column in
    /// place, so the table is rebuilt from its current shape.
    pub fn plan(&self, conn: &Connection, app: &str) -> Result<Vec<String>, MigrateError> {
        let table = table_name(app, self.entity());
        let quoted = quote_ident(&table);

        let statements = match self {
            Operation::CreateEntity { columns, .. } => {
                let defs: Vec<String> = columns.iter().map(Column::definition_sql).collect();
                vec![format!("CREATE TABLE {} ({})", quoted, defs.join(", "))]
            }
            Operation::DropEntity { .. } => vec![format!("DROP TABLE {}", quoted)],
            Operation::AddColumn { column, .. } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quoted,
                column.definition_sql()
            )],
            Operation::DropColumn { column, .. } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quoted,
                quote_ident(column.name)
            )],
            Operation::AlterColumn { from, to, .. } => rebuild_plan(conn, &table, from, to)?,
        };

        Ok(statements)
    }

    /// Apply this operation to the entity tables of `app`.
    pub fn apply(&self, conn: &Connection, app: &str) -> Result<(), MigrateError> {
        let table = table_name(app, self.entity());
        self.check(conn, &table)?;

        for statement in self.plan(conn, app)? {
            debug!("{}", statement);
            conn.execute(&statement, [])?;
        }

        self.update_docs(conn, &table)
    }

    fn check(&self, conn: &Connection, table: &str) -> Result<(), MigrateError> {
        let snapshot = introspect::table(conn, table)?;

        if let Operation::CreateEntity { .. } = self {
            return match snapshot {
                Some(_) => Err(SchemaConflict::EntityExists(table.to_owned()).into()),
                None => Ok(()),
            };
        }

        let snapshot =
            snapshot.ok_or_else(|| SchemaConflict::MissingEntity(table.to_owned()))?;

        match self {
            Operation::CreateEntity { .. } | Operation::DropEntity { .. } => Ok(()),
            Operation::AddColumn { column, .. } => {
                if snapshot.column(column.name).is_some() {
                    return Err(column_exists(table, column.name));
                }
                if !column.nullable
                    && column.default.is_none()
                    && column.column_type != ColumnType::AutoField
                {
                    return Err(SchemaConflict::MissingDefault {
                        table: table.to_owned(),
                        column: column.name.to_owned(),
                    }
                    .into());
                }
                Ok(())
            }
            Operation::DropColumn { column, .. } => match snapshot.column(column.name) {
                Some(_) => Ok(()),
                None => Err(missing_column(table, column.name)),
            },
            Operation::AlterColumn { from, to, .. } => {
                if snapshot.column(from.name).is_none() {
                    return Err(missing_column(table, from.name));
                }
                if to.name != from.name && snapshot.column(to.name).is_some() {
                    return Err(column_exists(table, to.name));
                }
                if !to.nullable
                    && to.default.is_none()
                    && to.column_type != ColumnType::AutoField
                    && has_nulls(conn, table, from.name)?
                {
                    return Err(SchemaConflict::MissingDefault {
                        table: table.to_owned(),
                        column: to.name.to_owned(),
                    }
                    .into());
                }
                Ok(())
            }
        }
    }

    fn update_docs(&self, conn: &Connection, table: &str) -> Result<(), MigrateError> {
        conn.execute_batch(COLUMN_DOCS_SQL)?;

        match self {
            Operation::CreateEntity { columns, .. } => {
                for column in columns {
                    record_doc(conn, table, column)?;
                }
            }
            Operation::DropEntity { .. } => {
                conn.execute(
                    "DELETE FROM revision_column_docs WHERE table_name = ?",
                    [table],
                )?;
            }
            Operation::AddColumn { column, .. } => record_doc(conn, table, column)?,
            Operation::DropColumn { column, .. } => forget_doc(conn, table, column.name)?,
            Operation::AlterColumn { from, to, .. } => {
                forget_doc(conn, table, from.name)?;
                record_doc(conn, table, to)?;
            }
        }
        Ok(())
    }
}

/// Create a copy of the table with the altered column, move the rows
/// across and swap it into place.
fn rebuild_plan(
    conn: &Connection,
    table: &str,
    from: &Column,
    to: &Column,
) -> Result<Vec<String>, MigrateError> {
    let snapshot = introspect::table(conn, table)?
        .ok_or_else(|| SchemaConflict::MissingEntity(table.to_owned()))?;
    if snapshot.column(from.name).is_none() {
        return Err(missing_column(table, from.name));
    }

    let staging = quote_ident(&format!("new__{}", table));
    let mut defs = Vec::with_capacity(snapshot.columns.len());
    let mut targets = Vec::with_capacity(snapshot.columns.len());
    let mut sources = Vec::with_capacity(snapshot.columns.len());

    for info in &snapshot.columns {
        if info.name == from.name {
            defs.push(to.definition_sql());
            targets.push(quote_ident(to.name));
            let source = quote_ident(from.name);
            sources.push(match (to.nullable, to.default) {
                (false, Some(default)) => format!("coalesce({}, {})", source, default),
                _ => source,
            });
        } else {
            defs.push(info.definition_sql(snapshot.autoincrement));
            targets.push(quote_ident(&info.name));
            sources.push(quote_ident(&info.name));
        }
    }

    let quoted = quote_ident(table);
    Ok(vec![
        format!("CREATE TABLE {} ({})", staging, defs.join(", ")),
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            staging,
            targets.join(", "),
            sources.join(", "),
            quoted
        ),
        format!("DROP TABLE {}", quoted),
        format!("ALTER TABLE {} RENAME TO {}", staging, quoted),
    ])
}

fn record_doc(conn: &Connection, table: &str, column: &Column) -> Result<(), MigrateError> {
    if column.help_text.is_empty() {
        return forget_doc(conn, table, column.name);
    }
    conn.execute(
        "INSERT OR REPLACE INTO revision_column_docs (table_name, column_name, help_text)
         VALUES (?, ?, ?)",
        params![table, column.name, column.help_text],
    )?;
    Ok(())
}

fn forget_doc(conn: &Connection, table: &str, column: &str) -> Result<(), MigrateError> {
    conn.execute(
        "DELETE FROM revision_column_docs WHERE table_name = ? AND column_name = ?",
        params![table, column],
    )?;
    Ok(())
}

fn column_exists(table: &str, column: &str) -> MigrateError {
    SchemaConflict::ColumnExists {
        table: table.to_owned(),
        column: column.to_owned(),
    }
    .into()
}

fn has_nulls(conn: &Connection, table: &str, column: &str) -> Result<bool, MigrateError> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} IS NULL)",
        quote_ident(table),
        quote_ident(column)
    );
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

fn missing_column(table: &str, column: &str) -> MigrateError {
    SchemaConflict::MissingColumn {
        table: table.to_owned(),
        column: column.to_owned(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NAME: Column = Column::new("name", ColumnType::Varchar(255));
    const NOTE: Column = Column::new("note", ColumnType::Text)
        .nullable()
        .help_text("Free-form note.");

    fn widget_columns() -> Vec<Column> {
        vec![Column::new("id", ColumnType::AutoField), NAME]
    }

    fn create_widget(conn: &Connection) {
        Operation::CreateEntity {
            entity: "widget",
            columns: widget_columns(),
        }
        .apply(conn, "app")
        .unwrap();
    }

    fn conflict(err: MigrateError) -> SchemaConflict {
        match err {
            MigrateError::SchemaConflict(conflict) => conflict,
            other => panic!("expected schema conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_inverse_pairs() {
        let add = Operation::AddColumn {
            entity: "widget",
            column: NOTE,
        };
        assert_eq!(
            add.inverse(),
            Operation::DropColumn {
                entity: "widget",
                column: NOTE
            }
        );
        assert_eq!(add.inverse().inverse(), add);

        let alter = Operation::AlterColumn {
            entity: "widget",
            from: NAME,
            to: NAME.nullable(),
        };
        assert_eq!(
            alter.inverse(),
            Operation::AlterColumn {
                entity: "widget",
                from: NAME.nullable(),
                to: NAME
            }
        );
    }

    #[test]
    fn test_create_and_drop_entity() {
        let conn = Connection::open_in_memory().unwrap();
        create_widget(&conn);

        let snapshot = introspect::table(&conn, "app_widget").unwrap().unwrap();
        assert_eq!(snapshot.column_names(), vec!["id", "name"]);

        let again = Operation::CreateEntity {
            entity: "widget",
            columns: widget_columns(),
        }
        .apply(&conn, "app")
        .unwrap_err();
        assert_eq!(conflict(again), SchemaConflict::EntityExists("app_widget".into()));

        Operation::DropEntity {
            entity: "widget",
            columns: widget_columns(),
        }
        .apply(&conn, "app")
        .unwrap();
        assert!(!introspect::table_exists(&conn, "app_widget").unwrap());
    }

    #[test]
    fn test_add_column_records_help_text() {
        let conn = Connection::open_in_memory().unwrap();
        create_widget(&conn);

        let add = Operation::AddColumn {
            entity: "widget",
            column: NOTE,
        };
        add.apply(&conn, "app").unwrap();

        assert_eq!(
            introspect::column_docs(&conn, "app_widget").unwrap(),
            vec![("note".to_owned(), "Free-form note.".to_owned())]
        );

        add.inverse().apply(&conn, "app").unwrap();
        assert!(introspect::column_docs(&conn, "app_widget").unwrap().is_empty());
        assert!(!introspect::column_exists(&conn, "app_widget", "note").unwrap());
    }

    #[test]
    fn test_add_column_conflicts() {
        let conn = Connection::open_in_memory().unwrap();

        let add = Operation::AddColumn {
            entity: "widget",
            column: NOTE,
        };
        assert_eq!(
            conflict(add.apply(&conn, "app").unwrap_err()),
            SchemaConflict::MissingEntity("app_widget".into())
        );

        create_widget(&conn);
        add.apply(&conn, "app").unwrap();
        assert_eq!(
            conflict(add.apply(&conn, "app").unwrap_err()),
            SchemaConflict::ColumnExists {
                table: "app_widget".into(),
                column: "note".into()
            }
        );

        let required = Operation::AddColumn {
            entity: "widget",
            column: Column::new("rank", ColumnType::Integer),
        };
        assert!(matches!(
            conflict(required.apply(&conn, "app").unwrap_err()),
            SchemaConflict::MissingDefault { .. }
        ));
    }

    #[test]
    fn test_drop_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        create_widget(&conn);

        let drop = Operation::DropColumn {
            entity: "widget",
            column: NOTE,
        };
        assert_eq!(
            conflict(drop.apply(&conn, "app").unwrap_err()),
            SchemaConflict::MissingColumn {
                table: "app_widget".into(),
                column: "note".into()
            }
        );
    }

    #[test]
    fn test_alter_column_rebuild_keeps_rows() {
        let conn = Connection::open_in_memory().unwrap();
        create_widget(&conn);
        conn.execute("INSERT INTO app_widget (name) VALUES ('a'), ('b')", [])
            .unwrap();

        let alter = Operation::AlterColumn {
            entity: "widget",
            from: NAME,
            to: Column::new("title", ColumnType::Varchar(100))
                .nullable()
                .help_text("Display title."),
        };
        alter.apply(&conn, "app").unwrap();

        let snapshot = introspect::table(&conn, "app_widget").unwrap().unwrap();
        assert_eq!(snapshot.column_names(), vec!["id", "title"]);
        assert!(snapshot.autoincrement);
        let title = snapshot.column("title").unwrap();
        assert_eq!(title.column_type(), Some(ColumnType::Varchar(100)));
        assert!(!title.not_null);

        let titles: Vec<String> = conn
            .prepare("SELECT title FROM app_widget ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(titles, vec!["a", "b"]);

        alter.inverse().apply(&conn, "app").unwrap();
        let snapshot = introspect::table(&conn, "app_widget").unwrap().unwrap();
        assert_eq!(snapshot.column_names(), vec!["id", "name"]);
        assert!(introspect::column_docs(&conn, "app_widget").unwrap().is_empty());
    }

    #[test]
    fn test_alter_to_not_null_fills_default() {
        let conn = Connection::open_in_memory().unwrap();
        create_widget(&conn);
        Operation::AddColumn {
            entity: "widget",
            column: NOTE,
        }
        .apply(&conn, "app")
        .unwrap();
        conn.execute("INSERT INTO app_widget (name) VALUES ('a')", [])
            .unwrap();

        Operation::AlterColumn {
            entity: "widget",
            from: NOTE,
            to: Column::new("note", ColumnType::Text).default("''"),
        }
        .apply(&conn, "app")
        .unwrap();

        let note: String = conn
            .query_row("SELECT note FROM app_widget", [], |row| row.get(0))
            .unwrap();
        assert_eq!(note, "");
    }

    #[test]
    fn test_alter_to_not_null_without_default_over_nulls() {
        let conn = Connection::open_in_memory().unwrap();
        create_widget(&conn);
        Operation::AddColumn {
            entity: "widget",
            column: NOTE,
        }
        .apply(&conn, "app")
        .unwrap();
        conn.execute("INSERT INTO app_widget (name) VALUES ('a')", [])
            .unwrap();

        let alter = Operation::AlterColumn {
            entity: "widget",
            from: NOTE,
            to: Column::new("note", ColumnType::Text),
        };
        assert_eq!(
            conflict(alter.apply(&conn, "app").unwrap_err()),
            SchemaConflict::MissingDefault {
                table: "app_widget".into(),
                column: "note".into()
            }
        );
        let snapshot = introspect::table(&conn, "app_widget").unwrap().unwrap();
        assert!(!snapshot.column("note").unwrap().not_null);

        conn.execute("UPDATE app_widget SET note = 'filled'", []).unwrap();
        alter.apply(&conn, "app").unwrap();
        let snapshot = introspect::table(&conn, "app_widget").unwrap().unwrap();
        assert!(snapshot.column("note").unwrap().not_null);
    }

    #[test]
    fn test_plan_add_column() {
        let conn = Connection::open_in_memory().unwrap();
        let plan = Operation::AddColumn {
            entity: "widget",
            column: NOTE,
        }
        .plan(&conn, "app")
        .unwrap();
        assert_eq!(
            plan,
            vec!["ALTER TABLE \"app_widget\" ADD COLUMN \"note\" text NULL".to_owned()]
        );
    }
}
