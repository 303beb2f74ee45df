pub mod introspect;
pub mod operation;

pub use operation::Operation;

/// Column types understood by the revision engine.
///
/// Each type maps to the declared SQLite type Django would emit for the
/// equivalent model field, so that a database migrated here matches one
/// migrated by the web application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    AutoField,
    Integer,
    Boolean,
    Varchar(u16),
    Text,
    DateTime,
    Uuid,
}

impl ColumnType {
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::AutoField | ColumnType::Integer => "integer".to_owned(),
            ColumnType::Boolean => "bool".to_owned(),
            ColumnType::Varchar(len) => format!("varchar({})", len),
            ColumnType::Text => "text".to_owned(),
            ColumnType::DateTime => "datetime".to_owned(),
            // UUIDs are stored as the 32 digit simple hex form
            ColumnType::Uuid => "char(32)".to_owned(),
        }
    }

    /// Map a declared type read back from `PRAGMA table_info` to a column type.
    ///
    /// `integer` is ambiguous between `AutoField` and `Integer`; the primary
    /// key flag decides which one it was.
    pub fn from_declared(decl: &str, primary_key: bool) -> Option<ColumnType> {
        let decl = decl.trim().to_ascii_lowercase();
        match decl.as_str() {
            "integer" if primary_key => Some(ColumnType::AutoField),
            "integer" => Some(ColumnType::Integer),
            "bool" => Some(ColumnType::Boolean),
            "text" => Some(ColumnType::Text),
            "datetime" => Some(ColumnType::DateTime),
            "char(32)" => Some(ColumnType::Uuid),
            _ => decl
                .strip_prefix("varchar(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|len| len.parse().ok())
                .map(ColumnType::Varchar),
        }
    }
}

/// A column as declared by a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// SQL literal used as the column default
    pub default: Option<&'static str>,
    pub help_text: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            default: None,
            help_text: "",
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn default(mut self, literal: &'static str) -> Self {
        self.default = Some(literal);
        self
    }

    pub const fn help_text(mut self, text: &'static str) -> Self {
        self.help_text = text;
        self
    }

    /// Column definition as it appears inside CREATE TABLE or ADD COLUMN.
    pub fn definition_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(self.name), self.column_type.sql_type());
        if self.column_type == ColumnType::AutoField {
            sql.push_str(" NOT NULL PRIMARY KEY AUTOINCREMENT");
            return sql;
        }
        sql.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// Name of the table backing `entity` in `app`, following the
/// `<app>_<entity>` convention of the web application.
pub fn table_name(app: &str, entity: &str) -> String {
    format!("{}_{}", app, entity)
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_column_definition() {
        let column = Column::new("mapshed_job_uuid", ColumnType::Uuid).nullable();
        assert_eq!(column.definition_sql(), "\"mapshed_job_uuid\" char(32) NULL");
    }

    #[test]
    fn test_auto_field_definition_ignores_nullability() {
        let column = Column::new("id", ColumnType::AutoField).nullable();
        assert_eq!(
            column.definition_sql(),
            "\"id\" integer NOT NULL PRIMARY KEY AUTOINCREMENT"
        );
    }

    #[test]
    fn test_not_null_with_default() {
        let column = Column::new("is_private", ColumnType::Boolean).default("1");
        assert_eq!(column.definition_sql(), "\"is_private\" bool NOT NULL DEFAULT 1");
    }

    #[test]
    fn test_from_declared() {
        assert_eq!(ColumnType::from_declared("char(32)", false), Some(ColumnType::Uuid));
        assert_eq!(ColumnType::from_declared("INTEGER", true), Some(ColumnType::AutoField));
        assert_eq!(ColumnType::from_declared("integer", false), Some(ColumnType::Integer));
        assert_eq!(
            ColumnType::from_declared("varchar(255)", false),
            Some(ColumnType::Varchar(255))
        );
        assert_eq!(ColumnType::from_declared("blob", false), None);
    }

    #[test]
    fn test_table_name() {
        assert_eq!(table_name("modeling", "project"), "modeling_project");
    }
}
