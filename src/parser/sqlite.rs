//! SQLite parser with schema inference.
//!
//! The exact table and column names of a Beads database are not fixed, so
//! the parser discovers them:
//!
//! 1. **Table** - the first of [`PREFERRED_TABLES`] that exists, otherwise
//!    the first non-system table.
//! 2. **Columns** - for each canonical field, the first alias from
//!    [`FIELD_ALIASES`] present in the table; missing fields select a
//!    literal fallback instead.
//!
//! Labels and dependency edges are then loaded best-effort from side tables.
//! Any failure there is silent.

use super::{ParseError, ParseResult, RecordLocation, source_size};
use crate::models::{Bead, BeadType, Dependency, DependencyType, Status};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Table names tried in order before falling back to any user table.
pub const PREFERRED_TABLES: &[&str] = &["issues", "beads", "issue", "bead", "tasks"];

/// Canonical bead fields read from the issues table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Title,
    Description,
    Status,
    IssueType,
    Priority,
    Assignee,
    CreatedAt,
    UpdatedAt,
    ClosedAt,
    DueAt,
    DeferUntil,
    ParentId,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Title => "title",
            Field::Description => "description",
            Field::Status => "status",
            Field::IssueType => "issue_type",
            Field::Priority => "priority",
            Field::Assignee => "assignee",
            Field::CreatedAt => "created_at",
            Field::UpdatedAt => "updated_at",
            Field::ClosedAt => "closed_at",
            Field::DueAt => "due_at",
            Field::DeferUntil => "defer_until",
            Field::ParentId => "parent_id",
        }
    }
}

/// Literal selected when no alias column exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Empty,
    Text(&'static str),
    Integer(i64),
}

impl Fallback {
    fn sql(&self) -> String {
        match self {
            Fallback::Empty => "''".to_string(),
            Fallback::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Fallback::Integer(i) => i.to_string(),
        }
    }
}

/// Ranked column aliases for one canonical field.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub field: Field,
    pub aliases: &'static [&'static str],
    pub fallback: Fallback,
}

/// The schema inference policy, one row per canonical field.
///
/// Row order is also the column order of the generated SELECT.
pub const FIELD_ALIASES: &[FieldAliases] = &[
    FieldAliases { field: Field::Id, aliases: &["id", "issue_id", "bead_id"], fallback: Fallback::Empty },
    FieldAliases { field: Field::Title, aliases: &["title", "name", "summary"], fallback: Fallback::Empty },
    FieldAliases { field: Field::Description, aliases: &["description", "body", "content", "details"], fallback: Fallback::Empty },
    FieldAliases { field: Field::Status, aliases: &["status", "state"], fallback: Fallback::Text("open") },
    FieldAliases { field: Field::IssueType, aliases: &["issue_type", "type", "kind", "category"], fallback: Fallback::Text("task") },
    FieldAliases { field: Field::Priority, aliases: &["priority", "importance", "severity"], fallback: Fallback::Integer(2) },
    FieldAliases { field: Field::Assignee, aliases: &["assignee", "assigned_to", "owner"], fallback: Fallback::Empty },
    FieldAliases { field: Field::CreatedAt, aliases: &["created_at", "created", "create_time"], fallback: Fallback::Empty },
    FieldAliases { field: Field::UpdatedAt, aliases: &["updated_at", "updated", "update_time", "modified_at"], fallback: Fallback::Empty },
    FieldAliases { field: Field::ClosedAt, aliases: &["closed_at", "closed", "resolved_at"], fallback: Fallback::Empty },
    FieldAliases { field: Field::DueAt, aliases: &["due_at", "due", "due_date"], fallback: Fallback::Empty },
    FieldAliases { field: Field::DeferUntil, aliases: &["defer_until", "deferred_until"], fallback: Fallback::Empty },
    FieldAliases { field: Field::ParentId, aliases: &["parent_id", "parent", "epic_id"], fallback: Fallback::Empty },
];

/// Best-effort label side-table queries, tried in order.
const LABEL_QUERIES: &[&str] = &[
    "SELECT issue_id, label FROM issue_labels",
    "SELECT issue_id, label FROM labels",
    "SELECT issue_id, name FROM labels",
];

/// Best-effort dependency side-table queries, tried in order.
const DEPENDENCY_QUERIES: &[&str] = &[
    "SELECT issue_id, depends_on_id, type, created_at, created_by FROM dependencies",
    "SELECT issue_id, depends_on_id, type, NULL, NULL FROM dependencies",
];

/// Result of resolving [`FIELD_ALIASES`] against a table's columns.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    resolved: Vec<(FieldAliases, Option<String>)>,
}

impl ColumnMap {
    /// Pick the first available alias for every field. `columns` must be lowercase.
    pub fn resolve(columns: &HashSet<String>) -> Self {
        let resolved = FIELD_ALIASES
            .iter()
            .map(|fa| {
                let column = fa
                    .aliases
                    .iter()
                    .find(|alias| columns.contains(**alias))
                    .map(|alias| alias.to_string());
                (*fa, column)
            })
            .collect();
        Self { resolved }
    }

    /// The source column chosen for `field`, if any.
    pub fn column(&self, field: Field) -> Option<&str> {
        self.resolved
            .iter()
            .find(|(fa, _)| fa.field == field)
            .and_then(|(_, col)| col.as_deref())
    }

    /// Position of `field` in the SELECT list.
    fn position(&self, field: Field) -> usize {
        self.resolved
            .iter()
            .position(|(fa, _)| fa.field == field)
            .unwrap_or(usize::MAX)
    }

    /// Build the SELECT statement for `table`.
    pub fn select_sql(&self, table: &str) -> String {
        let parts: Vec<String> = self
            .resolved
            .iter()
            .map(|(fa, column)| match column {
                Some(col) => format!("{} AS {}", quote_ident(col), fa.field.as_str()),
                None => format!("{} AS {}", fa.fallback.sql(), fa.field.as_str()),
            })
            .collect();
        format!("SELECT {} FROM {}", parts.join(", "), quote_ident(table))
    }
}

/// Parse a SQLite Beads database.
pub fn parse_sqlite(path: &Path) -> Result<ParseResult> {
    let file_size = source_size(path)?;
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let tables = list_tables(&conn)?;
    let table = choose_table(&tables).ok_or_else(|| Error::NoIssuesTable {
        path: path.to_path_buf(),
        available: tables.clone(),
    })?;

    let columns = table_columns(&conn, &table)?;
    let map = ColumnMap::resolve(&columns);
    tracing::debug!(table = %table, ?columns, "resolved sqlite schema");

    let (mut records, errors) = read_rows(&conn, &table, &map)?;

    load_labels(&conn, &mut records);
    load_dependencies(&conn, &mut records);
    for (_, bead) in &mut records {
        bead.derive_relations();
    }

    let result = ParseResult::from_records(records, errors, file_size);
    tracing::debug!(
        path = %path.display(),
        beads = result.beads.len(),
        errors = result.errors.len(),
        "parsed sqlite source"
    );
    Ok(result)
}

fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(|name| name.ok())
        .map(|name| name.to_lowercase())
        .collect();
    Ok(tables)
}

/// Pick the issues table: a preferred name, else the first non-system table.
pub fn choose_table(tables: &[String]) -> Option<String> {
    PREFERRED_TABLES
        .iter()
        .find(|known| tables.iter().any(|t| t == *known))
        .map(|known| known.to_string())
        .or_else(|| {
            tables
                .iter()
                .find(|t| !t.starts_with("sqlite_") && t.as_str() != "schema_migrations")
                .cloned()
        })
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|name| name.ok())
        .map(|name| name.to_lowercase())
        .collect();
    Ok(columns)
}

type Records = Vec<(RecordLocation, Bead)>;

fn read_rows(conn: &Connection, table: &str, map: &ColumnMap) -> Result<(Records, Vec<ParseError>)> {
    let mut stmt = conn.prepare(&map.select_sql(table))?;
    let mut rows = stmt.query([])?;

    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut row_num = 0;
    while let Some(row) = rows.next()? {
        row_num += 1;
        let location = RecordLocation::Row(row_num);
        match bead_from_row(row, map) {
            Ok(bead) => records.push((location, bead)),
            Err(message) => {
                tracing::debug!(%location, %message, "skipping unreadable row");
                errors.push(ParseError::new(location, message));
            }
        }
    }
    Ok((records, errors))
}

fn column_value<'a>(
    row: &'a rusqlite::Row<'_>,
    map: &ColumnMap,
    field: Field,
) -> std::result::Result<ValueRef<'a>, String> {
    row.get_ref(map.position(field))
        .map_err(|e| format!("failed to read {}: {}", field.as_str(), e))
}

fn bead_from_row(row: &rusqlite::Row<'_>, map: &ColumnMap) -> std::result::Result<Bead, String> {
    let value = |field: Field| column_value(row, map, field);

    let id = text(value(Field::Id)?)?;
    if id.trim().is_empty() {
        return Err("row missing required field 'id'".to_string());
    }

    let mut bead = Bead::new(id.trim(), text(value(Field::Title)?)?);
    bead.description = text(value(Field::Description)?)?;
    bead.status = Status::parse(&text(value(Field::Status)?)?);
    bead.issue_type = BeadType::parse(&text(value(Field::IssueType)?)?);
    bead.priority = priority(value(Field::Priority)?)?;
    bead.assignee = Some(text(value(Field::Assignee)?)?).filter(|a| !a.is_empty());
    bead.created_at = timestamp(value(Field::CreatedAt)?).unwrap_or_default();
    bead.updated_at = timestamp(value(Field::UpdatedAt)?).unwrap_or_default();
    bead.closed_at = timestamp(value(Field::ClosedAt)?);
    bead.due_at = timestamp(value(Field::DueAt)?);
    bead.defer_until = timestamp(value(Field::DeferUntil)?);

    let parent = text(value(Field::ParentId)?)?;
    if !parent.trim().is_empty() {
        bead.parent_id = Some(parent.trim().to_string());
    }
    Ok(bead)
}

fn text(value: ValueRef<'_>) -> std::result::Result<String, String> {
    match value {
        ValueRef::Null => Ok(String::new()),
        ValueRef::Integer(i) => Ok(i.to_string()),
        ValueRef::Real(f) => Ok(f.to_string()),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|_| "column is not valid UTF-8".to_string()),
        ValueRef::Blob(_) => Err("unexpected blob column".to_string()),
    }
}

/// Read a priority, accepting integers, numeric text and "p1"-style labels.
fn priority(value: ValueRef<'_>) -> std::result::Result<i64, String> {
    match value {
        ValueRef::Null => Ok(2),
        ValueRef::Integer(i) => Ok(i),
        ValueRef::Real(f) => Ok(f as i64),
        ValueRef::Text(_) => {
            let raw = text(value)?;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(2);
            }
            let digits = trimmed.strip_prefix(['p', 'P']).unwrap_or(trimmed);
            digits
                .parse()
                .map_err(|_| format!("invalid priority '{}'", trimmed))
        }
        ValueRef::Blob(_) => Err("unexpected blob priority".to_string()),
    }
}

fn timestamp(value: ValueRef<'_>) -> Option<DateTime<Utc>> {
    match value {
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().and_then(parse_time),
        _ => None,
    }
}

/// Accepted timestamp layouts, tried in order.
#[derive(Debug, Clone, Copy)]
enum TimeFormat {
    Rfc3339,
    WithOffset(&'static str),
    Naive(&'static str),
    Date(&'static str),
}

const TIME_FORMATS: &[TimeFormat] = &[
    TimeFormat::Rfc3339,
    TimeFormat::Naive("%Y-%m-%dT%H:%M:%SZ"),
    TimeFormat::WithOffset("%Y-%m-%d %H:%M:%S%.f%:z"),
    TimeFormat::Naive("%Y-%m-%d %H:%M:%S%.f"),
    TimeFormat::Naive("%Y-%m-%d %H:%M:%S"),
    TimeFormat::Date("%Y-%m-%d"),
];

/// Parse a timestamp against [`TIME_FORMATS`]; first match wins.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    TIME_FORMATS.iter().find_map(|format| match format {
        TimeFormat::Rfc3339 => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        TimeFormat::WithOffset(f) => DateTime::parse_from_str(s, f)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        TimeFormat::Naive(f) => NaiveDateTime::parse_from_str(s, f)
            .ok()
            .map(|t| t.and_utc()),
        TimeFormat::Date(f) => NaiveDate::parse_from_str(s, f)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc()),
    })
}

fn index_by_id(records: &Records) -> HashMap<String, usize> {
    records
        .iter()
        .enumerate()
        .map(|(idx, (_, bead))| (bead.id.clone(), idx))
        .collect()
}

fn load_labels(conn: &Connection, records: &mut Records) {
    let index = index_by_id(records);
    for query in LABEL_QUERIES {
        let Ok(mut stmt) = conn.prepare(query) else {
            continue;
        };
        let Ok(rows) = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        }) else {
            continue;
        };
        for (issue_id, label) in rows.flatten() {
            if let Some(&idx) = index.get(&issue_id) {
                records[idx].1.labels.push(label);
            }
        }
        return;
    }
}

fn load_dependencies(conn: &Connection, records: &mut Records) {
    let index = index_by_id(records);
    for query in DEPENDENCY_QUERIES {
        let Ok(mut stmt) = conn.prepare(query) else {
            continue;
        };
        let Ok(rows) = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        }) else {
            continue;
        };
        for (issue_id, depends_on_id, kind, created_at, created_by) in rows.flatten() {
            let Some(&idx) = index.get(&issue_id) else {
                continue;
            };
            let mut dep = Dependency::new(
                &issue_id,
                &depends_on_id,
                DependencyType::parse(kind.as_deref().unwrap_or("")),
            );
            dep.created_at = created_at.as_deref().and_then(parse_time).unwrap_or_default();
            dep.created_by = created_by;
            records[idx].1.dependencies.push(dep);
        }
        return;
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use tempfile::TempDir;

    fn create_db(schema: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beads.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(schema).unwrap();
        (dir, path)
    }

    fn columns(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_choose_table_prefers_known_names() {
        let tables = vec!["notes".to_string(), "beads".to_string(), "issues".to_string()];
        assert_eq!(choose_table(&tables).as_deref(), Some("issues"));
    }

    #[test]
    fn test_choose_table_falls_back_to_user_table() {
        let tables = vec![
            "sqlite_sequence".to_string(),
            "schema_migrations".to_string(),
            "work_items".to_string(),
        ];
        assert_eq!(choose_table(&tables).as_deref(), Some("work_items"));
        assert_eq!(choose_table(&["sqlite_stat1".to_string()]), None);
    }

    #[test]
    fn test_column_map_uses_ranked_aliases() {
        let map = ColumnMap::resolve(&columns(&["issue_id", "name", "summary", "state"]));
        assert_eq!(map.column(Field::Id), Some("issue_id"));
        assert_eq!(map.column(Field::Title), Some("name"));
        assert_eq!(map.column(Field::Status), Some("state"));
        assert_eq!(map.column(Field::Priority), None);
    }

    #[test]
    fn test_select_sql_uses_fallback_literals() {
        let map = ColumnMap::resolve(&columns(&["id", "title"]));
        let sql = map.select_sql("issues");
        assert!(sql.starts_with("SELECT \"id\" AS id, \"title\" AS title"));
        assert!(sql.contains("'open' AS status"));
        assert!(sql.contains("'task' AS issue_type"));
        assert!(sql.contains("2 AS priority"));
        assert!(sql.ends_with("FROM \"issues\""));
    }

    #[test]
    fn test_parse_time_formats() {
        let t = parse_time("2025-03-04T05:06:07Z").unwrap();
        assert_eq!((t.year(), t.month(), t.day(), t.hour()), (2025, 3, 4, 5));

        let t = parse_time("2025-03-04T05:06:07.5+02:00").unwrap();
        assert_eq!(t.hour(), 3);

        let t = parse_time("2025-03-04 05:06:07").unwrap();
        assert_eq!(t.minute(), 6);

        let t = parse_time("2025-03-04").unwrap();
        assert_eq!((t.day(), t.hour()), (4, 0));

        assert!(parse_time("yesterday").is_none());
        assert!(parse_time("").is_none());
    }

    #[test]
    fn test_parse_beads_schema() {
        let (_dir, path) = create_db(
            r#"
            CREATE TABLE issues (
                id TEXT PRIMARY KEY, title TEXT, description TEXT, status TEXT,
                issue_type TEXT, priority INTEGER, assignee TEXT,
                created_at TEXT, updated_at TEXT, closed_at TEXT
            );
            CREATE TABLE labels (issue_id TEXT, label TEXT);
            CREATE TABLE dependencies (issue_id TEXT, depends_on_id TEXT, type TEXT, created_at TEXT, created_by TEXT);
            INSERT INTO issues VALUES ('bd-1', 'Epic', 'desc', 'open', 'epic', 1, 'ann', '2025-01-01T00:00:00Z', '2025-01-02 10:00:00', NULL);
            INSERT INTO issues VALUES ('bd-1.1', 'Child', NULL, 'closed', 'task', 0, NULL, 'garbage', NULL, '2025-01-03');
            INSERT INTO issues VALUES ('bd-2', 'Gone', NULL, 'tombstone', 'bug', 2, NULL, NULL, NULL, NULL);
            INSERT INTO labels VALUES ('bd-1', 'ui'), ('bd-1', 'api'), ('bd-zz', 'orphan');
            INSERT INTO dependencies VALUES ('bd-1', 'bd-1.1', 'blocks', '2025-01-01', 'ann');
            "#,
        );

        let result = parse_sqlite(&path).unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.beads.len(), 2);

        let epic = &result.beads[0];
        assert_eq!(epic.issue_type, BeadType::Epic);
        assert_eq!(epic.priority, 1);
        assert_eq!(epic.assignee.as_deref(), Some("ann"));
        assert_eq!(epic.labels, vec!["ui", "api"]);
        assert_eq!(epic.blocker_ids, vec!["bd-1.1".to_string()]);
        assert_eq!(epic.updated_at.hour(), 10);

        let child = &result.beads[1];
        assert_eq!(child.parent_id.as_deref(), Some("bd-1"));
        assert_eq!(child.status, Status::Closed);
        assert_eq!(child.created_at, DateTime::<Utc>::default());
        assert!(child.closed_at.is_some());
        assert_eq!(child.description, "");
    }

    #[test]
    fn test_parse_inferred_schema_with_defaults() {
        let (_dir, path) = create_db(
            r#"
            CREATE TABLE work_items (issue_id TEXT, name TEXT, body TEXT, epic_id TEXT);
            INSERT INTO work_items VALUES ('w-1', 'First', 'body text', NULL);
            INSERT INTO work_items VALUES ('w-2', 'Second', NULL, 'w-1');
            INSERT INTO work_items VALUES (NULL, 'Nameless', NULL, NULL);
            "#,
        );

        let result = parse_sqlite(&path).unwrap();
        assert_eq!(result.beads.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].location, RecordLocation::Row(3));

        let first = &result.beads[0];
        assert_eq!(first.status, Status::Open);
        assert_eq!(first.issue_type, BeadType::Task);
        assert_eq!(first.priority, 2);
        assert_eq!(first.description, "body text");
        assert!(first.labels.is_empty());

        assert_eq!(result.beads[1].parent_id.as_deref(), Some("w-1"));
    }

    #[test]
    fn test_issue_labels_side_table_preferred() {
        let (_dir, path) = create_db(
            r#"
            CREATE TABLE beads (id TEXT, title TEXT, priority TEXT);
            CREATE TABLE issue_labels (issue_id TEXT, label TEXT);
            INSERT INTO beads VALUES ('b-1', 'One', 'p3');
            INSERT INTO issue_labels VALUES ('b-1', 'backend');
            "#,
        );
        let result = parse_sqlite(&path).unwrap();
        assert_eq!(result.beads[0].labels, vec!["backend"]);
        assert_eq!(result.beads[0].priority, 3);
    }

    #[test]
    fn test_invalid_priority_is_row_error() {
        let (_dir, path) = create_db(
            r#"
            CREATE TABLE issues (id TEXT, title TEXT, priority TEXT);
            INSERT INTO issues VALUES ('bd-1', 'ok', '1');
            INSERT INTO issues VALUES ('bd-2', 'bad', 'urgent');
            "#,
        );
        let result = parse_sqlite(&path).unwrap();
        assert_eq!(result.beads.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("urgent"));
    }

    #[test]
    fn test_no_table_is_fatal() {
        let (_dir, path) = create_db("PRAGMA user_version = 1;");
        let err = parse_sqlite(&path).unwrap_err();
        assert!(matches!(err, Error::NoIssuesTable { .. }));
    }

    #[test]
    fn test_missing_database_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = parse_sqlite(&dir.path().join("beads.db")).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }
}
