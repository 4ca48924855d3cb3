//! Tabular export, clear-with-backup and bulk import
//!
//! A [`Sheet`] is a named grid of JSON values persisted as one JSON document.
//! Any store (or the measurement results) can be exported; only `users` and
//! `videos` can be replaced from a sheet.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::Database;
use crate::error::{Error, Result};

/// A named table of rows; every row has one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the sheet as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_to(File::create(path)?)
    }

    fn write_to(&self, file: File) -> Result<()> {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Tables reachable through the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminTable {
    Users,
    Videos,
    Events,
    Activity,
    LastWatched,
    Comments,
    /// Computed view, export only
    MeasurementResults,
}

impl AdminTable {
    pub const ALL: [AdminTable; 7] = [
        AdminTable::Users,
        AdminTable::Videos,
        AdminTable::Events,
        AdminTable::Activity,
        AdminTable::LastWatched,
        AdminTable::Comments,
        AdminTable::MeasurementResults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminTable::Users => "users",
            AdminTable::Videos => "videos",
            AdminTable::Events => "events",
            AdminTable::Activity => "activity",
            AdminTable::LastWatched => "last_watched",
            AdminTable::Comments => "comments",
            AdminTable::MeasurementResults => "measurement_results",
        }
    }

    /// Columns the user and video filters apply to.
    fn filter_columns(&self) -> (Option<&'static str>, Option<&'static str>) {
        match self {
            AdminTable::Users => (Some("id"), None),
            AdminTable::Videos => (None, Some("url")),
            AdminTable::Comments => (Some("author"), Some("video_id")),
            AdminTable::Events | AdminTable::Activity | AdminTable::LastWatched => {
                (Some("user_id"), Some("video_id"))
            }
            AdminTable::MeasurementResults => (None, None),
        }
    }

    fn import_columns(&self) -> Option<&'static [ImportColumn]> {
        match self {
            AdminTable::Users => Some(USER_COLUMNS),
            AdminTable::Videos => Some(VIDEO_COLUMNS),
            _ => None,
        }
    }
}

// ============================================
// Import column types
// ============================================

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    /// Strings; numbers are taken as their decimal text
    Text,
    Integer,
    /// 0/1, true/false or "Y"/"N"; blank means active
    Flag,
}

impl ColumnKind {
    fn describe(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "an integer",
            ColumnKind::Flag => "0/1, true/false or Y/N",
        }
    }
}

#[derive(Debug)]
struct ImportColumn {
    name: &'static str,
    required: bool,
    kind: ColumnKind,
}

const fn column(name: &'static str, required: bool, kind: ColumnKind) -> ImportColumn {
    ImportColumn {
        name,
        required,
        kind,
    }
}

const USER_COLUMNS: &[ImportColumn] = &[
    column("id", true, ColumnKind::Text),
    column("name", true, ColumnKind::Text),
    column("password", true, ColumnKind::Text),
];

const VIDEO_COLUMNS: &[ImportColumn] = &[
    column("seq", false, ColumnKind::Integer),
    column("url", true, ColumnKind::Text),
    column("channel_name", false, ColumnKind::Text),
    column("channel_profile_url", false, ColumnKind::Text),
    column("description", false, ColumnKind::Text),
    column("active", false, ColumnKind::Flag),
];

impl ImportColumn {
    /// Convert one sheet cell into the value stored for this column.
    fn to_sql(&self, row: usize, value: &Value) -> Result<SqlValue> {
        let mismatch = || {
            Error::Import(format!(
                "row {}: column '{}' expects {}, got {}",
                row, self.name, self.kind.describe(), value
            ))
        };

        match (self.kind, value) {
            (ColumnKind::Flag, Value::Null) => Ok(SqlValue::Integer(1)),
            (_, Value::Null) if !self.required => Ok(SqlValue::Null),
            (ColumnKind::Text, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
            (ColumnKind::Text, Value::Number(n)) => Ok(SqlValue::Text(n.to_string())),
            (ColumnKind::Integer, Value::Number(n)) => {
                n.as_i64().map(SqlValue::Integer).ok_or_else(mismatch)
            }
            (ColumnKind::Flag, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
            (ColumnKind::Flag, Value::Number(n)) => match n.as_i64() {
                Some(flag @ (0 | 1)) => Ok(SqlValue::Integer(flag)),
                _ => Err(mismatch()),
            },
            (ColumnKind::Flag, Value::String(s)) => match s.as_str() {
                "Y" => Ok(SqlValue::Integer(1)),
                "N" => Ok(SqlValue::Integer(0)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        }
    }
}

impl std::fmt::Display for AdminTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AdminTable::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownTable(s.to_string()))
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::from(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Write a backup of `sheet` into `backup_dir` without replacing any
/// existing file.
///
/// The name is `<table>_backup_<YYYYmmddHHMMSS>.json`; a second backup in the
/// same second gets a `_1`, `_2`, ... suffix.
fn write_backup(sheet: &Sheet, table: AdminTable, backup_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(backup_dir)?;
    let stem = format!(
        "{}_backup_{}",
        table.as_str(),
        Local::now().format("%Y%m%d%H%M%S")
    );

    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}.json", stem)
        } else {
            format!("{}_{}.json", stem, attempt)
        };
        let path = backup_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                sheet.write_to(file)?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read a stored table, optionally filtered, in insertion order.
fn select_sheet(
    conn: &Connection,
    table: AdminTable,
    filter_user: Option<&str>,
    filter_video: Option<&str>,
) -> Result<Sheet> {
    let (user_col, video_col) = table.filter_columns();
    let mut clauses = Vec::new();
    let mut args: Vec<String> = Vec::new();
    for (column, filter) in [(user_col, filter_user), (video_col, filter_video)] {
        if let (Some(column), Some(filter)) = (column, filter.filter(|f| !f.is_empty())) {
            args.push(filter.to_string());
            clauses.push(format!("instr({}, ?{}) > 0", column, args.len()));
        }
    }

    let mut sql = format!("SELECT * FROM {}", table.as_str());
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(sql_to_json))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut sheet = Sheet::new(table.as_str(), columns);
    sheet.rows = rows;
    Ok(sheet)
}

impl Database {
    /// Export a table as a sheet.
    ///
    /// Filters are case-sensitive substring matches on the table's user and
    /// video columns; `None` or an empty string matches everything.
    pub fn export_table(
        &self,
        table: AdminTable,
        filter_user: Option<&str>,
        filter_video: Option<&str>,
    ) -> Result<Sheet> {
        if table == AdminTable::MeasurementResults {
            let metrics = self.compute_metrics(filter_user, filter_video)?;
            let mut sheet = Sheet::new(
                table.as_str(),
                metrics.columns.iter().map(|c| c.to_string()).collect(),
            );
            sheet.rows = metrics
                .rows
                .iter()
                .map(|row| row.cells().iter().map(|c| c.to_json()).collect())
                .collect();
            return Ok(sheet);
        }

        let conn = self.connection();
        select_sheet(&conn, table, filter_user, filter_video)
    }

    /// Back up a table into `backup_dir`, then delete all of its rows.
    ///
    /// Returns the backup path, or `None` when the table was already empty.
    /// The read, the backup and the delete happen in one write transaction,
    /// so every deleted row is in the backup.
    pub fn clear_table(&self, table: AdminTable, backup_dir: &Path) -> Result<Option<PathBuf>> {
        if table == AdminTable::MeasurementResults {
            return Err(Error::InvalidInput(
                "measurement_results is computed and cannot be cleared".to_string(),
            ));
        }

        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sheet = select_sheet(&tx, table, None, None)?;
        if sheet.is_empty() {
            tracing::info!(table = %table, "Nothing to clear");
            return Ok(None);
        }

        let path = write_backup(&sheet, table, backup_dir)?;
        let deleted = tx.execute(&format!("DELETE FROM {}", table.as_str()), [])?;
        tx.commit()?;
        tracing::info!(table = %table, deleted, backup = %path.display(), "Cleared table");
        Ok(Some(path))
    }

    /// Replace the contents of `users` or `videos` with the sheet's rows.
    ///
    /// Columns map to fields by exact name. The import runs in one
    /// transaction; any failure leaves the table untouched.
    pub fn import_sheet(&self, table: AdminTable, sheet: &Sheet) -> Result<usize> {
        let allowed = table.import_columns().ok_or_else(|| {
            Error::Import(format!(
                "import is only supported for users and videos, not {}",
                table
            ))
        })?;

        let columns = sheet
            .columns
            .iter()
            .map(|name| {
                allowed.iter().find(|c| c.name == name.as_str()).ok_or_else(|| {
                    Error::Import(format!("unknown column '{}' for {}", name, table))
                })
            })
            .collect::<Result<Vec<&ImportColumn>>>()?;
        if let Some(missing) = allowed
            .iter()
            .find(|c| c.required && !sheet.columns.iter().any(|name| name == c.name))
        {
            return Err(Error::Import(format!(
                "missing column '{}' for {}",
                missing.name, table
            )));
        }

        // Convert every row up front; nothing is written if any cell is bad
        let mut rows = Vec::with_capacity(sheet.rows.len());
        for (i, row) in sheet.rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::Import(format!(
                    "row {} has {} values, expected {}",
                    i + 1,
                    row.len(),
                    columns.len()
                )));
            }
            let values = columns
                .iter()
                .zip(row)
                .map(|(column, value)| column.to_sql(i + 1, value))
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }

        let placeholders: Vec<String> = (1..=sheet.columns.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.as_str(),
            sheet.columns.join(", "),
            placeholders.join(", ")
        );

        let mut conn = self.connection();
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", table.as_str()), [])?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for values in rows {
                stmt.execute(rusqlite::params_from_iter(values))?;
            }
        }
        tx.commit()?;

        tracing::info!(table = %table, rows = sheet.rows.len(), "Imported sheet");
        Ok(sheet.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, LoginUser};
    use serde_json::json;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn user(id: &str) -> LoginUser {
        LoginUser {
            id: id.to_string(),
            name: format!("name-{}", id),
            password: "pw".to_string(),
        }
    }

    #[test]
    fn test_admin_table_parse() {
        assert_eq!("last_watched".parse::<AdminTable>().unwrap(), AdminTable::LastWatched);
        assert!(matches!(
            "sessions".parse::<AdminTable>(),
            Err(Error::UnknownTable(name)) if name == "sessions"
        ));
    }

    #[test]
    fn test_export_events_with_filters() {
        let db = test_db();
        db.record_event("alice123", "v1", EventKind::WatchStart, "s1").unwrap();
        db.record_event("bob", "v1", EventKind::WatchStart, "s2").unwrap();
        db.record_event("alice123", "v2", EventKind::Like, "s1").unwrap();

        let all = db.export_table(AdminTable::Events, None, Some("")).unwrap();
        assert_eq!(all.rows.len(), 3);
        assert_eq!(
            all.columns,
            vec!["id", "user_id", "video_id", "ts", "kind", "session_id"]
        );

        let alice = db.export_table(AdminTable::Events, Some("alice"), None).unwrap();
        assert_eq!(alice.rows.len(), 2);
        assert!(alice.rows.iter().all(|r| r[1] == json!("alice123")));

        let both = db
            .export_table(AdminTable::Events, Some("alice"), Some("v2"))
            .unwrap();
        assert_eq!(both.rows.len(), 1);
        assert_eq!(both.rows[0][4], json!("like"));

        let case = db.export_table(AdminTable::Events, Some("ALICE"), None).unwrap();
        assert!(case.is_empty());
    }

    #[test]
    fn test_export_measurement_results() {
        let db = test_db();
        db.record_event("u1", "v1", EventKind::Like, "s1").unwrap();

        let sheet = db
            .export_table(AdminTable::MeasurementResults, None, None)
            .unwrap();
        assert_eq!(sheet.columns.len(), 11);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0][0], json!("u1"));
        assert_eq!(sheet.rows[0][3], json!("1"));
    }

    #[test]
    fn test_clear_table_writes_backup_then_empties() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        db.upsert_user(&user("u1")).unwrap();
        db.upsert_user(&user("u2")).unwrap();

        let path = db
            .clear_table(AdminTable::Users, dir.path())
            .unwrap()
            .expect("backup path");
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("users_backup_"));
        assert!(file_name.ends_with(".json"));
        assert_eq!(file_name.len(), "users_backup_".len() + 14 + ".json".len());

        let backup = Sheet::load(&path).unwrap();
        assert_eq!(backup.rows.len(), 2);
        assert!(db.export_table(AdminTable::Users, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_clear_empty_table_is_noop() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(db.clear_table(AdminTable::Comments, dir.path()).unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_clear_measurement_results_rejected() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        assert!(db
            .clear_table(AdminTable::MeasurementResults, dir.path())
            .is_err());
    }

    #[test]
    fn test_clear_same_second_gets_distinct_backups() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();

        db.upsert_user(&user("first")).unwrap();
        let first = db.clear_table(AdminTable::Users, dir.path()).unwrap().unwrap();
        db.upsert_user(&user("second")).unwrap();
        let second = db.clear_table(AdminTable::Users, dir.path()).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
        assert_eq!(Sheet::load(&first).unwrap().rows[0][0], json!("first"));
        assert_eq!(Sheet::load(&second).unwrap().rows[0][0], json!("second"));
    }

    #[test]
    fn test_clear_backs_up_rows_written_concurrently() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        for i in 0..50 {
            db.record_event(&format!("seed{}", i), "v1", EventKind::WatchStart, "s")
                .unwrap();
        }

        let backed_up = std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for i in 0..200 {
                    db.record_event(&format!("live{}", i), "v1", EventKind::WatchStart, "s")
                        .unwrap();
                }
            });

            let mut backed_up = 0;
            for _ in 0..5 {
                if let Some(path) = db.clear_table(AdminTable::Events, dir.path()).unwrap() {
                    backed_up += Sheet::load(&path).unwrap().rows.len();
                }
            }
            writer.join().unwrap();
            backed_up
        });

        // Every row is either still stored or in exactly one backup
        let remaining = db.export_table(AdminTable::Events, None, None).unwrap().rows.len();
        assert_eq!(backed_up + remaining, 250);
    }

    #[test]
    fn test_import_replaces_videos() {
        let db = test_db();
        db.upsert_video(&crate::types::Video {
            seq: 0,
            url: "https://www.youtube.com/shorts/old".to_string(),
            channel_name: None,
            channel_profile_url: None,
            description: None,
            active: true,
        })
        .unwrap();

        let sheet = Sheet {
            name: "videos".to_string(),
            columns: vec!["url".to_string(), "channel_name".to_string(), "active".to_string()],
            rows: vec![
                vec![json!("https://www.youtube.com/shorts/a"), json!("Chan A"), json!(1)],
                vec![json!("https://www.youtube.com/shorts/b"), Value::Null, json!(false)],
            ],
        };

        assert_eq!(db.import_sheet(AdminTable::Videos, &sheet).unwrap(), 2);
        let videos = db.list_videos(false).unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].channel_name.as_deref(), Some("Chan A"));
        assert!(!videos[1].active);
        assert_eq!(db.list_videos(true).unwrap().len(), 1);
    }

    #[test]
    fn test_import_failure_rolls_back() {
        let db = test_db();
        db.upsert_user(&user("keep")).unwrap();

        // Second row repeats the primary key, so the insert fails mid-import
        let sheet = Sheet {
            name: "users".to_string(),
            columns: vec!["id".to_string(), "name".to_string(), "password".to_string()],
            rows: vec![
                vec![json!("n1"), json!("New"), json!("pw")],
                vec![json!("n1"), json!("Dup"), json!("pw")],
            ],
        };
        assert!(db.import_sheet(AdminTable::Users, &sheet).is_err());

        let users = db.export_table(AdminTable::Users, None, None).unwrap();
        assert_eq!(users.rows.len(), 1);
        assert_eq!(users.rows[0][0], json!("keep"));
    }

    #[test]
    fn test_import_rejects_unknown_column_and_table() {
        let db = test_db();
        let sheet = Sheet {
            name: "users".to_string(),
            columns: vec![
                "id".to_string(),
                "name".to_string(),
                "password".to_string(),
                "email".to_string(),
            ],
            rows: vec![],
        };
        assert!(matches!(
            db.import_sheet(AdminTable::Users, &sheet),
            Err(Error::Import(msg)) if msg.contains("email")
        ));

        let events = Sheet::new("events", vec!["id".to_string()]);
        assert!(matches!(
            db.import_sheet(AdminTable::Events, &events),
            Err(Error::Import(_))
        ));
    }

    #[test]
    fn test_import_accepts_y_n_flags() {
        let db = test_db();
        let sheet = Sheet {
            name: "videos".to_string(),
            columns: vec!["seq".to_string(), "url".to_string(), "active".to_string()],
            rows: vec![
                vec![json!(7), json!("https://www.youtube.com/shorts/a"), json!("Y")],
                vec![json!(8), json!("https://www.youtube.com/shorts/b"), json!("N")],
                vec![Value::Null, json!("https://www.youtube.com/shorts/c"), Value::Null],
            ],
        };

        assert_eq!(db.import_sheet(AdminTable::Videos, &sheet).unwrap(), 3);
        let videos = db.list_videos(false).unwrap();
        assert_eq!(videos.len(), 3);
        assert_eq!(videos[0].seq, 7);
        assert_eq!(
            videos.iter().map(|v| v.active).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_import_rejects_mistyped_cells_and_keeps_table() {
        let db = test_db();
        db.upsert_video(&crate::types::Video {
            seq: 0,
            url: "https://www.youtube.com/shorts/keep".to_string(),
            channel_name: None,
            channel_profile_url: None,
            description: None,
            active: true,
        })
        .unwrap();

        let bad_sheets = [
            (vec!["url", "active"], vec![json!("https://www.youtube.com/shorts/a"), json!("maybe")]),
            (vec!["url", "active"], vec![json!("https://www.youtube.com/shorts/a"), json!(2)]),
            (vec!["seq", "url"], vec![json!("abc"), json!("https://www.youtube.com/shorts/a")]),
            (vec!["url"], vec![Value::Null]),
            (vec!["url", "description"], vec![json!("https://www.youtube.com/shorts/a"), json!({"x": 1})]),
        ];
        for (columns, row) in bad_sheets {
            let sheet = Sheet {
                name: "videos".to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: vec![row],
            };
            assert!(matches!(
                db.import_sheet(AdminTable::Videos, &sheet),
                Err(Error::Import(_))
            ));
        }

        let videos = db.list_videos(false).unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].url, "https://www.youtube.com/shorts/keep");
    }

    #[test]
    fn test_sheet_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("users.json");
        let mut sheet = Sheet::new("users", vec!["id".to_string()]);
        sheet.rows.push(vec![json!("u1")]);

        sheet.save(&path).unwrap();
        assert_eq!(Sheet::load(&path).unwrap(), sheet);
    }
}
