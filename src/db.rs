use anyhow::Context;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub const DB_FILE: &str = "scores.sqlite3";

/// Owner of the SQLite connection holding students, exams, results and the
/// diagnosis cache. One instance per opened workspace.
pub struct ScoreStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl ScoreStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(workspace).with_context(|| {
            format!(
                "failed to create workspace {}",
                workspace.to_string_lossy()
            )
        })?;
        let db_path = workspace.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            path: Some(db_path),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// On-disk location of the database; `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn close(self) -> anyhow::Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("failed to close database")
    }
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class TEXT NOT NULL,
            class_order INTEGER,
            gender TEXT,
            student_status TEXT,
            report_id TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            date TEXT
        )",
        [],
    )?;
    // Databases created before exam classification existed have no type column.
    ensure_exams_type(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_results(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            exam_id INTEGER NOT NULL,
            total_score REAL NOT NULL,
            grade_rank INTEGER,
            class_rank INTEGER,
            elective_rank INTEGER,
            other_total_score REAL,
            other_total_grade_rank INTEGER,
            other_total_class_rank INTEGER,
            missing_count INTEGER,
            remarks TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            UNIQUE(student_id, exam_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_exam ON exam_results(exam_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_exam_rank ON exam_results(exam_id, grade_rank)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_student ON exam_results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_scores(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            result_id INTEGER NOT NULL,
            subject TEXT NOT NULL,
            score REAL NOT NULL,
            grade_rank INTEGER,
            class_rank INTEGER,
            class_avg REAL,
            grade_avg REAL,
            scaled_score REAL,
            arts_science_rank INTEGER,
            FOREIGN KEY(result_id) REFERENCES exam_results(id) ON DELETE CASCADE,
            UNIQUE(result_id, subject)
        )",
        [],
    )?;
    ensure_subject_scores_derived_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_scores_result ON subject_scores(result_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_scores_subject ON subject_scores(subject)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ai_diagnoses(
            student_id TEXT NOT NULL,
            exam_id INTEGER NOT NULL,
            intent TEXT NOT NULL,
            model TEXT NOT NULL,
            result TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY(student_id, exam_id, intent, model)
        )",
        [],
    )?;

    Ok(())
}

fn ensure_exams_type(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "exams", "type")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE exams ADD COLUMN type TEXT", [])?;
    Ok(())
}

fn ensure_subject_scores_derived_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "subject_scores", "scaled_score")? {
        conn.execute("ALTER TABLE subject_scores ADD COLUMN scaled_score REAL", [])?;
    }
    if !table_has_column(conn, "subject_scores", "arts_science_rank")? {
        conn.execute(
            "ALTER TABLE subject_scores ADD COLUMN arts_science_rank INTEGER",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn open_creates_workspace_and_schema() {
        let workspace = std::env::temp_dir().join(format!(
            "scorebook-db-open-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let store = ScoreStore::open(&workspace).expect("open store");
        assert!(workspace.join(DB_FILE).is_file());
        assert_eq!(store.db_path(), Some(workspace.join(DB_FILE).as_path()));
        for table in ["students", "exams", "exam_results", "subject_scores", "ai_diagnoses"] {
            let n: i64 = store
                .conn()
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table],
                    |r| r.get(0),
                )
                .expect("query master");
            assert_eq!(n, 1, "missing table {}", table);
        }
        store.close().expect("close");
        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn older_exams_table_gains_type_column() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE exams(id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE, date TEXT)",
            [],
        )
        .expect("legacy exams");
        init_schema(&conn).expect("schema");
        assert!(table_has_column(&conn, "exams", "type").expect("pragma"));
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = ScoreStore::open_in_memory().expect("open");
        let res = store.conn().execute(
            "INSERT INTO exam_results(student_id, exam_id, total_score) VALUES('nobody', 99, 1.0)",
            [],
        );
        assert!(res.is_err());
    }
}
