use crate::error::ScoreResult;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub class: String,
    pub class_order: Option<i64>,
    pub gender: Option<String>,
    pub student_status: Option<String>,
    pub report_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exam {
    pub id: i64,
    pub name: String,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub exam_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExamResultFields {
    pub total_score: f64,
    pub grade_rank: Option<i64>,
    pub class_rank: Option<i64>,
    pub elective_rank: Option<i64>,
    pub other_total_score: Option<f64>,
    pub other_total_grade_rank: Option<i64>,
    pub other_total_class_rank: Option<i64>,
    pub missing_count: Option<i64>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectScoreFields {
    pub subject: String,
    pub score: f64,
    pub grade_rank: Option<i64>,
    pub class_rank: Option<i64>,
    pub class_avg: Option<f64>,
    pub grade_avg: Option<f64>,
    pub scaled_score: Option<f64>,
    pub arts_science_rank: Option<i64>,
}

/// Insert a student or overwrite every field of the existing row.
pub fn upsert_student(conn: &Connection, student: &StudentRecord) -> ScoreResult<()> {
    conn.execute(
        "INSERT INTO students(id, name, class, class_order, gender, student_status, report_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           class = excluded.class,
           class_order = excluded.class_order,
           gender = excluded.gender,
           student_status = excluded.student_status,
           report_id = excluded.report_id",
        params![
            student.id,
            student.name,
            student.class,
            student.class_order,
            student.gender,
            student.student_status,
            student.report_id,
        ],
    )?;
    Ok(())
}

/// Returns `(exam_id, created)`. The UNIQUE constraint on `name` decides the
/// winner when two callers race to create the same exam.
pub fn upsert_exam(
    conn: &Connection,
    name: &str,
    date: Option<&str>,
    exam_type: Option<&str>,
) -> ScoreResult<(i64, bool)> {
    let inserted = conn.execute(
        "INSERT INTO exams(name, date, type) VALUES(?, ?, ?)
         ON CONFLICT(name) DO NOTHING",
        params![name, date, exam_type],
    )?;
    let id: i64 = conn.query_row("SELECT id FROM exams WHERE name = ?", [name], |r| r.get(0))?;
    Ok((id, inserted > 0))
}

/// Delete any result for the pair (its subject scores cascade) and insert a
/// fresh one. Returns the new result id.
pub fn replace_exam_result(
    conn: &Connection,
    student_id: &str,
    exam_id: i64,
    fields: &ExamResultFields,
) -> ScoreResult<i64> {
    conn.execute(
        "DELETE FROM exam_results WHERE student_id = ? AND exam_id = ?",
        params![student_id, exam_id],
    )?;
    conn.execute(
        "INSERT INTO exam_results(
            student_id, exam_id, total_score,
            grade_rank, class_rank, elective_rank,
            other_total_score, other_total_grade_rank, other_total_class_rank,
            missing_count, remarks
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            student_id,
            exam_id,
            fields.total_score,
            fields.grade_rank,
            fields.class_rank,
            fields.elective_rank,
            fields.other_total_score,
            fields.other_total_grade_rank,
            fields.other_total_class_rank,
            fields.missing_count,
            fields.remarks,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replace the subject rows of a result. Returns the number of rows written.
pub fn replace_subject_scores(
    conn: &Connection,
    result_id: i64,
    scores: &[SubjectScoreFields],
) -> ScoreResult<usize> {
    conn.execute("DELETE FROM subject_scores WHERE result_id = ?", [result_id])?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO subject_scores(
            result_id, subject, score,
            grade_rank, class_rank, class_avg, grade_avg,
            scaled_score, arts_science_rank
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for s in scores {
        stmt.execute(params![
            result_id,
            s.subject,
            s.score,
            s.grade_rank,
            s.class_rank,
            s.class_avg,
            s.grade_avg,
            s.scaled_score,
            s.arts_science_rank,
        ])?;
    }
    Ok(scores.len())
}

pub fn list_students(conn: &Connection) -> ScoreResult<Vec<StudentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, class, class_order, gender, student_status, report_id
         FROM students
         ORDER BY class ASC, class_order IS NULL, class_order ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(StudentRecord {
                id: r.get(0)?,
                name: r.get(1)?,
                class: r.get(2)?,
                class_order: r.get(3)?,
                gender: r.get(4)?,
                student_status: r.get(5)?,
                report_id: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn exam_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Exam> {
    Ok(Exam {
        id: r.get(0)?,
        name: r.get(1)?,
        date: r.get(2)?,
        exam_type: r.get(3)?,
    })
}

pub fn list_exams(conn: &Connection) -> ScoreResult<Vec<Exam>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, date, type
         FROM exams
         ORDER BY IFNULL(date, '') DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([], exam_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_exam(conn: &Connection, exam_id: i64) -> ScoreResult<Option<Exam>> {
    let exam = conn
        .query_row(
            "SELECT id, name, date, type FROM exams WHERE id = ?",
            [exam_id],
            exam_from_row,
        )
        .optional()?;
    Ok(exam)
}
