use crate::error::ScoreResult;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedDiagnosis {
    pub result: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisKey<'a> {
    pub student_id: &'a str,
    pub exam_id: i64,
    pub intent: &'a str,
    pub model: &'a str,
}

pub fn get(conn: &Connection, key: &DiagnosisKey<'_>) -> ScoreResult<Option<CachedDiagnosis>> {
    let row = conn
        .query_row(
            "SELECT result, created_at
             FROM ai_diagnoses
             WHERE student_id = ? AND exam_id = ? AND intent = ? AND model = ?",
            params![key.student_id, key.exam_id, key.intent, key.model],
            |r| {
                Ok(CachedDiagnosis {
                    result: r.get(0)?,
                    created_at: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Store `result` for the key, replacing any earlier entry. Returns the
/// timestamp written.
pub fn put(conn: &Connection, key: &DiagnosisKey<'_>, result: &str) -> ScoreResult<String> {
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    conn.execute(
        "INSERT OR REPLACE INTO ai_diagnoses(student_id, exam_id, intent, model, result, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![
            key.student_id,
            key.exam_id,
            key.intent,
            key.model,
            result,
            created_at
        ],
    )?;
    Ok(created_at)
}

/// Distinct intents cached for a student's exam, any model.
pub fn intents(conn: &Connection, student_id: &str, exam_id: i64) -> ScoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT intent
         FROM ai_diagnoses
         WHERE student_id = ? AND exam_id = ?
         ORDER BY intent",
    )?;
    let rows = stmt
        .query_map(params![student_id, exam_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}
