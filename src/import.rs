use crate::backup;
use crate::config::Curriculum;
use crate::db::ScoreStore;
use crate::error::{ScoreError, ScoreResult};
use crate::store::{self, ExamResultFields, StudentRecord, SubjectScoreFields};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

// Pseudo-subject keys that some feeds put in the subjects list next to real
// subjects. They describe the student or the result, never a paper.
const KEY_STUDENT_ID: &str = "考号";
const KEY_REPORT_ID: &str = "报到号";
const KEY_GENDER: &str = "性别";
const KEY_CLASS_ORDER: &str = "班序";
const KEY_STATUS: &str = "学籍";
const KEY_GRADE_RANK: &str = "总分年名";
const KEY_CLASS_RANK: &str = "总分班名";
const KEY_ELECTIVE_RANK: &str = "选科名次";
const KEY_OTHER_TOTAL: [&str; 2] = ["其它总分", "其他总分"];
const KEY_OTHER_GRADE_RANK: [&str; 2] = ["其它总分年名", "其他总分年名"];
const KEY_OTHER_CLASS_RANK: [&str; 2] = ["其它总分班名", "其他总分班名"];
const KEY_MISSING_COUNT: &str = "缺考门次";
const KEY_REMARKS: &str = "备注";

const SUFFIX_GRADE_RANK: &str = "年名";
const SUFFIX_CLASS_RANK: &str = "班名";
const SUFFIX_SCALED: &str = "赋分";
const SUFFIX_ARTS_SCIENCE_RANK: &str = "文理名次";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectEntry {
    pub subject: String,
    #[serde(default)]
    pub score: serde_json::Value,
    #[serde(default)]
    pub grade_rank: Option<serde_json::Value>,
    #[serde(default)]
    pub class_rank: Option<serde_json::Value>,
    #[serde(default)]
    pub class_avg: Option<serde_json::Value>,
    #[serde(default)]
    pub grade_avg: Option<serde_json::Value>,
    #[serde(default)]
    pub scaled_score: Option<serde_json::Value>,
    #[serde(default)]
    pub arts_science_rank: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRow {
    #[serde(default)]
    pub student_id: Option<serde_json::Value>,
    #[serde(default)]
    pub student_name: Option<serde_json::Value>,
    #[serde(default)]
    pub class_name: Option<serde_json::Value>,
    #[serde(default)]
    pub total_score: Option<serde_json::Value>,
    #[serde(default)]
    pub subjects: Vec<SubjectEntry>,
}

#[derive(Debug, Clone)]
pub struct ImportPayload {
    pub exam_name: String,
    pub exam_date: Option<String>,
    pub exam_type: Option<String>,
    pub rows: Vec<ImportRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub index: usize,
    pub student_name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub exam_id: i64,
    pub exam_name: String,
    pub exam_created: bool,
    pub imported_rows: usize,
    pub subject_scores: usize,
    pub skipped: Vec<SkippedRow>,
    pub backup_path: Option<String>,
}

fn optional_text_param(
    params: &serde_json::Value,
    key: &str,
) -> ScoreResult<Option<String>> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Ok(Some(s.trim().to_string())),
            None => Err(ScoreError::bad_params(format!("{} must be a string or null", key))),
        },
    }
}

/// Validate an `import.exam` request before anything touches storage.
pub fn parse_payload(params: &serde_json::Value) -> ScoreResult<ImportPayload> {
    let exam_name = params
        .get("examName")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScoreError::bad_params("missing examName"))?;
    let Some(data) = params.get("data").and_then(|v| v.as_array()) else {
        return Err(ScoreError::bad_params("data must be an array"));
    };
    let exam_date = optional_text_param(params, "examDate")?;
    let exam_type = optional_text_param(params, "examType")?;

    let mut rows = Vec::with_capacity(data.len());
    for (index, raw) in data.iter().enumerate() {
        let row: ImportRow = serde_json::from_value(raw.clone()).map_err(|e| {
            ScoreError::bad_params(format!("data[{}] is malformed: {}", index, e))
                .with_details(json!({ "row": index }))
        })?;
        rows.push(row);
    }

    Ok(ImportPayload {
        exam_name,
        exam_date,
        exam_type,
        rows,
    })
}

pub fn classify_exam_type(name: &str) -> &'static str {
    if name.contains("期中") {
        "期中"
    } else if name.contains("期末") {
        "期末"
    } else {
        "月考"
    }
}

fn as_number(v: &serde_json::Value) -> Option<f64> {
    let n = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|x| x.is_finite())
}

fn as_rank(v: &serde_json::Value) -> Option<i64> {
    as_number(v).map(|x| x.round() as i64)
}

fn as_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        serde_json::Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        _ => None,
    }
}

/// Identifiers arrive as numbers or strings, sometimes with a spreadsheet
/// fractional part (`66641354.0`); only the integral part is the key.
fn natural_key(v: &serde_json::Value) -> Option<String> {
    let key = match v {
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().map(|f| (f.trunc() as i64).to_string())?,
        },
        serde_json::Value::String(s) => s.trim().split('.').next().unwrap_or("").to_string(),
        _ => return None,
    };
    (!key.is_empty()).then_some(key)
}

/// Everything in a row that is not an academic subject score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMetadata {
    pub student_id: Option<String>,
    pub report_id: Option<String>,
    pub gender: Option<String>,
    pub class_order: Option<i64>,
    pub student_status: Option<String>,
    pub result: ExamResultFields,
}

struct RowIndex<'a> {
    entries: HashMap<&'a str, &'a SubjectEntry>,
}

impl<'a> RowIndex<'a> {
    fn new(row: &'a ImportRow) -> Self {
        // Later entries win, matching spreadsheet column order.
        let entries = row
            .subjects
            .iter()
            .map(|e| (e.subject.trim(), e))
            .collect();
        Self { entries }
    }

    fn value(&self, key: &str) -> Option<&'a serde_json::Value> {
        self.entries.get(key).copied().map(|e| &e.score)
    }

    fn first_value(&self, keys: &[&str]) -> Option<&'a serde_json::Value> {
        keys.iter().find_map(|k| self.value(k))
    }

    fn entry(&self, key: &str) -> Option<&'a SubjectEntry> {
        self.entries.get(key).copied()
    }
}

fn extract_metadata(row: &ImportRow, index: &RowIndex<'_>) -> RowMetadata {
    let student_id = row
        .student_id
        .as_ref()
        .and_then(natural_key)
        .or_else(|| index.value(KEY_STUDENT_ID).and_then(natural_key));

    RowMetadata {
        student_id,
        report_id: index.value(KEY_REPORT_ID).and_then(natural_key),
        gender: index.value(KEY_GENDER).and_then(as_text),
        class_order: index.value(KEY_CLASS_ORDER).and_then(as_rank),
        student_status: index.value(KEY_STATUS).and_then(as_text),
        result: ExamResultFields {
            total_score: 0.0,
            grade_rank: index.value(KEY_GRADE_RANK).and_then(as_rank),
            class_rank: index.value(KEY_CLASS_RANK).and_then(as_rank),
            elective_rank: index.value(KEY_ELECTIVE_RANK).and_then(as_rank),
            other_total_score: index.first_value(&KEY_OTHER_TOTAL).and_then(as_number),
            other_total_grade_rank: index.first_value(&KEY_OTHER_GRADE_RANK).and_then(as_rank),
            other_total_class_rank: index.first_value(&KEY_OTHER_CLASS_RANK).and_then(as_rank),
            missing_count: index.value(KEY_MISSING_COUNT).and_then(as_rank),
            remarks: index.value(KEY_REMARKS).and_then(as_text),
        },
    }
}

fn explicit_or_suffixed<T>(
    explicit: Option<&serde_json::Value>,
    index: &RowIndex<'_>,
    subject: &str,
    suffix: &str,
    convert: fn(&serde_json::Value) -> Option<T>,
) -> Option<T> {
    explicit.and_then(convert).or_else(|| {
        index
            .value(&format!("{}{}", subject, suffix))
            .and_then(convert)
    })
}

/// Academic subjects only, in curriculum order. A subject whose score is
/// absent or non-numeric is left out so it never counts as a zero.
fn extract_subjects(index: &RowIndex<'_>, curriculum: &Curriculum) -> Vec<SubjectScoreFields> {
    let mut out = Vec::new();
    for name in curriculum.subject_names() {
        let Some(entry) = index.entry(name) else {
            continue;
        };
        let Some(score) = as_number(&entry.score) else {
            continue;
        };
        out.push(SubjectScoreFields {
            subject: name.to_string(),
            score,
            grade_rank: explicit_or_suffixed(
                entry.grade_rank.as_ref(),
                index,
                name,
                SUFFIX_GRADE_RANK,
                as_rank,
            ),
            class_rank: explicit_or_suffixed(
                entry.class_rank.as_ref(),
                index,
                name,
                SUFFIX_CLASS_RANK,
                as_rank,
            ),
            class_avg: entry.class_avg.as_ref().and_then(as_number),
            grade_avg: entry.grade_avg.as_ref().and_then(as_number),
            scaled_score: explicit_or_suffixed(
                entry.scaled_score.as_ref(),
                index,
                name,
                SUFFIX_SCALED,
                as_number,
            ),
            arts_science_rank: explicit_or_suffixed(
                entry.arts_science_rank.as_ref(),
                index,
                name,
                SUFFIX_ARTS_SCIENCE_RANK,
                as_rank,
            ),
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub metadata: RowMetadata,
    pub subjects: Vec<SubjectScoreFields>,
}

pub fn extract_row(row: &ImportRow, curriculum: &Curriculum) -> ExtractedRow {
    let index = RowIndex::new(row);
    let mut metadata = extract_metadata(row, &index);
    let subjects = extract_subjects(&index, curriculum);
    metadata.result.total_score = row
        .total_score
        .as_ref()
        .and_then(as_number)
        .unwrap_or_else(|| subjects.iter().map(|s| s.score).sum());
    ExtractedRow { metadata, subjects }
}

fn take_backup(store: &ScoreStore) -> Option<String> {
    let db_path = store.db_path()?;
    let backup_dir = db_path.parent()?.join(backup::BACKUP_DIR);
    match backup::backup_database(db_path, &backup_dir) {
        Ok(Some(p)) => {
            tracing::info!(path = %p.display(), "database backed up before import");
            Some(p.to_string_lossy().to_string())
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "backup before import failed; continuing");
            None
        }
    }
}

struct Applied {
    exam_id: i64,
    exam_created: bool,
    imported_rows: usize,
    subject_scores: usize,
    skipped: Vec<SkippedRow>,
}

fn apply_rows(
    conn: &rusqlite::Connection,
    curriculum: &Curriculum,
    payload: &ImportPayload,
) -> ScoreResult<Applied> {
    let exam_type = payload
        .exam_type
        .clone()
        .unwrap_or_else(|| classify_exam_type(&payload.exam_name).to_string());
    let (exam_id, exam_created) = store::upsert_exam(
        conn,
        &payload.exam_name,
        payload.exam_date.as_deref(),
        Some(&exam_type),
    )?;

    let mut applied = Applied {
        exam_id,
        exam_created,
        imported_rows: 0,
        subject_scores: 0,
        skipped: Vec::new(),
    };

    for (index, row) in payload.rows.iter().enumerate() {
        let extracted = extract_row(row, curriculum);
        let student_name = row.student_name.as_ref().and_then(as_text);
        let Some(student_id) = extracted.metadata.student_id.clone() else {
            tracing::warn!(
                row = index,
                student = student_name.as_deref().unwrap_or(""),
                "skipping row without a student id"
            );
            applied.skipped.push(SkippedRow {
                index,
                student_name,
                reason: "missing student id".to_string(),
            });
            continue;
        };

        let row_err = |e: ScoreError| {
            ScoreError::new("db_import_failed", e.message)
                .with_details(json!({ "row": index, "studentId": student_id.clone() }))
        };

        let student = StudentRecord {
            id: student_id.clone(),
            name: student_name.unwrap_or_else(|| student_id.clone()),
            class: row
                .class_name
                .as_ref()
                .and_then(as_text)
                .unwrap_or_default(),
            class_order: extracted.metadata.class_order,
            gender: extracted.metadata.gender.clone(),
            student_status: extracted.metadata.student_status.clone(),
            report_id: extracted.metadata.report_id.clone(),
        };
        store::upsert_student(conn, &student).map_err(row_err)?;
        let result_id =
            store::replace_exam_result(conn, &student_id, exam_id, &extracted.metadata.result)
                .map_err(row_err)?;
        applied.subject_scores +=
            store::replace_subject_scores(conn, result_id, &extracted.subjects).map_err(row_err)?;
        applied.imported_rows += 1;
    }

    Ok(applied)
}

/// Load one exam's rows atomically: either every row lands or none does.
/// Rows without a student id are skipped and reported, not fatal.
pub fn import_exam(
    store: &ScoreStore,
    curriculum: &Curriculum,
    payload: &ImportPayload,
) -> ScoreResult<ImportSummary> {
    let backup_path = take_backup(store);

    let conn = store.conn();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ScoreError::new("db_tx_failed", e.to_string()))?;
    let applied = match apply_rows(&tx, curriculum, payload) {
        Ok(a) => a,
        Err(e) => {
            let _ = tx.rollback();
            tracing::warn!(exam = %payload.exam_name, error = %e, "import rolled back");
            return Err(e);
        }
    };
    tx.commit()
        .map_err(|e| ScoreError::new("db_commit_failed", e.to_string()))?;

    tracing::info!(
        exam = %payload.exam_name,
        exam_id = applied.exam_id,
        rows = applied.imported_rows,
        skipped = applied.skipped.len(),
        "import completed"
    );

    Ok(ImportSummary {
        exam_id: applied.exam_id,
        exam_name: payload.exam_name.clone(),
        exam_created: applied.exam_created,
        imported_rows: applied.imported_rows,
        subject_scores: applied.subject_scores,
        skipped: applied.skipped,
        backup_path,
    })
}
