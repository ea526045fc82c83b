use crate::calc;
use crate::config::{Curriculum, TOTAL_SELECTOR};
use crate::error::ScoreResult;
use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    /// Student id.
    pub id: String,
    pub name: String,
    pub class: String,
    pub score: f64,
    pub rank: Option<i64>,
    pub class_rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Total,
    Combination,
    Subject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorEntry {
    pub name: String,
    pub kind: SelectorKind,
    pub subjects: Vec<String>,
}

enum Selector<'a> {
    Total,
    Combination(&'a [String]),
    Subject(&'a str),
}

fn resolve<'a>(curriculum: &'a Curriculum, selector: &'a str) -> Selector<'a> {
    if selector == TOTAL_SELECTOR {
        return Selector::Total;
    }
    match curriculum.combination(selector) {
        Some(c) => Selector::Combination(&c.subjects),
        None => Selector::Subject(selector),
    }
}

/// Every selector the leaderboard accepts: the total, each combination and
/// each curriculum subject.
pub fn selectors(curriculum: &Curriculum) -> Vec<SelectorEntry> {
    let mut out = vec![SelectorEntry {
        name: TOTAL_SELECTOR.to_string(),
        kind: SelectorKind::Total,
        subjects: Vec::new(),
    }];
    out.extend(curriculum.combinations.iter().map(|c| SelectorEntry {
        name: c.name.clone(),
        kind: SelectorKind::Combination,
        subjects: c.subjects.clone(),
    }));
    out.extend(curriculum.subject_names().map(|s| SelectorEntry {
        name: s.to_string(),
        kind: SelectorKind::Subject,
        subjects: vec![s.to_string()],
    }));
    out
}

fn row_with_stored_ranks(r: &rusqlite::Row<'_>) -> rusqlite::Result<LeaderboardRow> {
    Ok(LeaderboardRow {
        id: r.get(0)?,
        name: r.get(1)?,
        class: r.get(2)?,
        score: r.get(3)?,
        rank: r.get(4)?,
        class_rank: r.get(5)?,
    })
}

fn total_board(conn: &Connection, exam_id: i64) -> ScoreResult<Vec<LeaderboardRow>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.class, r.total_score, r.grade_rank, r.class_rank
         FROM exam_results r
         JOIN students s ON r.student_id = s.id
         WHERE r.exam_id = ?
         ORDER BY r.total_score DESC, s.id ASC",
    )?;
    let rows = stmt
        .query_map([exam_id], row_with_stored_ranks)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn subject_board(conn: &Connection, exam_id: i64, subject: &str) -> ScoreResult<Vec<LeaderboardRow>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.class, ss.score, ss.grade_rank, ss.class_rank
         FROM subject_scores ss
         JOIN exam_results r ON ss.result_id = r.id
         JOIN students s ON r.student_id = s.id
         WHERE r.exam_id = ? AND ss.subject = ?
         ORDER BY ss.score DESC, s.id ASC",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![exam_id, subject], row_with_stored_ranks)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn combination_board(
    conn: &Connection,
    exam_id: i64,
    subjects: &[String],
) -> ScoreResult<Vec<LeaderboardRow>> {
    let placeholders = std::iter::repeat("?")
        .take(subjects.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT s.id, s.name, s.class, SUM(ss.score)
         FROM exam_results r
         JOIN students s ON r.student_id = s.id
         JOIN subject_scores ss
           ON ss.result_id = r.id AND ss.subject IN ({})
         WHERE r.exam_id = ?
         GROUP BY r.id",
        placeholders
    );
    let mut bind: Vec<Value> = subjects.iter().map(|s| Value::Text(s.clone())).collect();
    bind.push(Value::Integer(exam_id));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok(LeaderboardRow {
                id: r.get(0)?,
                name: r.get(1)?,
                class: r.get(2)?,
                score: r.get(3)?,
                rank: None,
                class_rank: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let sums: Vec<f64> = rows.iter().map(|r| r.score).collect();
    for (row, rank) in rows.iter_mut().zip(calc::competition_ranks(&sums)) {
        row.rank = Some(rank);
    }

    let mut by_class: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        by_class.entry(row.class.clone()).or_default().push(idx);
    }
    for members in by_class.values() {
        let class_sums: Vec<f64> = members.iter().map(|&i| rows[i].score).collect();
        for (&i, rank) in members.iter().zip(calc::competition_ranks(&class_sums)) {
            rows[i].class_rank = Some(rank);
        }
    }
    Ok(rows)
}

/// Ranked rows for `selector` in one exam. Unknown selectors are treated as
/// subject names and so match nothing.
pub fn leaderboard(
    conn: &Connection,
    curriculum: &Curriculum,
    exam_id: i64,
    selector: &str,
) -> ScoreResult<Vec<LeaderboardRow>> {
    match resolve(curriculum, selector) {
        Selector::Total => total_board(conn, exam_id),
        Selector::Combination(subjects) => combination_board(conn, exam_id, subjects),
        Selector::Subject(subject) => subject_board(conn, exam_id, subject),
    }
}
