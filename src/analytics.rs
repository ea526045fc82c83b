//! Read-side aggregation over the score store.
//!
//! Nothing here writes. Every figure is recomputed from the stored rows on
//! each call, so results reflect an import as soon as it commits.

use crate::calc;
use crate::config::{Curriculum, BENCHMARK_FALLBACK_SAMPLE, BENCHMARK_RANK_WINDOW};
use crate::error::ScoreResult;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectResult {
    pub subject: String,
    pub score: f64,
    pub grade_rank: Option<i64>,
    pub class_rank: Option<i64>,
    pub class_avg: Option<f64>,
    pub grade_avg: Option<f64>,
    pub scaled_score: Option<f64>,
    pub arts_science_rank: Option<i64>,
    pub full_mark: f64,
    pub score_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentExamResult {
    /// Result row id.
    pub id: i64,
    pub exam_id: i64,
    pub exam_name: String,
    pub date: Option<String>,
    pub student_id: String,
    pub student_name: String,
    pub class: String,
    pub total_score: f64,
    pub grade_rank: Option<i64>,
    pub class_rank: Option<i64>,
    pub elective_rank: Option<i64>,
    pub other_total_score: Option<f64>,
    pub other_total_grade_rank: Option<i64>,
    pub other_total_class_rank: Option<i64>,
    pub missing_count: Option<i64>,
    pub remarks: Option<String>,
    pub subjects: Vec<SubjectResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub exam_id: i64,
    pub name: String,
    pub date: Option<String>,
    pub result_id: i64,
    pub total_score: f64,
    pub grade_rank: Option<i64>,
    pub class_rank: Option<i64>,
    pub subjects: Vec<SubjectResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamListEntry {
    pub exam_id: i64,
    pub name: String,
    pub date: Option<String>,
    pub total_score: f64,
    pub grade_rank: Option<i64>,
    pub class_rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRank {
    pub subject: String,
    pub grade_rank: Option<i64>,
    pub class_rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReference {
    #[serde(rename = "targetRank")]
    pub target_rank: i64,
    /// Benchmark median of the sample's totals.
    pub total_score: f64,
    pub subjects: BTreeMap<String, f64>,
    /// Cohort-wide mean per subject for the exam, over every result, not
    /// just the sample.
    pub difficulty: BTreeMap<String, f64>,
    pub sample_size: usize,
    pub used_fallback: bool,
}

/// Read-only view over a store connection plus the curriculum used for
/// full marks.
#[derive(Debug, Clone, Copy)]
pub struct Analytics<'a> {
    pub conn: &'a Connection,
    pub curriculum: &'a Curriculum,
}

struct ResultHeader {
    result_id: i64,
    exam_id: i64,
    exam_name: String,
    date: Option<String>,
    student_id: String,
    student_name: String,
    class: String,
    total_score: f64,
    grade_rank: Option<i64>,
    class_rank: Option<i64>,
    elective_rank: Option<i64>,
    other_total_score: Option<f64>,
    other_total_grade_rank: Option<i64>,
    other_total_class_rank: Option<i64>,
    missing_count: Option<i64>,
    remarks: Option<String>,
}

const RESULT_HEADER_SELECT: &str = "SELECT r.id, r.exam_id, e.name, e.date, s.id, s.name, s.class,
        r.total_score, r.grade_rank, r.class_rank, r.elective_rank,
        r.other_total_score, r.other_total_grade_rank, r.other_total_class_rank,
        r.missing_count, r.remarks
     FROM exam_results r
     JOIN exams e ON r.exam_id = e.id
     JOIN students s ON r.student_id = s.id";

fn result_header_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ResultHeader> {
    Ok(ResultHeader {
        result_id: r.get(0)?,
        exam_id: r.get(1)?,
        exam_name: r.get(2)?,
        date: r.get(3)?,
        student_id: r.get(4)?,
        student_name: r.get(5)?,
        class: r.get(6)?,
        total_score: r.get(7)?,
        grade_rank: r.get(8)?,
        class_rank: r.get(9)?,
        elective_rank: r.get(10)?,
        other_total_score: r.get(11)?,
        other_total_grade_rank: r.get(12)?,
        other_total_class_rank: r.get(13)?,
        missing_count: r.get(14)?,
        remarks: r.get(15)?,
    })
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

impl<'a> Analytics<'a> {
    pub fn new(conn: &'a Connection, curriculum: &'a Curriculum) -> Self {
        Self { conn, curriculum }
    }

    fn load_subjects(&self, result_id: i64) -> ScoreResult<Vec<SubjectResult>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT subject, score, grade_rank, class_rank, class_avg, grade_avg,
                    scaled_score, arts_science_rank
             FROM subject_scores
             WHERE result_id = ?
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([result_id], |r| {
                let subject: String = r.get(0)?;
                let score: f64 = r.get(1)?;
                let full_mark = self.curriculum.full_mark(&subject);
                Ok(SubjectResult {
                    score_rate: calc::score_rate(score, full_mark),
                    full_mark,
                    subject,
                    score,
                    grade_rank: r.get(2)?,
                    class_rank: r.get(3)?,
                    class_avg: r.get(4)?,
                    grade_avg: r.get(5)?,
                    scaled_score: r.get(6)?,
                    arts_science_rank: r.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn collect_averages(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> ScoreResult<HashMap<String, f64>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, Option<f64>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(subject, avg)| avg.map(|a| (subject, calc::round_off_1_decimal(a))))
            .collect())
    }

    /// Per-subject mean score over one class for an exam, 1 decimal. Only
    /// students who sat the subject count.
    pub fn class_averages(&self, exam_id: i64, class: &str) -> ScoreResult<HashMap<String, f64>> {
        self.collect_averages(
            "SELECT ss.subject, AVG(ss.score)
             FROM subject_scores ss
             JOIN exam_results er ON ss.result_id = er.id
             JOIN students s ON er.student_id = s.id
             WHERE er.exam_id = ? AND s.class = ?
             GROUP BY ss.subject",
            params![exam_id, class],
        )
    }

    /// Per-subject mean score over the whole cohort for an exam, 1 decimal.
    pub fn grade_averages(&self, exam_id: i64) -> ScoreResult<HashMap<String, f64>> {
        self.collect_averages(
            "SELECT ss.subject, AVG(ss.score)
             FROM subject_scores ss
             JOIN exam_results er ON ss.result_id = er.id
             WHERE er.exam_id = ?
             GROUP BY ss.subject",
            [exam_id],
        )
    }

    /// A student's result for `exam_id`, or for their latest exam when no
    /// exam is given. Stored averages are kept; absent ones are computed live.
    pub fn student_exam_result(
        &self,
        student_id: &str,
        exam_id: Option<i64>,
    ) -> ScoreResult<Option<StudentExamResult>> {
        let header = match exam_id {
            Some(exam_id) => self
                .conn
                .query_row(
                    &format!("{} WHERE r.student_id = ? AND r.exam_id = ?", RESULT_HEADER_SELECT),
                    params![student_id, exam_id],
                    result_header_from_row,
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    &format!(
                        "{} WHERE r.student_id = ?
                         ORDER BY IFNULL(e.date, '') DESC, e.id DESC
                         LIMIT 1",
                        RESULT_HEADER_SELECT
                    ),
                    [student_id],
                    result_header_from_row,
                )
                .optional()?,
        };
        let Some(h) = header else {
            return Ok(None);
        };

        let class_avgs = self.class_averages(h.exam_id, &h.class)?;
        let grade_avgs = self.grade_averages(h.exam_id)?;
        let subjects = self
            .load_subjects(h.result_id)?
            .into_iter()
            .map(|mut s| {
                if s.class_avg.is_none() {
                    s.class_avg = class_avgs.get(&s.subject).copied();
                }
                if s.grade_avg.is_none() {
                    s.grade_avg = grade_avgs.get(&s.subject).copied();
                }
                s
            })
            .collect();

        Ok(Some(StudentExamResult {
            id: h.result_id,
            exam_id: h.exam_id,
            exam_name: h.exam_name,
            date: h.date,
            student_id: h.student_id,
            student_name: h.student_name,
            class: h.class,
            total_score: h.total_score,
            grade_rank: h.grade_rank,
            class_rank: h.class_rank,
            elective_rank: h.elective_rank,
            other_total_score: h.other_total_score,
            other_total_grade_rank: h.other_total_grade_rank,
            other_total_class_rank: h.other_total_class_rank,
            missing_count: h.missing_count,
            remarks: h.remarks,
            subjects,
        }))
    }

    /// The student's `limit` most recent exams, oldest first, with live grade
    /// averages filled in for volatility work downstream.
    pub fn student_trend(&self, student_id: &str, limit: i64) -> ScoreResult<Vec<TrendPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT exam_id, name, date, result_id, total_score, grade_rank, class_rank
             FROM (
                SELECT e.id AS exam_id, e.name AS name, e.date AS date, r.id AS result_id,
                       r.total_score AS total_score, r.grade_rank AS grade_rank,
                       r.class_rank AS class_rank
                FROM exams e
                JOIN exam_results r ON e.id = r.exam_id
                WHERE r.student_id = ?
                ORDER BY IFNULL(e.date, '') DESC, e.id DESC
                LIMIT ?
             )
             ORDER BY IFNULL(date, '') ASC, exam_id ASC",
        )?;
        let headers = stmt
            .query_map(params![student_id, limit.max(0)], |r| {
                Ok(TrendPoint {
                    exam_id: r.get(0)?,
                    name: r.get(1)?,
                    date: r.get(2)?,
                    result_id: r.get(3)?,
                    total_score: r.get(4)?,
                    grade_rank: r.get(5)?,
                    class_rank: r.get(6)?,
                    subjects: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(headers.len());
        for mut point in headers {
            let grade_avgs = self.grade_averages(point.exam_id)?;
            point.subjects = self
                .load_subjects(point.result_id)?
                .into_iter()
                .map(|mut s| {
                    if s.grade_avg.is_none() {
                        s.grade_avg = grade_avgs.get(&s.subject).copied();
                    }
                    s
                })
                .collect();
            out.push(point);
        }
        Ok(out)
    }

    /// Exam selector list for a student, newest first. No subject rows.
    pub fn student_exams(&self, student_id: &str) -> ScoreResult<Vec<ExamListEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.name, e.date, r.total_score, r.grade_rank, r.class_rank
             FROM exams e
             JOIN exam_results r ON e.id = r.exam_id
             WHERE r.student_id = ?
             ORDER BY IFNULL(e.date, '') DESC, e.id DESC",
        )?;
        let rows = stmt
            .query_map([student_id], exam_list_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The exam sat by the student immediately before the given one: an
    /// earlier date, or the same date with a smaller exam id.
    pub fn previous_exam(
        &self,
        student_id: &str,
        current_date: Option<&str>,
        current_exam_id: i64,
    ) -> ScoreResult<Option<(i64, ExamListEntry)>> {
        let prev = self
            .conn
            .query_row(
                "SELECT r.id, e.id, e.name, e.date, r.total_score, r.grade_rank, r.class_rank
                 FROM exam_results r
                 JOIN exams e ON r.exam_id = e.id
                 WHERE r.student_id = ?1 AND (
                    IFNULL(e.date, '') < IFNULL(?2, '')
                    OR (IFNULL(e.date, '') = IFNULL(?2, '') AND e.id < ?3)
                 )
                 ORDER BY IFNULL(e.date, '') DESC, e.id DESC
                 LIMIT 1",
                params![student_id, current_date, current_exam_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        ExamListEntry {
                            exam_id: r.get(1)?,
                            name: r.get(2)?,
                            date: r.get(3)?,
                            total_score: r.get(4)?,
                            grade_rank: r.get(5)?,
                            class_rank: r.get(6)?,
                        },
                    ))
                },
            )
            .optional()?;
        Ok(prev)
    }

    /// Subject ranks from the previous exam; empty for a first exam.
    pub fn previous_subjects(
        &self,
        student_id: &str,
        current_date: Option<&str>,
        current_exam_id: i64,
    ) -> ScoreResult<Vec<SubjectRank>> {
        let Some((result_id, _)) = self.previous_exam(student_id, current_date, current_exam_id)?
        else {
            return Ok(Vec::new());
        };
        let mut stmt = self.conn.prepare_cached(
            "SELECT subject, grade_rank, class_rank
             FROM subject_scores
             WHERE result_id = ?
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([result_id], |r| {
                Ok(SubjectRank {
                    subject: r.get(0)?,
                    grade_rank: r.get(1)?,
                    class_rank: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn benchmark_sample(&self, exam_id: i64, target_rank: i64) -> ScoreResult<(Vec<(i64, f64)>, bool)> {
        let mut window = self.conn.prepare_cached(
            "SELECT id, total_score
             FROM exam_results
             WHERE exam_id = ? AND grade_rank BETWEEN ? AND ?
             ORDER BY id",
        )?;
        let sample = window
            .query_map(
                params![
                    exam_id,
                    target_rank.saturating_sub(BENCHMARK_RANK_WINDOW),
                    target_rank.saturating_add(BENCHMARK_RANK_WINDOW)
                ],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        if !sample.is_empty() {
            return Ok((sample, false));
        }

        let mut nearest = self.conn.prepare_cached(
            "SELECT id, total_score
             FROM exam_results
             WHERE exam_id = ? AND grade_rank IS NOT NULL
             ORDER BY ABS(grade_rank - ?) ASC, id ASC
             LIMIT ?",
        )?;
        let sample = nearest
            .query_map(
                params![exam_id, target_rank, BENCHMARK_FALLBACK_SAMPLE],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((sample, true))
    }

    /// Score profile of students ranked near `target_rank`, or `None` when
    /// the exam has no ranked results to sample.
    pub fn target_reference(
        &self,
        exam_id: i64,
        target_rank: i64,
    ) -> ScoreResult<Option<TargetReference>> {
        let (sample, used_fallback) = self.benchmark_sample(exam_id, target_rank)?;
        let totals: Vec<f64> = sample.iter().map(|(_, total)| *total).collect();
        let Some(total_score) = calc::benchmark_median(&totals) else {
            return Ok(None);
        };

        let ids: Vec<Value> = sample.iter().map(|(id, _)| Value::Integer(*id)).collect();
        let sql = format!(
            "SELECT subject, score FROM subject_scores WHERE result_id IN ({}) ORDER BY id",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let scores = stmt
            .query_map(params_from_iter(ids), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (subject, score) in scores {
            by_subject.entry(subject).or_default().push(score);
        }
        let subjects = by_subject
            .into_iter()
            .filter_map(|(subject, values)| calc::benchmark_median(&values).map(|m| (subject, m)))
            .collect();

        let difficulty = self.grade_averages(exam_id)?.into_iter().collect();

        Ok(Some(TargetReference {
            target_rank,
            total_score,
            subjects,
            difficulty,
            sample_size: sample.len(),
            used_fallback,
        }))
    }
}

fn exam_list_entry_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ExamListEntry> {
    Ok(ExamListEntry {
        exam_id: r.get(0)?,
        name: r.get(1)?,
        date: r.get(2)?,
        total_score: r.get(3)?,
        grade_rank: r.get(4)?,
        class_rank: r.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScoreStore;
    use crate::store::{
        replace_exam_result, replace_subject_scores, upsert_exam, upsert_student,
        ExamResultFields, StudentRecord, SubjectScoreFields,
    };

    struct Fixture {
        store: ScoreStore,
        curriculum: Curriculum,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: ScoreStore::open_in_memory().expect("open"),
                curriculum: Curriculum::default(),
            }
        }

        fn analytics(&self) -> Analytics<'_> {
            Analytics::new(self.store.conn(), &self.curriculum)
        }

        fn student(&self, id: &str, class: &str) {
            upsert_student(
                self.store.conn(),
                &StudentRecord {
                    id: id.to_string(),
                    name: format!("学生{}", id),
                    class: class.to_string(),
                    ..Default::default()
                },
            )
            .expect("student");
        }

        fn exam(&self, name: &str, date: Option<&str>) -> i64 {
            upsert_exam(self.store.conn(), name, date, None).expect("exam").0
        }

        fn result(
            &self,
            student: &str,
            exam_id: i64,
            total: f64,
            grade_rank: Option<i64>,
            subjects: &[(&str, f64, Option<i64>)],
        ) -> i64 {
            let conn = self.store.conn();
            let id = replace_exam_result(
                conn,
                student,
                exam_id,
                &ExamResultFields {
                    total_score: total,
                    grade_rank,
                    ..Default::default()
                },
            )
            .expect("result");
            let rows: Vec<SubjectScoreFields> = subjects
                .iter()
                .map(|(name, score, rank)| SubjectScoreFields {
                    subject: name.to_string(),
                    score: *score,
                    grade_rank: *rank,
                    ..Default::default()
                })
                .collect();
            replace_subject_scores(conn, id, &rows).expect("subjects");
            id
        }
    }

    #[test]
    fn missing_subject_is_excluded_from_class_and_grade_averages() {
        let f = Fixture::new();
        f.student("a", "1班");
        f.student("b", "1班");
        f.student("c", "2班");
        let exam = f.exam("月考一", Some("2024-10-01"));
        f.result("a", exam, 200.0, Some(1), &[("语文", 100.0, None), ("物理", 100.0, None)]);
        f.result("b", exam, 90.0, Some(2), &[("语文", 90.0, None)]);
        f.result("c", exam, 125.0, Some(3), &[("语文", 65.0, None), ("物理", 60.0, None)]);

        let a = f.analytics();
        let b = a.student_exam_result("b", Some(exam)).expect("query").expect("found");
        assert_eq!(b.subjects.len(), 1, "no zero-filled physics row");
        assert_eq!(b.subjects[0].class_avg, Some(95.0));
        assert_eq!(b.subjects[0].grade_avg, Some(85.0));

        let a_res = a.student_exam_result("a", Some(exam)).expect("query").expect("found");
        let physics = a_res
            .subjects
            .iter()
            .find(|s| s.subject == "物理")
            .expect("physics");
        // Only a (100) sat physics in 1班; b is absent, not zero.
        assert_eq!(physics.class_avg, Some(100.0));
        assert_eq!(physics.grade_avg, Some(80.0));
        assert_eq!(physics.full_mark, 100.0);
        let chinese = &a_res.subjects[0];
        assert_eq!(chinese.full_mark, 150.0);
        assert_eq!(chinese.score_rate, 66.7);
    }

    #[test]
    fn stored_averages_are_kept_including_zero() {
        let f = Fixture::new();
        f.student("a", "1班");
        let exam = f.exam("月考一", None);
        let rid = replace_exam_result(
            f.store.conn(),
            "a",
            exam,
            &ExamResultFields {
                total_score: 50.0,
                ..Default::default()
            },
        )
        .expect("result");
        replace_subject_scores(
            f.store.conn(),
            rid,
            &[SubjectScoreFields {
                subject: "数学".into(),
                score: 50.0,
                class_avg: Some(0.0),
                grade_avg: Some(71.25),
                ..Default::default()
            }],
        )
        .expect("subjects");
        let res = f
            .analytics()
            .student_exam_result("a", None)
            .expect("query")
            .expect("found");
        assert_eq!(res.subjects[0].class_avg, Some(0.0));
        assert_eq!(res.subjects[0].grade_avg, Some(71.25));
    }

    #[test]
    fn latest_exam_prefers_dated_exams_and_higher_id() {
        let f = Fixture::new();
        f.student("a", "1班");
        let undated = f.exam("无日期", None);
        let older = f.exam("九月", Some("2024-09-01"));
        let newer = f.exam("十月", Some("2024-10-01"));
        for e in [undated, older, newer] {
            f.result("a", e, e as f64, None, &[]);
        }
        let a = f.analytics();
        let latest = a.student_exam_result("a", None).expect("q").expect("found");
        assert_eq!(latest.exam_id, newer);
        assert!(a.student_exam_result("nobody", None).expect("q").is_none());
        assert!(a.student_exam_result("a", Some(9999)).expect("q").is_none());

        let listed: Vec<i64> = a
            .student_exams("a")
            .expect("exams")
            .iter()
            .map(|e| e.exam_id)
            .collect();
        assert_eq!(listed, vec![newer, older, undated]);
    }

    #[test]
    fn trend_keeps_most_recent_exams_oldest_first() {
        let f = Fixture::new();
        f.student("a", "1班");
        f.student("b", "1班");
        let e1 = f.exam("一", Some("2024-09-01"));
        let e2 = f.exam("二", Some("2024-10-01"));
        let e3 = f.exam("三", Some("2024-11-01"));
        for e in [e1, e2, e3] {
            f.result("a", e, 100.0, None, &[("数学", 100.0, None)]);
            f.result("b", e, 80.0, None, &[("数学", 80.0, None)]);
        }
        let trend = f.analytics().student_trend("a", 2).expect("trend");
        let ids: Vec<i64> = trend.iter().map(|p| p.exam_id).collect();
        assert_eq!(ids, vec![e2, e3]);
        assert_eq!(trend[0].subjects[0].grade_avg, Some(90.0));
        assert!(f.analytics().student_trend("a", 0).expect("trend").is_empty());
    }

    #[test]
    fn previous_exam_on_same_date_uses_smaller_id() {
        let f = Fixture::new();
        f.student("a", "1班");
        let older = f.exam("更早", Some("2024-05-01"));
        let mut same_day = Vec::new();
        for name in ["上午", "插入", "下午"] {
            same_day.push(f.exam(name, Some("2024-06-01")));
        }
        // a sat the first and last of the same-day exams only.
        f.result("a", older, 1.0, None, &[("语文", 1.0, Some(99))]);
        f.result("a", same_day[0], 2.0, None, &[("语文", 2.0, Some(50))]);
        f.result("a", same_day[2], 3.0, None, &[("语文", 3.0, Some(30))]);

        let a = f.analytics();
        let (_, prev) = a
            .previous_exam("a", Some("2024-06-01"), same_day[2])
            .expect("q")
            .expect("found");
        assert_eq!(prev.exam_id, same_day[0]);
        let ranks = a
            .previous_subjects("a", Some("2024-06-01"), same_day[2])
            .expect("q");
        assert_eq!(ranks.len(), 1);
        assert_eq!(ranks[0].grade_rank, Some(50));

        assert!(a
            .previous_subjects("a", Some("2024-05-01"), older)
            .expect("q")
            .is_empty());
    }

    #[test]
    fn target_reference_uses_window_median_and_cohort_difficulty() {
        let f = Fixture::new();
        let exam = f.exam("期中", Some("2024-11-01"));
        for (i, total) in [(1_i64, 90.0), (2, 80.0), (3, 70.0), (4, 60.0)] {
            let id = format!("s{}", i);
            f.student(&id, "1班");
            f.result(&id, exam, total, Some(i), &[("数学", total, None)]);
        }
        // Far outside the window, still part of the cohort mean.
        f.student("s40", "2班");
        f.result("s40", exam, 10.0, Some(40), &[("数学", 10.0, None)]);

        let r = f
            .analytics()
            .target_reference(exam, 2)
            .expect("q")
            .expect("benchmark");
        assert_eq!(r.sample_size, 4);
        assert!(!r.used_fallback);
        assert_eq!(r.total_score, 80.0);
        assert_eq!(r.subjects.get("数学"), Some(&80.0));
        assert_eq!(r.difficulty.get("数学"), Some(&62.0));
    }

    #[test]
    fn target_reference_falls_back_to_nearest_ranks() {
        let f = Fixture::new();
        let exam = f.exam("期末", None);
        for i in 1..=25_i64 {
            let id = format!("s{:02}", i);
            f.student(&id, "1班");
            f.result(&id, exam, 100.0 - i as f64, Some(i), &[("英语", 100.0 - i as f64, None)]);
        }
        let r = f
            .analytics()
            .target_reference(exam, 500)
            .expect("q")
            .expect("benchmark");
        assert!(r.used_fallback);
        assert_eq!(r.sample_size, 20);
        // Ranks 6..=25 are nearest to 500; totals 75..=94, index 10 of 20.
        assert_eq!(r.total_score, 85.0);
    }

    #[test]
    fn extreme_target_ranks_use_the_nearest_ranked_results() {
        let f = Fixture::new();
        let exam = f.exam("期中", None);
        for i in 1..=3_i64 {
            let id = format!("s{}", i);
            f.student(&id, "1班");
            f.result(&id, exam, 100.0 - i as f64, Some(i), &[]);
        }
        let a = f.analytics();
        let high = a.target_reference(exam, i64::MAX).expect("q").expect("benchmark");
        assert!(high.used_fallback);
        assert_eq!(high.sample_size, 3);
        let low = a.target_reference(exam, i64::MIN).expect("q").expect("benchmark");
        assert!(low.used_fallback);
        assert_eq!(low.total_score, 98.0);
        assert!(a.target_reference(exam + 1, i64::MAX).expect("q").is_none());
    }

    #[test]
    fn target_reference_serializes_rank_in_camel_case() {
        let f = Fixture::new();
        let exam = f.exam("月考", None);
        f.student("a", "1班");
        f.result("a", exam, 300.0, Some(1), &[("语文", 120.0, None)]);
        let r = f.analytics().target_reference(exam, 1).expect("q").expect("benchmark");
        let v = serde_json::to_value(&r).expect("json");
        assert_eq!(v["targetRank"], serde_json::json!(1));
        assert!(v.get("target_rank").is_none());
        assert_eq!(v["total_score"], serde_json::json!(300.0));
    }

    #[test]
    fn target_reference_without_ranks_is_none() {
        let f = Fixture::new();
        let exam = f.exam("无排名", None);
        f.student("a", "1班");
        f.result("a", exam, 500.0, None, &[("语文", 120.0, None)]);
        assert!(f.analytics().target_reference(exam, 1).expect("q").is_none());
        assert!(f.analytics().target_reference(12345, 1).expect("q").is_none());
    }
}
