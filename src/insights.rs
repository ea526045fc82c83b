//! Derived figures for the student dashboard: rank movement, gap-to-target
//! suggestions and per-subject stability. Everything here is a pure function
//! of aggregation outputs except [`dashboard`], which runs the queries first.

use crate::analytics::{
    Analytics, ExamListEntry, StudentExamResult, SubjectRank, SubjectResult, TargetReference,
    TrendPoint,
};
use crate::calc::{self, RankChange};
use crate::config::Curriculum;
use crate::error::ScoreResult;
use serde::Serialize;
use std::cmp::Ordering;

/// Grade-average ratio swing that counts as a trend, either way.
const TREND_THRESHOLD: f64 = 0.05;
/// Volatility below this (with enough samples) is stable.
const STABLE_VOLATILITY: f64 = 0.1;
/// Assumed cohort mean as a share of the full mark when none is known.
const FALLBACK_DIFFICULTY_RATIO: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRankChange {
    pub subject: String,
    pub previous_rank: i64,
    pub current_rank: i64,
    #[serde(flatten)]
    pub change: RankChange,
}

pub fn subject_rank_changes(
    current: &[SubjectResult],
    previous: &[SubjectRank],
) -> Vec<SubjectRankChange> {
    current
        .iter()
        .filter_map(|s| {
            let prev = previous.iter().find(|p| p.subject == s.subject)?;
            let (previous_rank, current_rank) = (prev.grade_rank?, s.grade_rank?);
            let change = calc::rank_change(Some(previous_rank), Some(current_rank))?;
            Some(SubjectRankChange {
                subject: s.subject.clone(),
                previous_rank,
                current_rank,
                change,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetGap {
    pub subject: String,
    pub score: f64,
    pub target_score: f64,
    pub gap: f64,
    pub weight: f64,
    /// Cohort mean as a whole-number percentage of the full mark; lower is harder.
    pub difficulty: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetGapReport {
    pub target_rank: i64,
    pub target_total: f64,
    pub goal_reached: bool,
    pub total_gap: f64,
    pub suggestions: Vec<TargetGap>,
}

fn round_whole(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Weighted per-subject score gaps between a result and a benchmark.
///
/// Harder subjects (low cohort mean) are weighted up less, weaker subjects
/// (score below the class average) more.
pub fn target_gaps(
    result: &StudentExamResult,
    benchmark: &TargetReference,
    curriculum: &Curriculum,
) -> TargetGapReport {
    let goal_reached = result.total_score >= benchmark.total_score;
    let mut suggestions: Vec<TargetGap> = curriculum
        .subject_names()
        .filter_map(|name| result.subjects.iter().find(|s| s.subject == name))
        .map(|s| {
            let full_mark = curriculum.full_mark(&s.subject);
            let target_score = benchmark.subjects.get(&s.subject).copied().unwrap_or(0.0);
            let raw_gap = (target_score - s.score).max(0.0);

            let cohort_mean = benchmark
                .difficulty
                .get(&s.subject)
                .copied()
                .filter(|m| *m > 0.0)
                .unwrap_or(full_mark * FALLBACK_DIFFICULTY_RATIO);
            let difficulty_ratio = cohort_mean / full_mark;

            let reference = s.class_avg.filter(|a| *a > 0.0).unwrap_or(cohort_mean);
            let capability_ratio = if reference > 0.0 {
                s.score / reference
            } else {
                1.0
            };

            let weight = raw_gap
                * (1.0 + (1.0 - difficulty_ratio) * 0.3)
                * (1.0 + (1.0 - capability_ratio) * 0.5);

            let (gap, weight) = if goal_reached {
                (0.0, 0.0)
            } else {
                (calc::round_off_1_decimal(raw_gap), calc::round_off_1_decimal(weight))
            };
            TargetGap {
                subject: s.subject.clone(),
                score: s.score,
                target_score,
                gap,
                weight,
                difficulty: round_whole(difficulty_ratio * 100.0),
            }
        })
        .collect();
    suggestions.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));

    TargetGapReport {
        target_rank: benchmark.target_rank,
        target_total: benchmark.total_score,
        goal_reached,
        total_gap: calc::round_off_1_decimal((benchmark.total_score - result.total_score).max(0.0)),
        suggestions,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Stable,
    Volatile,
    Uncertain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectStability {
    pub subject: String,
    pub samples: usize,
    /// Population standard deviation of score / grade average.
    pub volatility: f64,
    pub stability: Stability,
    pub direction: TrendDirection,
    pub mean_score: f64,
    pub grade_avg_history: Vec<f64>,
}

/// Stability of one subject over a trend series (oldest first). Exams the
/// student skipped, or with no grade average, are left out. `None` when
/// nothing remains.
pub fn subject_stability(trend: &[TrendPoint], subject: &str) -> Option<SubjectStability> {
    let points: Vec<(f64, f64)> = trend
        .iter()
        .filter_map(|p| p.subjects.iter().find(|s| s.subject == subject))
        .filter_map(|s| {
            s.grade_avg
                .filter(|avg| *avg > 0.0)
                .map(|avg| (s.score, avg))
        })
        .collect();
    if points.is_empty() {
        return None;
    }

    let ratios: Vec<f64> = points.iter().map(|(score, avg)| score / avg).collect();
    let scores: Vec<f64> = points.iter().map(|(score, _)| *score).collect();
    let volatility = calc::population_std_dev(&ratios)?;
    let stability = match (ratios.len() > 2, volatility < STABLE_VOLATILITY) {
        (false, _) => Stability::Uncertain,
        (true, true) => Stability::Stable,
        (true, false) => Stability::Volatile,
    };
    let swing = match (ratios.first(), ratios.last()) {
        (Some(oldest), Some(newest)) if ratios.len() > 1 => newest - oldest,
        _ => 0.0,
    };
    let direction = if swing > TREND_THRESHOLD {
        TrendDirection::Improving
    } else if swing < -TREND_THRESHOLD {
        TrendDirection::Declining
    } else {
        TrendDirection::Flat
    };

    Some(SubjectStability {
        subject: subject.to_string(),
        samples: ratios.len(),
        volatility,
        stability,
        direction,
        mean_score: calc::round_off_1_decimal(calc::mean(&scores)?),
        grade_avg_history: points.iter().map(|(_, avg)| *avg).collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardInsights {
    pub total_rank_change: Option<RankChange>,
    pub subject_rank_changes: Vec<SubjectRankChange>,
    pub target_gaps: Option<TargetGapReport>,
    pub stability: Vec<SubjectStability>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub latest: StudentExamResult,
    pub previous_exam: Option<ExamListEntry>,
    pub previous_subjects: Vec<SubjectRank>,
    pub trend: Vec<TrendPoint>,
    pub exams: Vec<ExamListEntry>,
    pub target: Option<TargetReference>,
    pub insights: DashboardInsights,
}

/// Everything the student page shows for one exam (latest when `exam_id` is
/// `None`), or `None` when the student has no result for it.
pub fn dashboard(
    analytics: &Analytics<'_>,
    student_id: &str,
    exam_id: Option<i64>,
    target_rank: i64,
    trend_limit: i64,
) -> ScoreResult<Option<Dashboard>> {
    let Some(latest) = analytics.student_exam_result(student_id, exam_id)? else {
        return Ok(None);
    };
    let date = latest.date.as_deref();
    let previous = analytics.previous_exam(student_id, date, latest.exam_id)?;
    let previous_subjects = analytics.previous_subjects(student_id, date, latest.exam_id)?;
    let trend = analytics.student_trend(student_id, trend_limit)?;
    let exams = analytics.student_exams(student_id)?;
    let target = analytics.target_reference(latest.exam_id, target_rank)?;

    let previous_exam = previous.map(|(_, exam)| exam);
    let insights = DashboardInsights {
        total_rank_change: calc::rank_change(
            previous_exam.as_ref().and_then(|e| e.grade_rank),
            latest.grade_rank,
        ),
        subject_rank_changes: subject_rank_changes(&latest.subjects, &previous_subjects),
        target_gaps: target
            .as_ref()
            .map(|t| target_gaps(&latest, t, analytics.curriculum)),
        stability: latest
            .subjects
            .iter()
            .filter_map(|s| subject_stability(&trend, &s.subject))
            .collect(),
    };

    Ok(Some(Dashboard {
        latest,
        previous_exam,
        previous_subjects,
        trend,
        exams,
        target,
        insights,
    }))
}
