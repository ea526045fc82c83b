use serde::Serialize;
use std::cmp::Ordering;

/// Sums built from the same scores in a different order can differ in the
/// last bits; anything closer than this is a tie.
const SCORE_EPSILON: f64 = 1e-9;

/// Half-up 1-decimal rounding used for every displayed average:
/// `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn sorted_ascending(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Element at `floor(n/2)` of the ascending sort. For even `n` this is the
/// upper of the two middle values (`[60, 70, 80, 90]` gives `80`), never
/// their average. Benchmarks downstream are calibrated to this rule.
pub fn benchmark_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_ascending(values);
    sorted.get(sorted.len() / 2).copied()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`).
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Competition ranks (`RANK()` semantics) for `scores`, highest first.
/// Equal scores share a rank and the next distinct score skips by the size
/// of the tie: `[90, 95, 90, 80]` ranks as `[2, 1, 2, 4]`.
pub fn competition_ranks(scores: &[f64]) -> Vec<i64> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0_i64; scores.len()];
    let mut prev: Option<(f64, i64)> = None;
    for (pos, &idx) in order.iter().enumerate() {
        let score = scores[idx];
        let rank = match prev {
            Some((p, r)) if (p - score).abs() < SCORE_EPSILON => r,
            _ => pos as i64 + 1,
        };
        ranks[idx] = rank;
        prev = Some((score, rank));
    }
    ranks
}

/// Percentage of the full mark, 1 decimal.
pub fn score_rate(score: f64, full_mark: f64) -> f64 {
    if full_mark > 0.0 {
        round_off_1_decimal(100.0 * score / full_mark)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDirection {
    Improved,
    Declined,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankChange {
    /// `previous - current`; positive means the student moved up.
    pub delta: i64,
    pub direction: RankDirection,
}

pub fn rank_change(previous: Option<i64>, current: Option<i64>) -> Option<RankChange> {
    let delta = previous? - current?;
    let direction = match delta.cmp(&0) {
        Ordering::Greater => RankDirection::Improved,
        Ordering::Less => RankDirection::Declined,
        Ordering::Equal => RankDirection::Unchanged,
    };
    Some(RankChange { delta, direction })
}
