//! Batch statistics: grade distribution, pass rate, average points.
//!
//! Summaries are computed on demand and never touch the batch. All ratios
//! are computed in integer arithmetic and rounded half-up to two decimal
//! places, so the result does not depend on record order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::batch::{Batch, BatchState};
use crate::obs;

/// Default number of top grades counted by `top_grade_share`.
pub const DEFAULT_TOP_GRADE_COUNT: usize = 2;

/// Knobs for [`summarize_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOptions {
    /// How many of the highest-ranked grades count towards `top_grade_share`.
    pub top_grade_count: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            top_grade_count: DEFAULT_TOP_GRADE_COUNT,
        }
    }
}

/// Count and percentage share of one grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeShare {
    pub grade: String,
    pub count: usize,
    pub percent: f64,
}

/// Aggregate view of a batch.
///
/// A summary taken before the batch is `Finalized` is provisional;
/// `lifecycle_state` is reported so the caller can tell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub batch_id: Uuid,
    pub lifecycle_state: BatchState,
    pub total_results: usize,
    /// Tally of awarded grades. Grades nobody received are absent.
    pub grade_counts: BTreeMap<String, usize>,
    /// Every grade of the table in rank order, zero counts included.
    pub distribution: Vec<GradeShare>,
    /// Percentage of results above the lowest grade.
    pub pass_rate: f64,
    pub average_points: f64,
    pub top_grade_count: usize,
    /// Percentage of results within the `top_grade_count` highest grades.
    pub top_grade_share: f64,
    pub lowest_grade: Option<String>,
}

impl StatisticsSummary {
    pub fn is_provisional(&self) -> bool {
        self.lifecycle_state != BatchState::Finalized
    }
}

/// Summarize a batch with default options.
pub fn summarize(batch: &Batch) -> StatisticsSummary {
    summarize_with(batch, &SummaryOptions::default())
}

/// Summarize a batch.
pub fn summarize_with(batch: &Batch, options: &SummaryOptions) -> StatisticsSummary {
    let records = batch.records();
    let total = records.len();

    let mut grade_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut points_sum: u64 = 0;
    for record in records {
        *grade_counts.entry(record.grade().to_string()).or_default() += 1;
        points_sum += u64::from(record.points());
    }

    let (distribution, passed, lowest_grade) = match batch.table() {
        Some(table) => {
            let lowest = table.lowest_grade();
            let distribution = table
                .grades()
                .map(|grade| {
                    let count = grade_counts.get(grade).copied().unwrap_or(0);
                    GradeShare {
                        grade: grade.to_string(),
                        count,
                        percent: percentage(count as u64, total as u64),
                    }
                })
                .collect();
            let passed = records.iter().filter(|r| r.grade() != lowest).count();
            (distribution, passed, Some(lowest.to_string()))
        }
        None => (Vec::new(), 0, None),
    };

    let summary = StatisticsSummary {
        batch_id: batch.id(),
        lifecycle_state: batch.state(),
        total_results: total,
        grade_counts,
        distribution,
        pass_rate: percentage(passed as u64, total as u64),
        average_points: ratio(points_sum, total as u64),
        top_grade_count: options.top_grade_count,
        top_grade_share: top_grade_share(batch, options.top_grade_count),
        lowest_grade,
    };

    obs::emit_summary_computed(summary.batch_id, summary.total_results, summary.pass_rate);
    summary
}

/// Percentage of a batch's results whose grade ranks among the `n` highest.
pub fn top_grade_share(batch: &Batch, n: usize) -> f64 {
    let Some(table) = batch.table() else {
        return 0.0;
    };
    let top = table.top_grades(n);
    let count = batch
        .records()
        .iter()
        .filter(|r| top.iter().any(|e| e.grade == r.grade()))
        .count();
    percentage(count as u64, batch.records().len() as u64)
}

/// `part / whole * 100`, rounded half-up to 2 dp. Zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> f64 {
    ratio(part.saturating_mul(100), whole)
}

/// `numerator / denominator`, rounded half-up to 2 dp. Zero when `denominator` is zero.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let num = u128::from(numerator) * 100;
    let den = u128::from(denominator);
    let hundredths = (2 * num + den) / (2 * den);
    hundredths as f64 / 100.0
}
