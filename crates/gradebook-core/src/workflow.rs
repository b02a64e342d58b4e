//! Verification workflow for individual result records.
//!
//! Legal moves:
//!
//! - `verify`: `Pending -> Verified`
//! - `finalize`: `Verified -> Finalized`
//! - `regrade`: any state `-> Pending`, with grade and points recomputed
//!
//! Nothing else changes a record's state. Finalizing an unverified record is
//! an error, never a shortcut.

use serde::{Deserialize, Serialize};

use crate::domain::boundary::{BoundaryTable, GradeAward};
use crate::domain::error::{GradingError, Result};
use crate::domain::record::{ResultRecord, ResultState};
use crate::grading;
use crate::metrics::METRICS;
use crate::obs;

/// Before/after picture of a regrade, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegradeOutcome {
    pub previous_raw_score: i32,
    pub previous: GradeAward,
    pub previous_state: ResultState,
    pub new_raw_score: i32,
    pub current: GradeAward,
    pub table_digest: String,
}

impl RegradeOutcome {
    /// Whether the regrade changed the awarded grade.
    pub fn grade_changed(&self) -> bool {
        self.previous.grade != self.current.grade
    }
}

/// Mark a pending record as verified.
///
/// # Errors
///
/// Returns `InvalidTransition` unless the record is `Pending`.
pub fn verify(record: &mut ResultRecord) -> Result<()> {
    advance(record, ResultState::Verified)?;
    METRICS.inc_records_verified();
    Ok(())
}

/// Mark a verified record as finalized.
///
/// # Errors
///
/// Returns `InvalidTransition` unless the record is `Verified`.
pub fn finalize(record: &mut ResultRecord) -> Result<()> {
    advance(record, ResultState::Finalized)?;
    METRICS.inc_records_finalized();
    Ok(())
}

fn advance(record: &mut ResultRecord, to: ResultState) -> Result<()> {
    let from = record.state;
    if !from.can_advance_to(to) {
        return Err(GradingError::InvalidTransition {
            key: record.key.clone(),
            from,
            to,
        });
    }
    record.state = to;
    obs::emit_record_transition(&record.key, from, to);
    Ok(())
}

/// Recompute a record's grade from `new_raw_score` and reset it to `Pending`.
///
/// Permitted from any state. On error the record is left untouched.
///
/// # Errors
///
/// Returns `ScoreOutOfRange` if `new_raw_score` is outside `0..=100`.
pub fn regrade(
    record: &mut ResultRecord,
    new_raw_score: i32,
    table: &BoundaryTable,
) -> Result<RegradeOutcome> {
    let graded = grading::grade(new_raw_score, table).map_err(|e| match e {
        GradingError::ScoreOutOfRange { score, .. } => GradingError::ScoreOutOfRange {
            key: Some(record.key.clone()),
            score,
        },
        other => other,
    })?;

    let outcome = RegradeOutcome {
        previous_raw_score: record.raw_score,
        previous: record.award(),
        previous_state: record.state,
        new_raw_score,
        current: graded.award.clone(),
        table_digest: table.digest(),
    };

    record.raw_score = new_raw_score;
    record.normalized_score = graded.normalized_score;
    record.grade = graded.award.grade;
    record.points = graded.award.points;
    record.state = ResultState::Pending;
    record.table_digest = outcome.table_digest.clone();

    METRICS.inc_regrades();
    obs::emit_record_regraded(&record.key, &outcome);
    Ok(outcome)
}
