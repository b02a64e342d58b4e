//! Grading engine: raw scores in, graded result records out.
//!
//! Everything here is a pure function of its inputs. Lifecycle state is the
//! business of [`crate::workflow`] and [`crate::domain::Batch`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::boundary::{BoundaryTable, GradeAward};
use crate::domain::error::{GradingError, Result};
use crate::domain::record::{RecordKey, ResultRecord};

/// A raw score as supplied by the candidate/subject registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub candidate_id: String,
    pub subject_id: String,
    pub raw_score: i32,
}

impl ScoreSubmission {
    pub fn new(
        candidate_id: impl Into<String>,
        subject_id: impl Into<String>,
        raw_score: i32,
    ) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            subject_id: subject_id.into(),
            raw_score,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.candidate_id.clone(), self.subject_id.clone())
    }
}

/// Derived fields for one score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedScore {
    pub normalized_score: i32,
    pub award: GradeAward,
}

/// Moderation hook. Scaling is not defined, so the raw score passes through.
fn normalize(raw_score: i32) -> i32 {
    raw_score
}

/// Grade a single raw score.
///
/// # Errors
///
/// Returns `ScoreOutOfRange` if `raw_score` is outside `0..=100`.
pub fn grade(raw_score: i32, table: &BoundaryTable) -> Result<GradedScore> {
    let normalized_score = normalize(raw_score);
    let award = table.grade_for(normalized_score)?;
    Ok(GradedScore {
        normalized_score,
        award,
    })
}

/// Grade a whole sitting's submissions, all or nothing.
///
/// Records come back in input order, all `Pending`, each stamped with the
/// table digest.
///
/// # Errors
///
/// Aborts on the first `ScoreOutOfRange` (tagged with the offending record)
/// or `DuplicateSubmission`; no partial output is returned.
pub fn batch_grade(
    submissions: &[ScoreSubmission],
    table: &BoundaryTable,
) -> Result<Vec<ResultRecord>> {
    let digest = table.digest();
    let mut seen = HashSet::with_capacity(submissions.len());
    let mut records = Vec::with_capacity(submissions.len());

    for submission in submissions {
        let key = submission.key();
        if !seen.insert(key.clone()) {
            return Err(GradingError::DuplicateSubmission { key });
        }
        let graded = match grade(submission.raw_score, table) {
            Ok(g) => g,
            Err(GradingError::ScoreOutOfRange { score, .. }) => {
                return Err(GradingError::ScoreOutOfRange {
                    key: Some(key),
                    score,
                })
            }
            Err(e) => return Err(e),
        };
        records.push(ResultRecord::graded(
            key,
            submission.raw_score,
            graded.normalized_score,
            graded.award,
            digest.clone(),
        ));
    }

    Ok(records)
}
