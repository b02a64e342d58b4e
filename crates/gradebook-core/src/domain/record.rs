//! Per-candidate result records.

use serde::{Deserialize, Serialize};

use super::boundary::GradeAward;

/// Verification state of a single result.
///
/// Advances strictly `Pending -> Verified -> Finalized`. Only a regrade moves
/// a record back, and always to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    Pending,
    Verified,
    Finalized,
}

impl ResultState {
    /// The only state this one may advance to, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Verified),
            Self::Verified => Some(Self::Finalized),
            Self::Finalized => None,
        }
    }

    /// Whether a forward transition `self -> to` is legal.
    pub fn can_advance_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized)
    }
}

impl std::fmt::Display for ResultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Verified => write!(f, "verified"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// Identity of a result within a batch: one candidate sitting one subject.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub candidate_id: String,
    pub subject_id: String,
}

impl RecordKey {
    pub fn new(candidate_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.candidate_id, self.subject_id)
    }
}

/// One candidate/subject outcome.
///
/// Grade and points are derived from `raw_score` under the boundary table
/// identified by `table_digest`. Fields are only writable inside the crate so
/// that every mutation goes through the grading engine or the verification
/// workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub(crate) key: RecordKey,
    pub(crate) raw_score: i32,
    /// Equal to `raw_score` until a moderation step exists.
    pub(crate) normalized_score: i32,
    pub(crate) grade: String,
    pub(crate) points: u32,
    pub(crate) state: ResultState,
    /// Digest of the boundary table used at grading time.
    pub(crate) table_digest: String,
}

impl ResultRecord {
    pub(crate) fn graded(
        key: RecordKey,
        raw_score: i32,
        normalized_score: i32,
        award: GradeAward,
        table_digest: String,
    ) -> Self {
        Self {
            key,
            raw_score,
            normalized_score,
            grade: award.grade,
            points: award.points,
            state: ResultState::Pending,
            table_digest,
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn candidate_id(&self) -> &str {
        &self.key.candidate_id
    }

    pub fn subject_id(&self) -> &str {
        &self.key.subject_id
    }

    pub fn raw_score(&self) -> i32 {
        self.raw_score
    }

    pub fn normalized_score(&self) -> i32 {
        self.normalized_score
    }

    pub fn grade(&self) -> &str {
        &self.grade
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    pub fn table_digest(&self) -> &str {
        &self.table_digest
    }

    /// Grade and points as a single value.
    pub fn award(&self) -> GradeAward {
        GradeAward {
            grade: self.grade.clone(),
            points: self.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_forward_chain() {
        assert_eq!(ResultState::Pending.next(), Some(ResultState::Verified));
        assert_eq!(ResultState::Verified.next(), Some(ResultState::Finalized));
        assert_eq!(ResultState::Finalized.next(), None);
    }

    #[test]
    fn test_state_cannot_skip_or_revert() {
        assert!(!ResultState::Pending.can_advance_to(ResultState::Finalized));
        assert!(!ResultState::Verified.can_advance_to(ResultState::Pending));
        assert!(!ResultState::Finalized.can_advance_to(ResultState::Verified));
        assert!(!ResultState::Pending.can_advance_to(ResultState::Pending));
    }

    #[test]
    fn test_state_serde_snake_case() {
        let json = serde_json::to_string(&ResultState::Finalized).unwrap();
        assert_eq!(json, "\"finalized\"");
        let back: ResultState = serde_json::from_str("\"verified\"").unwrap();
        assert_eq!(back, ResultState::Verified);
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = ResultRecord::graded(
            RecordKey::new("C1", "CHEM"),
            72,
            72,
            GradeAward {
                grade: "B".into(),
                points: 40,
            },
            "digest".into(),
        );
        assert_eq!(record.state(), ResultState::Pending);
        assert_eq!(record.candidate_id(), "C1");
        assert_eq!(record.subject_id(), "CHEM");
        assert_eq!(record.award().points, 40);
    }
}
