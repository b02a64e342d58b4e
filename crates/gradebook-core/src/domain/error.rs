//! Domain-level error taxonomy for the grading engine.

use uuid::Uuid;

use super::batch::BatchState;
use super::record::{RecordKey, ResultState};

/// Blocking records listed verbatim before the message falls back to a count.
const MAX_LISTED_BLOCKERS: usize = 10;

/// Broad class of a [`GradingError`], used by callers to route failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad boundary table or scheme. Blocks grading until fixed.
    Configuration,
    /// Bad score input. Aborts the whole grading call.
    Input,
    /// Workflow precondition violated. Recoverable by a valid operation.
    State,
    /// Snapshot could not be written, read, or trusted.
    Artifact,
}

/// Grading engine errors.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    // -- configuration --
    #[error("boundary overlap: grades {first} and {second} share min score {min_score}")]
    BoundaryOverlap {
        first: String,
        second: String,
        min_score: i32,
    },

    #[error("boundary gap: score {score} is not covered by any grade")]
    BoundaryGap { score: i32 },

    #[error("grade {grade} has no equivalence points entry")]
    UnmappedGradePoints { grade: String },

    #[error("boundary for grade {grade} has min score {min_score}, outside 0..=100")]
    BoundaryOutOfRange { grade: String, min_score: i32 },

    #[error("grade {grade} appears more than once in the boundary table")]
    DuplicateGrade { grade: String },

    #[error("points entry for grade {grade} which is not in the boundary table")]
    PointsForUnknownGrade { grade: String },

    #[error(
        "points are not monotonic: {higher} ({higher_points}) ranks above {lower} ({lower_points})"
    )]
    NonMonotonicPoints {
        higher: String,
        higher_points: u32,
        lower: String,
        lower_points: u32,
    },

    #[error("no grading scheme configured for {level} / {sitting}")]
    SchemeNotFound { level: String, sitting: String },

    // -- input --
    #[error("score {score}{} is outside 0..=100", describe_key(.key))]
    ScoreOutOfRange { key: Option<RecordKey>, score: i32 },

    #[error("duplicate score submission for {key}")]
    DuplicateSubmission { key: RecordKey },

    #[error("no roster registered for sitting {0}")]
    SittingNotFound(String),

    // -- state --
    #[error("invalid transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: RecordKey,
        from: ResultState,
        to: ResultState,
    },

    #[error("invalid transition for batch {batch_id}: {from} -> {to}")]
    InvalidBatchTransition {
        batch_id: Uuid,
        from: BatchState,
        to: BatchState,
    },

    #[error(
        "batch {batch_id} cannot finalize: {} record(s) not finalized{}",
        .blocking.len(),
        describe_blockers(.blocking)
    )]
    IncompleteVerification {
        batch_id: Uuid,
        blocking: Vec<RecordKey>,
    },

    #[error("batch {batch_id} is {state}; {operation} is not allowed")]
    OperationNotAllowed {
        batch_id: Uuid,
        state: BatchState,
        operation: &'static str,
    },

    #[error("batch {batch_id} is finalized and locked against changes")]
    BatchLocked { batch_id: Uuid },

    #[error("batch {batch_id} expects {expected} candidates but holds {actual} records")]
    CandidateCountMismatch {
        batch_id: Uuid,
        expected: usize,
        actual: usize,
    },

    #[error("batch {batch_id} has no record for {key}")]
    RecordNotFound { batch_id: Uuid, key: RecordKey },

    #[error("batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("batch {0} is unavailable: a previous writer panicked while holding its lock")]
    BatchUnavailable(Uuid),

    // -- artifact --
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("table digest mismatch: expected {expected}, got {actual}")]
    ArtifactDigestMismatch { expected: String, actual: String },

    #[error("artifact record {key} is inconsistent with its boundary table: {reason}")]
    ArtifactInconsistent { key: RecordKey, reason: String },

    #[error("artifact for batch {batch_id} is invalid: {reason}")]
    ArtifactInvalid { batch_id: Uuid, reason: String },
}

impl GradingError {
    /// Classify this error into the configuration / input / state / artifact taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BoundaryOverlap { .. }
            | Self::BoundaryGap { .. }
            | Self::UnmappedGradePoints { .. }
            | Self::BoundaryOutOfRange { .. }
            | Self::DuplicateGrade { .. }
            | Self::PointsForUnknownGrade { .. }
            | Self::NonMonotonicPoints { .. }
            | Self::SchemeNotFound { .. } => ErrorKind::Configuration,
            Self::ScoreOutOfRange { .. }
            | Self::DuplicateSubmission { .. }
            | Self::SittingNotFound(_) => ErrorKind::Input,
            Self::InvalidTransition { .. }
            | Self::InvalidBatchTransition { .. }
            | Self::IncompleteVerification { .. }
            | Self::OperationNotAllowed { .. }
            | Self::BatchLocked { .. }
            | Self::CandidateCountMismatch { .. }
            | Self::RecordNotFound { .. }
            | Self::BatchNotFound(_)
            | Self::BatchUnavailable(_) => ErrorKind::State,
            Self::Io(_)
            | Self::Serialization(_)
            | Self::ArtifactDigestMismatch { .. }
            | Self::ArtifactInconsistent { .. }
            | Self::ArtifactInvalid { .. } => ErrorKind::Artifact,
        }
    }
}

fn describe_key(key: &Option<RecordKey>) -> String {
    key.as_ref().map(|k| format!(" for {k}")).unwrap_or_default()
}

fn describe_blockers(blocking: &[RecordKey]) -> String {
    if blocking.is_empty() {
        return String::new();
    }
    let listed: Vec<String> = blocking
        .iter()
        .take(MAX_LISTED_BLOCKERS)
        .map(ToString::to_string)
        .collect();
    let remainder = blocking.len().saturating_sub(MAX_LISTED_BLOCKERS);
    if remainder == 0 {
        format!(": [{}]", listed.join(", "))
    } else {
        format!(": [{}] and {} more", listed.join(", "), remainder)
    }
}

/// Result type for grading engine operations.
pub type Result<T> = std::result::Result<T, GradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: usize) -> RecordKey {
        RecordKey::new(format!("C{n:04}"), "MATH")
    }

    #[test]
    fn test_error_display_carries_context() {
        let err = GradingError::ScoreOutOfRange {
            key: Some(RecordKey::new("C0001", "PHYS")),
            score: 101,
        };
        let msg = err.to_string();
        assert!(msg.contains("C0001/PHYS"));
        assert!(msg.contains("101"));

        let err = GradingError::ScoreOutOfRange {
            key: None,
            score: -1,
        };
        assert_eq!(err.to_string(), "score -1 is outside 0..=100");

        let err = GradingError::BoundaryOverlap {
            first: "A".into(),
            second: "B".into(),
            min_score: 70,
        };
        assert!(err.to_string().contains("share min score 70"));
    }

    #[test]
    fn test_incomplete_verification_lists_small_batches() {
        let err = GradingError::IncompleteVerification {
            batch_id: Uuid::nil(),
            blocking: vec![key(1), key(2)],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 record(s) not finalized"));
        assert!(msg.contains("C0001/MATH"));
        assert!(msg.contains("C0002/MATH"));
        assert!(!msg.contains("more"));
    }

    #[test]
    fn test_incomplete_verification_truncates_large_batches() {
        let err = GradingError::IncompleteVerification {
            batch_id: Uuid::nil(),
            blocking: (0..25).map(key).collect(),
        };
        let msg = err.to_string();
        assert!(msg.contains("25 record(s) not finalized"));
        assert!(msg.contains("C0009/MATH"));
        assert!(!msg.contains("C0010/MATH"));
        assert!(msg.contains("and 15 more"));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            GradingError::BoundaryGap { score: 0 }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            GradingError::DuplicateSubmission { key: key(1) }.kind(),
            ErrorKind::Input
        );
        assert_eq!(
            GradingError::BatchLocked {
                batch_id: Uuid::nil()
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(
            GradingError::ArtifactDigestMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .kind(),
            ErrorKind::Artifact
        );
    }
}
