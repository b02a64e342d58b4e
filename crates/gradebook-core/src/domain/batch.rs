//! Examination batches and their lifecycle.
//!
//! A batch moves `Open -> Grading -> Verifying -> Finalized`. Grading is a
//! single bulk call that captures the boundary table; verification works
//! record by record; finalization is refused until every record is
//! `Finalized` and the expected candidate count is loaded. Once finalized the
//! batch rejects every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::boundary::BoundaryTable;
use super::error::{GradingError, Result};
use super::record::{RecordKey, ResultRecord, ResultState};
use crate::grading::{self, ScoreSubmission};
use crate::metrics::METRICS;
use crate::obs::{self, BatchSpan};
use crate::statistics;
use crate::workflow::{self, RegradeOutcome};

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Open,
    Grading,
    Verifying,
    Finalized,
}

impl BatchState {
    /// The only state this one may advance to, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Open => Some(Self::Grading),
            Self::Grading => Some(Self::Verifying),
            Self::Verifying => Some(Self::Finalized),
            Self::Finalized => None,
        }
    }

    pub fn can_advance_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Grading => write!(f, "grading"),
            Self::Verifying => write!(f, "verifying"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// One logged correction to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub key: RecordKey,
    pub reason: String,
    pub outcome: RegradeOutcome,
}

/// Per-state record counts for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Expected number of results (`total_candidates`).
    pub expected: usize,
    /// Records currently held.
    pub loaded: usize,
    pub pending: usize,
    pub verified: usize,
    pub finalized: usize,
    /// Finalized records as a percentage of `expected` or `loaded`,
    /// whichever is larger.
    pub percent_finalized: f64,
}

/// All results for one examination sitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    id: Uuid,
    name: String,
    exam_year: i32,
    total_candidates: usize,
    state: BatchState,
    /// Snapshot captured at grading time. `None` while `Open`.
    table: Option<BoundaryTable>,
    records: Vec<ResultRecord>,
    audit_log: Vec<AuditEntry>,
    created_at: DateTime<Utc>,
}

impl Batch {
    /// Register a new, empty batch in `Open`.
    pub fn new(name: impl Into<String>, exam_year: i32, total_candidates: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            exam_year,
            total_candidates,
            state: BatchState::Open,
            table: None,
            records: Vec::new(),
            audit_log: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exam_year(&self) -> i32 {
        self.exam_year
    }

    pub fn total_candidates(&self) -> usize {
        self.total_candidates
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn table(&self) -> Option<&BoundaryTable> {
        self.table.as_ref()
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn record(&self, key: &RecordKey) -> Option<&ResultRecord> {
        self.records.iter().find(|r| &r.key == key)
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Bulk-grade the sitting's raw scores and move `Open -> Grading`.
    ///
    /// The table is captured as the batch's snapshot. On any input error the
    /// batch is left `Open` and empty.
    ///
    /// # Errors
    ///
    /// - `BatchLocked` if finalized.
    /// - `InvalidBatchTransition` unless `Open` with no records.
    /// - `ScoreOutOfRange` / `DuplicateSubmission` from the grading engine.
    pub fn grade(&mut self, submissions: &[ScoreSubmission], table: BoundaryTable) -> Result<usize> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_mutable()?;
        if !self.state.can_advance_to(BatchState::Grading) || !self.records.is_empty() {
            return Err(GradingError::InvalidBatchTransition {
                batch_id: self.id,
                from: self.state,
                to: BatchState::Grading,
            });
        }

        let records = grading::batch_grade(submissions, &table)?;
        let count = records.len();
        let digest = table.digest();

        self.records = records;
        self.table = Some(table);
        self.advance(BatchState::Grading)?;

        METRICS.add_records_graded(count as u64);
        obs::emit_batch_graded(self.id, count, &digest);
        Ok(count)
    }

    /// Move `Grading -> Verifying`.
    pub fn begin_verification(&mut self) -> Result<()> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_mutable()?;
        self.advance(BatchState::Verifying)
    }

    /// Verify one record. The batch must be `Verifying`.
    pub fn verify_record(&mut self, key: &RecordKey) -> Result<()> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_state(&[BatchState::Verifying], "verify")?;
        workflow::verify(self.record_mut(key)?)
    }

    /// Finalize one verified record. The batch must be `Verifying`.
    pub fn finalize_record(&mut self, key: &RecordKey) -> Result<()> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_state(&[BatchState::Verifying], "finalize record")?;
        workflow::finalize(self.record_mut(key)?)
    }

    /// Verify every `Pending` record. Returns how many were verified.
    pub fn verify_all_pending(&mut self) -> Result<usize> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_state(&[BatchState::Verifying], "verify")?;
        let mut count = 0;
        for record in self
            .records
            .iter_mut()
            .filter(|r| r.state == ResultState::Pending)
        {
            workflow::verify(record)?;
            count += 1;
        }
        Ok(count)
    }

    /// Finalize every `Verified` record. Returns how many were finalized.
    pub fn finalize_all_verified(&mut self) -> Result<usize> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_state(&[BatchState::Verifying], "finalize record")?;
        let mut count = 0;
        for record in self
            .records
            .iter_mut()
            .filter(|r| r.state == ResultState::Verified)
        {
            workflow::finalize(record)?;
            count += 1;
        }
        Ok(count)
    }

    /// Regrade one record under the batch's table and log the correction.
    ///
    /// The record returns to `Pending` whatever its previous state.
    ///
    /// # Errors
    ///
    /// - `BatchLocked` if finalized.
    /// - `OperationNotAllowed` while `Open` (nothing graded yet).
    /// - `RecordNotFound`, `ScoreOutOfRange`.
    pub fn regrade_record(
        &mut self,
        key: &RecordKey,
        new_raw_score: i32,
        reason: impl Into<String>,
    ) -> Result<RegradeOutcome> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_state(&[BatchState::Grading, BatchState::Verifying], "regrade")?;
        let table = self.captured_table("regrade")?.clone();
        let outcome = workflow::regrade(self.record_mut(key)?, new_raw_score, &table)?;
        self.log_correction(key.clone(), reason.into(), outcome.clone());
        Ok(outcome)
    }

    /// Re-run grading for every record under a replacement table.
    ///
    /// This is the only way to change a batch's table. Every record is
    /// regraded with its own raw score, returns to `Pending`, and is logged.
    /// If any record fails to regrade, the batch is left unchanged.
    pub fn rerun_with_table(
        &mut self,
        table: BoundaryTable,
        reason: impl Into<String>,
    ) -> Result<Vec<RegradeOutcome>> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_state(&[BatchState::Grading, BatchState::Verifying], "re-run grading")?;
        let reason = reason.into();

        let mut regraded = self.records.clone();
        let mut outcomes = Vec::with_capacity(regraded.len());
        for record in &mut regraded {
            let score = record.raw_score;
            outcomes.push(workflow::regrade(record, score, &table)?);
        }

        self.records = regraded;
        for (index, outcome) in outcomes.iter().enumerate() {
            let key = self.records[index].key.clone();
            self.log_correction(key, reason.clone(), outcome.clone());
        }
        self.table = Some(table);
        Ok(outcomes)
    }

    /// Move `Verifying -> Finalized`.
    ///
    /// # Errors
    ///
    /// - `BatchLocked` if already finalized.
    /// - `InvalidBatchTransition` unless `Verifying`.
    /// - `IncompleteVerification` naming every record not yet `Finalized`.
    /// - `CandidateCountMismatch` if the record count differs from
    ///   `total_candidates`.
    pub fn finalize(&mut self) -> Result<()> {
        let _span = BatchSpan::enter(self.id);
        self.ensure_mutable()?;
        if !self.state.can_advance_to(BatchState::Finalized) {
            return Err(GradingError::InvalidBatchTransition {
                batch_id: self.id,
                from: self.state,
                to: BatchState::Finalized,
            });
        }

        let blocking: Vec<RecordKey> = self
            .records
            .iter()
            .filter(|r| r.state != ResultState::Finalized)
            .map(|r| r.key.clone())
            .collect();
        if !blocking.is_empty() {
            obs::emit_finalize_blocked(self.id, blocking.len());
            return Err(GradingError::IncompleteVerification {
                batch_id: self.id,
                blocking,
            });
        }

        if self.records.len() != self.total_candidates {
            return Err(GradingError::CandidateCountMismatch {
                batch_id: self.id,
                expected: self.total_candidates,
                actual: self.records.len(),
            });
        }

        self.advance(BatchState::Finalized)?;
        METRICS.inc_batches_finalized();
        Ok(())
    }

    /// Record counts per verification state.
    pub fn progress(&self) -> BatchProgress {
        let count = |state: ResultState| self.records.iter().filter(|r| r.state == state).count();
        let finalized = count(ResultState::Finalized);
        let denominator = self.total_candidates.max(self.records.len());
        BatchProgress {
            expected: self.total_candidates,
            loaded: self.records.len(),
            pending: count(ResultState::Pending),
            verified: count(ResultState::Verified),
            finalized,
            percent_finalized: statistics::percentage(finalized as u64, denominator as u64),
        }
    }

    /// Grades of `Finalized` records only, for certificate eligibility.
    pub fn finalized_grades(&self) -> impl Iterator<Item = (&RecordKey, &str)> {
        self.records
            .iter()
            .filter(|r| r.state == ResultState::Finalized)
            .map(|r| (&r.key, r.grade.as_str()))
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.state == BatchState::Finalized {
            return Err(GradingError::BatchLocked { batch_id: self.id });
        }
        Ok(())
    }

    fn ensure_state(&self, allowed: &[BatchState], operation: &'static str) -> Result<()> {
        self.ensure_mutable()?;
        if !allowed.contains(&self.state) {
            return Err(GradingError::OperationNotAllowed {
                batch_id: self.id,
                state: self.state,
                operation,
            });
        }
        Ok(())
    }

    fn captured_table(&self, operation: &'static str) -> Result<&BoundaryTable> {
        self.table
            .as_ref()
            .ok_or(GradingError::OperationNotAllowed {
                batch_id: self.id,
                state: self.state,
                operation,
            })
    }

    fn advance(&mut self, to: BatchState) -> Result<()> {
        let from = self.state;
        if !from.can_advance_to(to) {
            return Err(GradingError::InvalidBatchTransition {
                batch_id: self.id,
                from,
                to,
            });
        }
        self.state = to;
        obs::emit_batch_transition(self.id, from, to);
        Ok(())
    }

    fn record_mut(&mut self, key: &RecordKey) -> Result<&mut ResultRecord> {
        let batch_id = self.id;
        self.records
            .iter_mut()
            .find(|r| &r.key == key)
            .ok_or_else(|| GradingError::RecordNotFound {
                batch_id,
                key: key.clone(),
            })
    }

    fn log_correction(&mut self, key: RecordKey, reason: String, outcome: RegradeOutcome) {
        self.audit_log.push(AuditEntry {
            entry_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            key,
            reason,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submissions() -> Vec<ScoreSubmission> {
        vec![
            ScoreSubmission::new("C1", "MATH", 93),
            ScoreSubmission::new("C2", "MATH", 74),
            ScoreSubmission::new("C3", "MATH", 20),
        ]
    }

    fn graded_batch() -> Batch {
        let mut batch = Batch::new("June 2025 Mathematics", 2025, 3);
        batch
            .grade(&submissions(), BoundaryTable::a_level())
            .unwrap();
        batch
    }

    #[test]
    fn test_batch_state_chain() {
        assert!(BatchState::Open.can_advance_to(BatchState::Grading));
        assert!(!BatchState::Open.can_advance_to(BatchState::Verifying));
        assert!(!BatchState::Verifying.can_advance_to(BatchState::Grading));
        assert_eq!(BatchState::Finalized.next(), None);
    }

    #[test]
    fn test_new_batch_is_open_and_empty() {
        let batch = Batch::new("b", 2025, 10);
        assert_eq!(batch.state(), BatchState::Open);
        assert!(batch.records().is_empty());
        assert!(batch.table().is_none());
    }

    #[test]
    fn test_grade_moves_to_grading_and_captures_table() {
        let batch = graded_batch();
        assert_eq!(batch.state(), BatchState::Grading);
        assert_eq!(batch.records().len(), 3);
        assert_eq!(batch.table(), Some(&BoundaryTable::a_level()));
    }

    #[test]
    fn test_grade_twice_rejected() {
        let mut batch = graded_batch();
        let err = batch
            .grade(&submissions(), BoundaryTable::a_level())
            .unwrap_err();
        assert!(matches!(err, GradingError::InvalidBatchTransition { .. }));
        assert_eq!(batch.records().len(), 3);
    }

    #[test]
    fn test_failed_grade_leaves_batch_open() {
        let mut batch = Batch::new("b", 2025, 2);
        let subs = vec![
            ScoreSubmission::new("C1", "MATH", 50),
            ScoreSubmission::new("C2", "MATH", 101),
        ];
        assert!(batch.grade(&subs, BoundaryTable::a_level()).is_err());
        assert_eq!(batch.state(), BatchState::Open);
        assert!(batch.records().is_empty());
        assert!(batch.table().is_none());
    }

    #[test]
    fn test_verify_requires_verifying_state() {
        let mut batch = graded_batch();
        let err = batch.verify_record(&RecordKey::new("C1", "MATH")).unwrap_err();
        assert!(matches!(
            err,
            GradingError::OperationNotAllowed {
                state: BatchState::Grading,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_record() {
        let mut batch = graded_batch();
        batch.begin_verification().unwrap();
        let err = batch.verify_record(&RecordKey::new("C9", "MATH")).unwrap_err();
        assert!(matches!(err, GradingError::RecordNotFound { .. }));
    }

    #[test]
    fn test_progress_rolls_up_states() {
        let mut batch = graded_batch();
        batch.begin_verification().unwrap();
        batch.verify_record(&RecordKey::new("C1", "MATH")).unwrap();
        batch.verify_record(&RecordKey::new("C2", "MATH")).unwrap();
        batch.finalize_record(&RecordKey::new("C1", "MATH")).unwrap();

        let progress = batch.progress();
        assert_eq!(progress.expected, 3);
        assert_eq!(progress.loaded, 3);
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.verified, 1);
        assert_eq!(progress.finalized, 1);
        assert_eq!(progress.percent_finalized, 33.33);
    }

    #[test]
    fn test_regrade_logs_audit_entry() {
        let mut batch = graded_batch();
        batch.begin_verification().unwrap();
        let key = RecordKey::new("C2", "MATH");
        batch.verify_record(&key).unwrap();

        let outcome = batch.regrade_record(&key, 81, "clerical error").unwrap();
        assert_eq!(outcome.previous.grade, "B");
        assert_eq!(outcome.current.grade, "A");
        assert_eq!(batch.record(&key).unwrap().state(), ResultState::Pending);

        let log = batch.audit_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].key, key);
        assert_eq!(log[0].reason, "clerical error");
        assert_eq!(log[0].outcome.previous_state, ResultState::Verified);
    }

    #[test]
    fn test_regrade_while_open_not_allowed() {
        let mut batch = Batch::new("b", 2025, 1);
        let err = batch
            .regrade_record(&RecordKey::new("C1", "MATH"), 50, "x")
            .unwrap_err();
        assert!(matches!(err, GradingError::OperationNotAllowed { .. }));
    }

    #[test]
    fn test_rerun_with_table_resets_and_logs() {
        let mut batch = graded_batch();
        batch.begin_verification().unwrap();
        batch.verify_all_pending().unwrap();

        let mut rows = BoundaryTable::a_level().entries().to_vec();
        rows[2].min_score = 75; // B now needs 75
        let stricter = BoundaryTable::from_entries(rows).unwrap();

        let outcomes = batch.rerun_with_table(stricter.clone(), "boundary review").unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(batch.table(), Some(&stricter));
        assert_eq!(batch.record(&RecordKey::new("C2", "MATH")).unwrap().grade(), "C");
        assert!(batch.records().iter().all(|r| r.state() == ResultState::Pending));
        assert!(batch
            .records()
            .iter()
            .all(|r| r.table_digest() == stricter.digest()));
        assert_eq!(batch.audit_log().len(), 3);
    }

    #[test]
    fn test_finalize_twice_is_locked() {
        let mut batch = graded_batch();
        batch.begin_verification().unwrap();
        batch.verify_all_pending().unwrap();
        batch.finalize_all_verified().unwrap();
        batch.finalize().unwrap();
        assert!(matches!(
            batch.finalize(),
            Err(GradingError::BatchLocked { .. })
        ));
    }

    #[test]
    fn test_finalize_from_grading_rejected() {
        let mut batch = graded_batch();
        assert!(matches!(
            batch.finalize(),
            Err(GradingError::InvalidBatchTransition {
                from: BatchState::Grading,
                to: BatchState::Finalized,
                ..
            })
        ));
    }

    #[test]
    fn test_finalized_grades_only_lists_finalized() {
        let mut batch = graded_batch();
        batch.begin_verification().unwrap();
        batch.verify_all_pending().unwrap();
        batch.finalize_record(&RecordKey::new("C3", "MATH")).unwrap();

        let eligible: Vec<(&RecordKey, &str)> = batch.finalized_grades().collect();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].0, &RecordKey::new("C3", "MATH"));
        assert_eq!(eligible[0].1, "U");
    }

    #[test]
    fn test_rerun_failure_leaves_batch_unchanged() {
        let mut batch = graded_batch();
        batch.begin_verification().unwrap();
        batch.verify_all_pending().unwrap();

        // Only a batch loaded from outside the engine can hold an out-of-range score.
        let mut value = serde_json::to_value(&batch).unwrap();
        value["records"][2]["raw_score"] = serde_json::json!(150);
        let mut batch: Batch = serde_json::from_value(value).unwrap();
        let before = batch.clone();

        let mut rows = BoundaryTable::a_level().entries().to_vec();
        rows[2].min_score = 75;
        let stricter = BoundaryTable::from_entries(rows).unwrap();

        let err = batch.rerun_with_table(stricter, "boundary review").unwrap_err();
        assert!(matches!(err, GradingError::ScoreOutOfRange { score: 150, .. }));
        assert_eq!(batch, before);
        assert!(batch.audit_log().is_empty());
        assert_eq!(batch.table(), Some(&BoundaryTable::a_level()));
    }

    #[test]
    fn test_progress_capped_when_overloaded() {
        let mut batch = Batch::new("b", 2025, 2);
        batch.grade(&submissions(), BoundaryTable::a_level()).unwrap();
        batch.begin_verification().unwrap();
        batch.verify_all_pending().unwrap();
        batch.finalize_all_verified().unwrap();

        let progress = batch.progress();
        assert_eq!(progress.expected, 2);
        assert_eq!(progress.loaded, 3);
        assert_eq!(progress.percent_finalized, 100.0);
    }
}
