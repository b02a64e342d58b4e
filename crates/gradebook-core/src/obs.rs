//! Structured observability hooks for grading lifecycle events.
//!
//! This module provides:
//! - Batch-scoped tracing spans via the `BatchSpan` RAII guard
//! - Emission functions for grading, record and batch transitions, regrades,
//!   blocked finalization and summary computation
//!
//! Events are emitted at `info!` level except regrades and blocked
//! finalizations, which are `warn!` so operators see corrections.

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::batch::BatchState;
use crate::domain::record::{RecordKey, ResultState};
use crate::workflow::RegradeOutcome;

/// RAII guard that enters a batch-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = BatchSpan::enter(batch.id());
/// // all events below carry batch_id
/// ```
pub struct BatchSpan {
    _span: tracing::span::EnteredSpan,
}

impl BatchSpan {
    /// Create and enter a span tagged with the batch id.
    pub fn enter(batch_id: Uuid) -> Self {
        let span = tracing::info_span!("gradebook.batch", batch_id = %batch_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a batch was bulk-graded.
pub fn emit_batch_graded(batch_id: Uuid, records: usize, table_digest: &str) {
    info!(
        event = "batch.graded",
        batch_id = %batch_id,
        records = records,
        table_digest = %table_digest,
    );
}

/// Emit event: batch lifecycle moved forward.
pub fn emit_batch_transition(batch_id: Uuid, from: BatchState, to: BatchState) {
    info!(event = "batch.transition", batch_id = %batch_id, from = %from, to = %to);
}

/// Emit event: a record changed verification state.
pub fn emit_record_transition(key: &RecordKey, from: ResultState, to: ResultState) {
    info!(
        event = "record.transition",
        candidate_id = %key.candidate_id,
        subject_id = %key.subject_id,
        from = %from,
        to = %to,
    );
}

/// Emit event: a record was regraded (warning level).
pub fn emit_record_regraded(key: &RecordKey, outcome: &RegradeOutcome) {
    warn!(
        event = "record.regraded",
        candidate_id = %key.candidate_id,
        subject_id = %key.subject_id,
        previous_score = outcome.previous_raw_score,
        new_score = outcome.new_raw_score,
        previous_grade = %outcome.previous.grade,
        new_grade = %outcome.current.grade,
        previous_state = %outcome.previous_state,
    );
}

/// Emit event: finalization refused because records are not finalized (warning level).
pub fn emit_finalize_blocked(batch_id: Uuid, blocking: usize) {
    warn!(event = "batch.finalize_blocked", batch_id = %batch_id, blocking = blocking);
}

/// Emit event: statistics summary computed.
pub fn emit_summary_computed(batch_id: Uuid, total_results: usize, pass_rate: f64) {
    info!(
        event = "summary.computed",
        batch_id = %batch_id,
        total_results = total_results,
        pass_rate = pass_rate,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_span_create() {
        let _span = BatchSpan::enter(Uuid::new_v4());
    }
}
