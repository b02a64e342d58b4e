//! Batch snapshot persistence.
//!
//! A [`BatchArtifact`] is a self-contained copy of a batch (records, table
//! snapshot and audit log) written as JSON to `<dir>/<batch_id>/batch.json`
//! with a companion `<dir>/<batch_id>/batch.digest` holding the table digest.
//!
//! Reading an artifact re-derives everything that can be derived: the header
//! must describe the embedded batch, the batch must satisfy its lifecycle
//! rules, the table digest must match, and every record's grade and points
//! must match what the table awards for its raw score.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::batch::{Batch, BatchState};
use crate::domain::error::{GradingError, Result};
use crate::domain::record::ResultState;
use crate::grading;

/// Format version written into every artifact.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// A self-contained, integrity-checked copy of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchArtifact {
    pub schema_version: u32,
    pub batch_id: Uuid,
    pub lifecycle_state: BatchState,
    pub exported_at: DateTime<Utc>,
    /// Digest of the batch's boundary table; empty while the batch is `Open`.
    pub table_digest: String,
    pub record_count: usize,
    pub batch: Batch,
}

impl BatchArtifact {
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            batch_id: batch.id(),
            lifecycle_state: batch.state(),
            exported_at: Utc::now(),
            table_digest: batch.table().map(|t| t.digest()).unwrap_or_default(),
            record_count: batch.records().len(),
            batch: batch.clone(),
        }
    }
}

/// Write a batch to `<dir>/<batch_id>/batch.json`.
///
/// Returns the path to `batch.json`.
pub fn write_batch_artifact(batch: &Batch, dir: &Path) -> Result<PathBuf> {
    let artifact = BatchArtifact::from_batch(batch);
    let batch_dir = dir.join(artifact.batch_id.to_string());
    std::fs::create_dir_all(&batch_dir)?;

    let batch_path = batch_dir.join("batch.json");
    let digest_path = batch_dir.join("batch.digest");

    let json = serde_json::to_vec_pretty(&artifact)?;
    std::fs::write(&batch_path, &json)?;
    std::fs::write(&digest_path, artifact.table_digest.as_bytes())?;

    Ok(batch_path)
}

/// Read and verify the artifact for `batch_id` under `dir`.
///
/// # Errors
///
/// - `Io` / `Serialization` if the file is missing or malformed (an invalid
///   boundary table fails deserialization).
/// - `ArtifactInvalid` if the header disagrees with the batch, or the batch is
///   in a state the lifecycle cannot reach (e.g. finalized with pending records).
/// - `ArtifactDigestMismatch` if the stored table digest is stale.
/// - `ArtifactInconsistent` if a record disagrees with the table.
pub fn read_batch_artifact(batch_id: Uuid, dir: &Path) -> Result<BatchArtifact> {
    let batch_path = dir.join(batch_id.to_string()).join("batch.json");
    let json = std::fs::read(&batch_path)?;
    let artifact: BatchArtifact = serde_json::from_slice(&json)?;
    if artifact.batch_id != batch_id {
        return Err(GradingError::ArtifactInvalid {
            batch_id,
            reason: format!("file holds batch {}", artifact.batch_id),
        });
    }
    verify_artifact(&artifact)?;
    Ok(artifact)
}

/// Check an artifact's internal consistency.
pub fn verify_artifact(artifact: &BatchArtifact) -> Result<()> {
    verify_lifecycle(artifact)?;
    let batch = &artifact.batch;
    let actual = batch.table().map(|t| t.digest()).unwrap_or_default();
    if actual != artifact.table_digest {
        return Err(GradingError::ArtifactDigestMismatch {
            expected: artifact.table_digest.clone(),
            actual,
        });
    }

    // Lifecycle checks above guarantee an untabled batch holds no records.
    let Some(table) = batch.table() else {
        return Ok(());
    };

    for record in batch.records() {
        let inconsistent = |reason: String| GradingError::ArtifactInconsistent {
            key: record.key().clone(),
            reason,
        };
        if record.table_digest() != actual {
            return Err(inconsistent(format!(
                "graded under table {} but batch table is {}",
                record.table_digest(),
                actual
            )));
        }
        let expected = grading::grade(record.raw_score(), table)
            .map_err(|e| inconsistent(e.to_string()))?;
        if expected.normalized_score != record.normalized_score()
            || expected.award != record.award()
        {
            return Err(inconsistent(format!(
                "score {} should give {} ({} points), found {} ({} points)",
                record.raw_score(),
                expected.award.grade,
                expected.award.points,
                record.grade(),
                record.points()
            )));
        }
    }
    Ok(())
}

/// Header fields must describe the embedded batch, and the batch must be in a
/// state the engine could have produced.
fn verify_lifecycle(artifact: &BatchArtifact) -> Result<()> {
    let batch = &artifact.batch;
    let invalid = |reason: String| GradingError::ArtifactInvalid {
        batch_id: artifact.batch_id,
        reason,
    };

    if artifact.batch_id != batch.id() {
        return Err(invalid(format!("header names batch {}", batch.id())));
    }
    if artifact.lifecycle_state != batch.state() {
        return Err(invalid(format!(
            "header state {} but batch is {}",
            artifact.lifecycle_state,
            batch.state()
        )));
    }
    if artifact.record_count != batch.records().len() {
        return Err(invalid(format!(
            "header counts {} records but batch holds {}",
            artifact.record_count,
            batch.records().len()
        )));
    }

    let mut keys = HashSet::with_capacity(batch.records().len());
    for record in batch.records() {
        if !keys.insert(record.key()) {
            return Err(invalid(format!("record {} appears more than once", record.key())));
        }
    }

    match batch.state() {
        BatchState::Open => {
            if !batch.records().is_empty() || batch.table().is_some() {
                return Err(invalid("open batch holds a table or records".to_string()));
            }
        }
        _ if batch.table().is_none() => {
            return Err(invalid(format!(
                "{} batch has no boundary table",
                batch.state()
            )));
        }
        BatchState::Finalized => {
            if let Some(record) = batch
                .records()
                .iter()
                .find(|r| r.state() != ResultState::Finalized)
            {
                return Err(invalid(format!(
                    "finalized batch holds {} record {}",
                    record.state(),
                    record.key()
                )));
            }
            if batch.records().len() != batch.total_candidates() {
                return Err(invalid(format!(
                    "finalized batch holds {} records but expects {}",
                    batch.records().len(),
                    batch.total_candidates()
                )));
            }
        }
        BatchState::Grading | BatchState::Verifying => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boundary::BoundaryTable;
    use crate::grading::ScoreSubmission;

    fn graded() -> Batch {
        let mut batch = Batch::new("b", 2025, 2);
        batch
            .grade(
                &[
                    ScoreSubmission::new("C1", "MATH", 83),
                    ScoreSubmission::new("C2", "MATH", 47),
                ],
                BoundaryTable::a_level(),
            )
            .unwrap();
        batch
    }

    #[test]
    fn test_fresh_artifact_verifies() {
        let artifact = BatchArtifact::from_batch(&graded());
        assert_eq!(artifact.record_count, 2);
        assert_eq!(artifact.table_digest, BoundaryTable::a_level().digest());
        verify_artifact(&artifact).unwrap();
    }

    #[test]
    fn test_open_batch_artifact_has_empty_digest() {
        let artifact = BatchArtifact::from_batch(&Batch::new("b", 2025, 4));
        assert!(artifact.table_digest.is_empty());
        verify_artifact(&artifact).unwrap();
    }

    #[test]
    fn test_stale_digest_detected() {
        let mut artifact = BatchArtifact::from_batch(&graded());
        artifact.table_digest = "0".repeat(64);
        assert!(matches!(
            verify_artifact(&artifact),
            Err(GradingError::ArtifactDigestMismatch { .. })
        ));
    }

    #[test]
    fn test_tampered_record_detected() {
        let mut value = serde_json::to_value(BatchArtifact::from_batch(&graded())).unwrap();
        value["batch"]["records"][0]["grade"] = serde_json::json!("A*");
        let artifact: BatchArtifact = serde_json::from_value(value).unwrap();
        match verify_artifact(&artifact) {
            Err(GradingError::ArtifactInconsistent { key, .. }) => {
                assert_eq!(key.candidate_id, "C1");
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }
    }
}
