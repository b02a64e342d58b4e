//! Score intake and the in-process batch registry.
//!
//! Raw scores arrive through a [`ScoreSource`], the boundary to the
//! candidate/subject registry. Open batches live in a [`BatchRegistry`], which
//! guards each batch with its own lock: operations on one batch are
//! serialized, different batches proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::batch::Batch;
use crate::domain::boundary::BoundaryTable;
use crate::domain::error::{GradingError, Result};
use crate::grading::ScoreSubmission;

/// Everything the registry knows about one sitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SittingRoster {
    /// Number of results expected for the sitting.
    pub total_candidates: usize,
    pub submissions: Vec<ScoreSubmission>,
}

/// Supplier of raw scores per sitting.
pub trait ScoreSource: Send + Sync {
    /// Roster for `sitting`.
    ///
    /// # Errors
    ///
    /// Returns `SittingNotFound` when the sitting is unknown.
    fn roster(&self, sitting: &str) -> Result<SittingRoster>;
}

/// Score source backed by a map, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryScoreSource {
    rosters: HashMap<String, SittingRoster>,
}

impl InMemoryScoreSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sitting. `total_candidates` defaults to the submission count.
    pub fn with_sitting(
        mut self,
        sitting: impl Into<String>,
        submissions: Vec<ScoreSubmission>,
    ) -> Self {
        let total_candidates = submissions.len();
        self.insert(
            sitting,
            SittingRoster {
                total_candidates,
                submissions,
            },
        );
        self
    }

    pub fn insert(&mut self, sitting: impl Into<String>, roster: SittingRoster) {
        self.rosters.insert(sitting.into(), roster);
    }
}

impl ScoreSource for InMemoryScoreSource {
    fn roster(&self, sitting: &str) -> Result<SittingRoster> {
        self.rosters
            .get(sitting)
            .cloned()
            .ok_or_else(|| GradingError::SittingNotFound(sitting.to_string()))
    }
}

/// Shared handle to every batch known to the process.
#[derive(Debug, Default)]
pub struct BatchRegistry {
    batches: RwLock<HashMap<Uuid, Arc<Mutex<Batch>>>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a batch and return its id.
    pub fn register(&self, batch: Batch) -> Uuid {
        let id = batch.id();
        self.batches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(batch)));
        id
    }

    /// Create a batch from a sitting's roster and grade it in one step.
    ///
    /// Nothing is registered if the roster cannot be read or grading fails.
    pub fn open_from_source(
        &self,
        source: &dyn ScoreSource,
        sitting: &str,
        exam_year: i32,
        table: BoundaryTable,
    ) -> Result<Uuid> {
        let roster = source.roster(sitting)?;
        let mut batch = Batch::new(sitting, exam_year, roster.total_candidates);
        batch.grade(&roster.submissions, table)?;
        Ok(self.register(batch))
    }

    /// Handle to a batch.
    pub fn get(&self, id: Uuid) -> Result<Arc<Mutex<Batch>>> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(GradingError::BatchNotFound(id))
    }

    /// Run `f` with exclusive access to one batch.
    ///
    /// # Errors
    ///
    /// `BatchNotFound`, `BatchUnavailable` if an earlier caller panicked while
    /// holding the batch, or whatever `f` returns.
    pub fn with_batch<T>(&self, id: Uuid, f: impl FnOnce(&mut Batch) -> Result<T>) -> Result<T> {
        let handle = self.get(id)?;
        let mut batch = handle
            .lock()
            .map_err(|_| GradingError::BatchUnavailable(id))?;
        f(&mut *batch)
    }

    /// Point-in-time copy of a batch, for reporting.
    pub fn snapshot(&self, id: Uuid) -> Result<Batch> {
        self.with_batch(id, |batch| Ok(batch.clone()))
    }

    /// Ids of all registered batches, in no particular order.
    pub fn ids(&self) -> Vec<Uuid> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
