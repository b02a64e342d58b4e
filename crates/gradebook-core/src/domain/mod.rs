//! Domain models for the gradebook.
//!
//! Canonical definitions for the core entities:
//! - `BoundaryTable`: validated score -> grade -> points mapping
//! - `ResultRecord`: one candidate/subject outcome and its verification state
//! - `Batch`: all results of one sitting and their lifecycle

pub mod batch;
pub mod boundary;
pub mod error;
pub mod record;

// Re-export main types and errors
pub use batch::{AuditEntry, Batch, BatchProgress, BatchState};
pub use boundary::{
    BoundaryEntry, BoundaryTable, BoundaryTableSpec, GradeAward, MAX_SCORE, MIN_SCORE,
};
pub use error::{ErrorKind, GradingError, Result};
pub use record::{RecordKey, ResultRecord, ResultState};
