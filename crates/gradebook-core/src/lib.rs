//! Gradebook Core Library
//!
//! Grade computation and results workflow for examination boards: boundary
//! tables, bulk grading, record verification, batch lifecycle and statistics.

pub mod artifact;
pub mod config;
pub mod domain;
pub mod grading;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod statistics;
pub mod telemetry;
pub mod workflow;

pub use domain::{
    AuditEntry, Batch, BatchProgress, BatchState, BoundaryEntry, BoundaryTable,
    BoundaryTableSpec, ErrorKind, GradeAward, GradingError, RecordKey, Result, ResultRecord,
    ResultState, MAX_SCORE, MIN_SCORE,
};

pub use artifact::{
    read_batch_artifact, write_batch_artifact, BatchArtifact, ARTIFACT_SCHEMA_VERSION,
};
pub use config::{load_config, GradingConfig, GradingScheme};
pub use grading::{batch_grade, grade, GradedScore, ScoreSubmission};
pub use registry::{BatchRegistry, InMemoryScoreSource, ScoreSource, SittingRoster};
pub use statistics::{
    summarize, summarize_with, top_grade_share, GradeShare, StatisticsSummary, SummaryOptions,
};
pub use telemetry::init_tracing;
pub use workflow::RegradeOutcome;

/// Crate version, as recorded in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
