//! Grade boundary tables.
//!
//! A [`BoundaryTable`] maps every integer score in `0..=100` to exactly one
//! grade and every grade to its equivalence points. Tables are validated once
//! at construction and never change afterwards; a batch keeps the table it was
//! graded with.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{GradingError, Result};

/// Lowest score on the scale.
pub const MIN_SCORE: i32 = 0;
/// Highest score on the scale.
pub const MAX_SCORE: i32 = 100;

/// One row of a boundary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryEntry {
    pub grade: String,
    /// Lowest score (inclusive) that earns this grade.
    pub min_score: i32,
    /// Equivalence points for the grade.
    pub points: u32,
}

impl BoundaryEntry {
    pub fn new(grade: impl Into<String>, min_score: i32, points: u32) -> Self {
        Self {
            grade: grade.into(),
            min_score,
            points,
        }
    }
}

/// The grade and points awarded for a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeAward {
    pub grade: String,
    pub points: u32,
}

/// Serialized form of a boundary table. Deserializing a [`BoundaryTable`]
/// goes through this type and is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryTableSpec {
    pub boundaries: Vec<BoundaryEntry>,
}

/// Validated, immutable score -> grade -> points mapping.
///
/// # Invariants
///
/// - `entries` is sorted by `min_score`, highest first.
/// - min scores are distinct and inside `0..=100`; the last one is `0`.
/// - grades are unique.
/// - points never increase from a lower-ranked grade to a higher-ranked one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoundaryTableSpec", into = "BoundaryTableSpec")]
pub struct BoundaryTable {
    entries: Vec<BoundaryEntry>,
}

impl BoundaryTable {
    /// Build a table from `(grade, min_score)` pairs and a grade -> points map.
    ///
    /// # Errors
    ///
    /// - `BoundaryOutOfRange` if a min score is outside `0..=100`.
    /// - `DuplicateGrade` if a grade appears twice.
    /// - `BoundaryOverlap` if two grades share a min score.
    /// - `BoundaryGap` if some score has no grade (the lowest boundary is not 0).
    /// - `UnmappedGradePoints` if a grade has no points entry.
    /// - `PointsForUnknownGrade` if the points map names a grade not in the table.
    /// - `NonMonotonicPoints` if a higher grade is worth fewer points than a lower one.
    pub fn new(entries: Vec<(String, i32)>, points: BTreeMap<String, u32>) -> Result<Self> {
        for (grade, min_score) in &entries {
            if !(MIN_SCORE..=MAX_SCORE).contains(min_score) {
                return Err(GradingError::BoundaryOutOfRange {
                    grade: grade.clone(),
                    min_score: *min_score,
                });
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        for (grade, _) in &entries {
            if !seen.insert(grade.clone()) {
                return Err(GradingError::DuplicateGrade {
                    grade: grade.clone(),
                });
            }
        }

        let mut sorted = entries;
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        for pair in sorted.windows(2) {
            if pair[0].1 == pair[1].1 {
                return Err(GradingError::BoundaryOverlap {
                    first: pair[0].0.clone(),
                    second: pair[1].0.clone(),
                    min_score: pair[0].1,
                });
            }
        }

        match sorted.last() {
            Some((_, lowest)) if *lowest == MIN_SCORE => {}
            _ => return Err(GradingError::BoundaryGap { score: MIN_SCORE }),
        }

        for grade in points.keys() {
            if !seen.contains(grade.as_str()) {
                return Err(GradingError::PointsForUnknownGrade {
                    grade: grade.clone(),
                });
            }
        }

        let mut table = Vec::with_capacity(sorted.len());
        for (grade, min_score) in sorted {
            let grade_points = match points.get(&grade) {
                Some(p) => *p,
                None => return Err(GradingError::UnmappedGradePoints { grade }),
            };
            table.push(BoundaryEntry {
                grade,
                min_score,
                points: grade_points,
            });
        }

        for pair in table.windows(2) {
            if pair[0].points < pair[1].points {
                return Err(GradingError::NonMonotonicPoints {
                    higher: pair[0].grade.clone(),
                    higher_points: pair[0].points,
                    lower: pair[1].grade.clone(),
                    lower_points: pair[1].points,
                });
            }
        }

        Ok(Self { entries: table })
    }

    /// Build a table from combined rows (grade, min score and points together).
    pub fn from_entries(entries: Vec<BoundaryEntry>) -> Result<Self> {
        let mut points = BTreeMap::new();
        let mut pairs = Vec::with_capacity(entries.len());
        for entry in entries {
            // A repeated grade is reported by `new`; keep the first points value.
            points.entry(entry.grade.clone()).or_insert(entry.points);
            pairs.push((entry.grade, entry.min_score));
        }
        Self::new(pairs, points)
    }

    /// Standard A-Level table: A*=90, A=80, B=70, C=60, D=50, E=40, U=0 with
    /// UCAS-style points.
    pub fn a_level() -> Self {
        Self {
            entries: vec![
                BoundaryEntry::new("A*", 90, 56),
                BoundaryEntry::new("A", 80, 48),
                BoundaryEntry::new("B", 70, 40),
                BoundaryEntry::new("C", 60, 32),
                BoundaryEntry::new("D", 50, 24),
                BoundaryEntry::new("E", 40, 16),
                BoundaryEntry::new("U", 0, 0),
            ],
        }
    }

    /// Grade and points for `score`.
    ///
    /// The highest boundary not above the score wins, so a score exactly on a
    /// boundary receives that boundary's grade.
    ///
    /// # Errors
    ///
    /// Returns `ScoreOutOfRange` if `score` is outside `0..=100`.
    pub fn grade_for(&self, score: i32) -> Result<GradeAward> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(GradingError::ScoreOutOfRange { key: None, score });
        }
        self.entries
            .iter()
            .find(|e| e.min_score <= score)
            .map(|e| GradeAward {
                grade: e.grade.clone(),
                points: e.points,
            })
            .ok_or(GradingError::BoundaryGap { score })
    }

    /// Rows ordered from the top grade down.
    pub fn entries(&self) -> &[BoundaryEntry] {
        &self.entries
    }

    /// Grades ordered from the top grade down.
    pub fn grades(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.grade.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The grade awarded from score 0 upwards; results with this grade fail.
    pub fn lowest_grade(&self) -> &str {
        self.entries.last().map(|e| e.grade.as_str()).unwrap_or("")
    }

    /// Rank of a grade, 0 being the top grade.
    pub fn rank_of(&self, grade: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.grade == grade)
    }

    /// The `n` highest-ranked rows (fewer if the table is shorter).
    pub fn top_grades(&self, n: usize) -> &[BoundaryEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn points_of(&self, grade: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.grade == grade)
            .map(|e| e.points)
    }

    /// SHA-256 hex digest over the ordered `(grade, min_score, points)` rows.
    ///
    /// Two tables with the same digest grade every score identically.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.grade.as_bytes());
            hasher.update(b"\0");
            hasher.update(entry.min_score.to_be_bytes());
            hasher.update(entry.points.to_be_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

impl TryFrom<BoundaryTableSpec> for BoundaryTable {
    type Error = GradingError;

    fn try_from(spec: BoundaryTableSpec) -> Result<Self> {
        Self::from_entries(spec.boundaries)
    }
}

impl From<BoundaryTable> for BoundaryTableSpec {
    fn from(table: BoundaryTable) -> Self {
        Self {
            boundaries: table.entries,
        }
    }
}
