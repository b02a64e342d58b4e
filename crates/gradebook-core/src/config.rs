//! Grading scheme configuration.
//!
//! Schemes are read from a TOML file, one per examination level and sitting:
//!
//! ```toml
//! default_top_grade_count = 2
//!
//! [[schemes]]
//! level = "A-Level"
//! sitting = "2025-summer"
//! boundaries = [
//!   { grade = "A*", min_score = 90, points = 56 },
//!   { grade = "U", min_score = 0, points = 0 },
//! ]
//! ```
//!
//! Boundaries are kept raw here and only validated when a table is built, so a
//! broken scheme blocks grading for that sitting without hiding the others.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::boundary::{BoundaryEntry, BoundaryTable};
use crate::domain::error::GradingError;
use crate::statistics::{SummaryOptions, DEFAULT_TOP_GRADE_COUNT};

fn default_top_grade_count() -> usize {
    DEFAULT_TOP_GRADE_COUNT
}

/// One level + sitting and its boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingScheme {
    pub level: String,
    pub sitting: String,
    pub boundaries: Vec<BoundaryEntry>,
}

impl GradingScheme {
    /// Build and validate this scheme's table.
    pub fn table(&self) -> crate::domain::error::Result<BoundaryTable> {
        BoundaryTable::from_entries(self.boundaries.clone())
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingConfig {
    #[serde(default = "default_top_grade_count")]
    pub default_top_grade_count: usize,
    #[serde(default)]
    pub schemes: Vec<GradingScheme>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            default_top_grade_count: DEFAULT_TOP_GRADE_COUNT,
            schemes: Vec::new(),
        }
    }
}

impl GradingConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("parse grading config")
    }

    /// The scheme for a level and sitting, if configured.
    pub fn scheme(&self, level: &str, sitting: &str) -> Option<&GradingScheme> {
        self.schemes
            .iter()
            .find(|s| s.level == level && s.sitting == sitting)
    }

    /// Validated boundary table for a level and sitting.
    ///
    /// # Errors
    ///
    /// `SchemeNotFound`, or the configuration error that makes the scheme's
    /// boundaries invalid.
    pub fn table_for(
        &self,
        level: &str,
        sitting: &str,
    ) -> crate::domain::error::Result<BoundaryTable> {
        self.scheme(level, sitting)
            .ok_or_else(|| GradingError::SchemeNotFound {
                level: level.to_string(),
                sitting: sitting.to_string(),
            })?
            .table()
    }

    /// Check every scheme, collecting all problems rather than the first.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut problems = Vec::new();
        if self.default_top_grade_count == 0 {
            problems.push("default_top_grade_count must be at least 1".to_string());
        }
        for (index, scheme) in self.schemes.iter().enumerate() {
            if self.schemes[..index]
                .iter()
                .any(|s| s.level == scheme.level && s.sitting == scheme.sitting)
            {
                problems.push(format!(
                    "{} / {}: scheme defined more than once",
                    scheme.level, scheme.sitting
                ));
            }
            if let Err(e) = scheme.table() {
                problems.push(format!("{} / {}: {}", scheme.level, scheme.sitting, e));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            top_grade_count: self.default_top_grade_count,
        }
    }
}

/// Read and parse a grading config file.
pub fn load_config(path: &Path) -> Result<GradingConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read grading config {:?}", path))?;
    GradingConfig::from_toml_str(&content).with_context(|| format!("load {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_top_grade_count = 3

[[schemes]]
level = "A-Level"
sitting = "2025-summer"
boundaries = [
  { grade = "A*", min_score = 90, points = 56 },
  { grade = "A", min_score = 80, points = 48 },
  { grade = "B", min_score = 70, points = 40 },
  { grade = "C", min_score = 60, points = 32 },
  { grade = "D", min_score = 50, points = 24 },
  { grade = "E", min_score = 40, points = 16 },
  { grade = "U", min_score = 0, points = 0 },
]

[[schemes]]
level = "GCSE"
sitting = "2025-summer"
boundaries = [
  { grade = "Pass", min_score = 45, points = 1 },
  { grade = "Fail", min_score = 5, points = 0 },
]
"#;

    #[test]
    fn test_parse_and_build_table() {
        let config = GradingConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.schemes.len(), 2);
        assert_eq!(config.summary_options().top_grade_count, 3);
        let table = config.table_for("A-Level", "2025-summer").unwrap();
        assert_eq!(table, BoundaryTable::a_level());
    }

    #[test]
    fn test_broken_scheme_blocks_only_itself() {
        let config = GradingConfig::from_toml_str(SAMPLE).unwrap();
        assert!(matches!(
            config.table_for("GCSE", "2025-summer"),
            Err(GradingError::BoundaryGap { score: 0 })
        ));
        assert!(config.table_for("A-Level", "2025-summer").is_ok());
    }

    #[test]
    fn test_unknown_scheme() {
        let config = GradingConfig::from_toml_str(SAMPLE).unwrap();
        assert!(matches!(
            config.table_for("A-Level", "2024-winter"),
            Err(GradingError::SchemeNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = GradingConfig::from_toml_str(SAMPLE).unwrap();
        config.default_top_grade_count = 0;
        config.schemes.push(config.schemes[0].clone());
        let problems = config.validate().unwrap_err();
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("GCSE")));
        assert!(problems.iter().any(|p| p.contains("more than once")));
    }

    #[test]
    fn test_defaults_when_omitted() {
        let config = GradingConfig::from_toml_str("").unwrap();
        assert_eq!(config, GradingConfig::default());
        assert!(config.validate().is_ok());
    }
}
