//! Validation findings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Passed,
    Warning,
    Failed,
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingStatus::Passed => write!(f, "passed"),
            FindingStatus::Warning => write!(f, "warning"),
            FindingStatus::Failed => write!(f, "failed"),
        }
    }
}

/// How much a finding matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

impl Impact {
    /// Points deducted from the data-quality score.
    pub fn quality_penalty(&self) -> u32 {
        match self {
            Impact::Low => 1,
            Impact::Medium => 5,
            Impact::High => 10,
            Impact::Critical => 25,
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Low => write!(f, "low"),
            Impact::Medium => write!(f, "medium"),
            Impact::High => write!(f, "high"),
            Impact::Critical => write!(f, "critical"),
        }
    }
}

/// A single validation finding. Created once and appended to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub check: String,
    pub status: FindingStatus,
    pub impact: Impact,
    pub table: Option<String>,
    pub message: String,
    pub recommendation: String,
}

impl ValidationFinding {
    /// A passing check.
    pub fn passed(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status: FindingStatus::Passed,
            impact: Impact::Low,
            table: None,
            message: message.into(),
            recommendation: String::new(),
        }
    }

    /// A warning.
    pub fn warning(
        check: impl Into<String>,
        impact: Impact,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            check: check.into(),
            status: FindingStatus::Warning,
            impact,
            table: None,
            message: message.into(),
            recommendation: recommendation.into(),
        }
    }

    /// A failure.
    pub fn failed(
        check: impl Into<String>,
        impact: Impact,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            check: check.into(),
            status: FindingStatus::Failed,
            impact,
            table: None,
            message: message.into(),
            recommendation: recommendation.into(),
        }
    }

    /// Attach the table the finding is about.
    pub fn for_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Whether the finding blocks completion.
    pub fn is_failure(&self) -> bool {
        self.status == FindingStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Impact::Low < Impact::Critical);
        assert!(FindingStatus::Passed < FindingStatus::Failed);
    }

    #[test]
    fn test_penalties() {
        assert_eq!(Impact::Critical.quality_penalty(), 25);
        assert_eq!(Impact::High.quality_penalty(), 10);
        assert_eq!(Impact::Medium.quality_penalty(), 5);
        assert_eq!(Impact::Low.quality_penalty(), 1);
    }

    #[test]
    fn test_builders() {
        let finding = ValidationFinding::failed("completeness", Impact::High, "lost rows", "roll back")
            .for_table("OCRD");
        assert!(finding.is_failure());
        assert_eq!(finding.table.as_deref(), Some("OCRD"));
        assert!(!ValidationFinding::passed("x", "ok").is_failure());
    }
}
