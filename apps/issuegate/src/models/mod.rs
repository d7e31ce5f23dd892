//! Shared data models for reconciliation results and the rule schema.

pub mod rules;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Issue severity. Ordering follows gravity: `Fatal` is the greatest.
pub enum Severity {
    Information,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// All levels, most severe first (report and statistics order).
    pub const ALL: [Severity; 4] = [
        Severity::Fatal,
        Severity::Error,
        Severity::Warning,
        Severity::Information,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Information => "information",
        }
    }

    /// True when `self` is as grave as `threshold` or graver.
    pub fn at_least(self, threshold: Severity) -> bool {
        self >= threshold
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fatal" => Ok(Severity::Fatal),
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "information" => Ok(Severity::Information),
            other => Err(UnknownSeverity(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// A 1-based line/column coordinate. Ordered in document order.
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One reported finding. `location` is `None` when the report gave no
/// line/column pair.
pub struct Issue {
    pub location: Option<Position>,
    pub severity: Severity,
    pub message: String,
    pub expression: String,
}

impl Issue {
    pub fn new(
        location: Option<Position>,
        severity: Severity,
        message: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            location,
            severity,
            message: message.into(),
            expression: expression.into(),
        }
    }

    /// Render the location as `(line, col)`, using `?` when unknown.
    pub fn location_label(&self) -> String {
        match self.location {
            Some(p) => format!("({}, {})", p.line, p.column),
            None => "(?, ?)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    /// A rule matched but carries no `reason`.
    UnjustifiedSuppression,
    /// A rule required to occur never matched within its resource.
    StaleSuppression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A synthetic, always-fatal finding produced by reconciliation itself.
pub struct Defect {
    pub kind: DefectKind,
    /// Resource id, or the file path when the resource has no id.
    pub resource: String,
    /// Matched location (unjustified) or declared location pattern (stale).
    pub location: String,
    pub message: String,
}

impl Defect {
    pub fn unjustified(resource: &str, location: &str, message_prefix: &str) -> Self {
        Self {
            kind: DefectKind::UnjustifiedSuppression,
            resource: resource.to_string(),
            location: location.to_string(),
            message: format!(
                "Issue ignored without providing a reason (message '{}')",
                message_prefix
            ),
        }
    }

    pub fn stale(resource: &str, location_pattern: &str, message_prefix: &str) -> Self {
        Self {
            kind: DefectKind::StaleSuppression,
            resource: resource.to_string(),
            location: location_pattern.to_string(),
            message: format!(
                "An ignored issue was provided for {} at '{}', but the issue didn't occur (message '{}')",
                resource, location_pattern, message_prefix
            ),
        }
    }

    /// Fold the defect into the normal issue stream.
    pub fn to_issue(&self) -> Issue {
        Issue::new(None, Severity::Fatal, self.message.clone(), self.location.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
/// Reconciliation result for one outcome of the report.
pub struct OutcomeResult {
    pub file: String,
    pub resource_id: Option<String>,
    pub kept: Vec<Issue>,
    pub defects: Vec<Defect>,
}

impl OutcomeResult {
    /// Kept issues followed by defects rendered as fatal issues.
    pub fn all_issues(&self) -> Vec<Issue> {
        let mut out = self.kept.clone();
        out.extend(self.defects.iter().map(Defect::to_issue));
        out
    }

    pub fn is_clean(&self) -> bool {
        self.kept.is_empty() && self.defects.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Remaining issue counts per severity; defects count as fatal.
pub struct Summary {
    pub fatal: usize,
    pub error: usize,
    pub warning: usize,
    pub information: usize,
}

impl Summary {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Fatal => self.fatal += 1,
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
            Severity::Information => self.information += 1,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Fatal => self.fatal,
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Information => self.information,
        }
    }

    pub fn from_outcomes(outcomes: &[OutcomeResult]) -> Self {
        let mut s = Summary::default();
        for o in outcomes {
            for is in &o.kept {
                s.add(is.severity);
            }
            for _ in &o.defects {
                s.add(Severity::Fatal);
            }
        }
        s
    }
}

#[derive(Debug, Clone, Serialize)]
/// Run-level container consumed by printers and the exit-code decision.
pub struct RunResult {
    pub outcomes: Vec<OutcomeResult>,
    pub summary: Summary,
    pub fail_at: Severity,
    pub success: bool,
}

impl RunResult {
    /// Aggregate outcomes into a verdict: fail when any kept issue reaches
    /// `fail_at` or any defect exists.
    pub fn new(outcomes: Vec<OutcomeResult>, fail_at: Severity) -> Self {
        let success = outcomes.iter().all(|o| {
            o.defects.is_empty() && o.kept.iter().all(|is| !is.severity.at_least(fail_at))
        });
        let summary = Summary::from_outcomes(&outcomes);
        Self {
            outcomes,
            summary,
            fail_at,
            success,
        }
    }
}
