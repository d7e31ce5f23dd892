//! Report driver: reconciles every outcome of a report and aggregates the
//! verdict.
//!
//! Outcomes are independent once rules are activated per resource, so they
//! are processed in parallel; results keep report order.

use crate::engine::{reconcile, ResourceContext};
use crate::error::Result;
use crate::models::{OutcomeResult, RunResult, Severity};
use crate::report::{self, Outcome};
use crate::rules::RuleSet;
use crate::source::SourceFile;
use crate::spans::SpanMode;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub fail_at: Severity,
    pub span_mode: SpanMode,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            fail_at: Severity::Error,
            span_mode: SpanMode::Any,
        }
    }
}

/// Read `report_path` and reconcile all of its outcomes against `rules`.
pub fn run_check(report_path: &Path, rules: &RuleSet, settings: &RunSettings) -> Result<RunResult> {
    let outcomes = report::read_report(report_path)?;
    let base = report_path.parent().unwrap_or(Path::new("."));
    run_outcomes(outcomes, base, rules, settings)
}

/// Reconcile already parsed outcomes. Relative file paths that do not
/// exist from the working directory are looked up under `base`.
///
/// On failure the error of the earliest failing outcome in report order
/// is returned.
pub fn run_outcomes(
    outcomes: Vec<Outcome>,
    base: &Path,
    rules: &RuleSet,
    settings: &RunSettings,
) -> Result<RunResult> {
    let attempts: Vec<Result<OutcomeResult>> = outcomes
        .into_par_iter()
        .map(|o| process_outcome(o, base, rules, settings.span_mode))
        .collect();
    let results = attempts.into_iter().collect::<Result<Vec<_>>>()?;
    let res = RunResult::new(results, settings.fail_at);
    info!(
        outcomes = res.outcomes.len(),
        success = res.success,
        "reconciliation finished"
    );
    Ok(res)
}

fn locate(file: &str, base: &Path) -> PathBuf {
    let p = PathBuf::from(file);
    if p.is_relative() && !p.exists() {
        base.join(p)
    } else {
        p
    }
}

pub fn process_outcome(
    outcome: Outcome,
    base: &Path,
    rules: &RuleSet,
    span_mode: SpanMode,
) -> Result<OutcomeResult> {
    let source = SourceFile::load(&locate(&outcome.file, base))?;
    let ctx = ResourceContext::activate(rules, source, &outcome.file, span_mode);
    debug!(
        file = %outcome.file,
        resource = ctx.resource_id().unwrap_or("-"),
        rules = ctx.active_rule_count(),
        "processing outcome"
    );
    let resource_id = ctx.resource_id().map(str::to_string);
    let (kept, defects) = reconcile(ctx, outcome.issues)?;
    Ok(OutcomeResult {
        file: outcome.file,
        resource_id,
        kept,
        defects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use std::fs;

    #[test]
    fn earliest_failing_outcome_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut outcomes = Vec::new();
        for i in 0..16 {
            let p = dir.path().join(format!("r{:02}.json", i));
            // Every file from r03 on is malformed.
            let body = if i < 3 { "{\"id\": \"ok\"}" } else { "{" };
            fs::write(&p, body).unwrap();
            outcomes.push(Outcome {
                file: p.to_string_lossy().to_string(),
                issues: vec![],
            });
        }
        let expected = dir.path().join("r03.json");
        for _ in 0..8 {
            let err = run_outcomes(outcomes.clone(), dir.path(), &RuleSet::new(), &RunSettings::default())
                .unwrap_err();
            match err {
                GateError::Parse { path, .. } => assert_eq!(path, expected),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn relative_files_fall_back_to_report_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("issuegate-p9.json"), "{\"id\": \"p9\"}").unwrap();
        let out = vec![Outcome {
            file: "issuegate-p9.json".into(),
            issues: vec![],
        }];
        let res = run_outcomes(out, dir.path(), &RuleSet::new(), &RunSettings::default()).unwrap();
        assert_eq!(res.outcomes[0].resource_id.as_deref(), Some("p9"));
        assert!(res.success);
    }
}
