//! Reconciliation engine: decides, issue by issue, whether a reported
//! finding is suppressed, and reports suppressions that are unjustified or
//! never consumed.
//!
//! A [`ResourceContext`] lives for exactly one outcome:
//!
//! - `activate` selects the rules for the resource (spans not loaded yet);
//! - the first id-based lookup maps the source's element spans;
//! - `check` is called for every issue;
//! - `finish` consumes the context and appends stale-rule defects, so an
//!   outcome cannot be finished twice.

use crate::error::Result;
use crate::models::{Defect, Issue, Position, Severity};
use crate::resolve::resolve;
use crate::rules::{LocationGroup, RuleSet};
use crate::source::SourceFile;
use crate::spans::{ElementSpan, SpanMode};
use tracing::debug;

/// Message of the validator's success sentinel.
pub const ALL_OK: &str = "All OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Kept,
    Suppressed,
}

enum Spans {
    Pending,
    Loaded(Vec<ElementSpan>),
}

pub struct ResourceContext {
    /// Resource id, or the file path when the resource has none.
    label: String,
    source: SourceFile,
    span_mode: SpanMode,
    table: Vec<LocationGroup>,
    spans: Spans,
    defects: Vec<Defect>,
}

impl ResourceContext {
    /// Select the rules applying to `source`, reported as `file`.
    pub fn activate(rules: &RuleSet, source: SourceFile, file: &str, span_mode: SpanMode) -> Self {
        let table = rules.activate(source.resource_id.as_deref(), file);
        let label = source
            .resource_id
            .clone()
            .unwrap_or_else(|| file.to_string());
        Self {
            label,
            source,
            span_mode,
            table,
            spans: Spans::Pending,
            defects: Vec::new(),
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.source.resource_id.as_deref()
    }

    pub fn active_rule_count(&self) -> usize {
        self.table.iter().map(|g| g.rules.len()).sum()
    }

    pub fn spans_loaded(&self) -> bool {
        matches!(self.spans, Spans::Loaded(_))
    }

    /// Decide one issue: structural path first, then the id of the
    /// innermost element around its position.
    pub fn check(&mut self, issue: &Issue) -> Result<Verdict> {
        if self.table.is_empty() {
            return Ok(Verdict::Kept);
        }
        if !issue.expression.is_empty() && self.consume(&issue.expression, &issue.message) {
            return Ok(Verdict::Suppressed);
        }
        if let Some(id) = self.element_at(issue.location)? {
            if self.consume(&id, &issue.message) {
                return Ok(Verdict::Suppressed);
            }
        }
        Ok(Verdict::Kept)
    }

    fn element_at(&mut self, position: Option<Position>) -> Result<Option<String>> {
        if position.is_none() {
            return Ok(None);
        }
        if let Spans::Pending = self.spans {
            self.spans = Spans::Loaded(self.source.element_spans(self.span_mode)?);
        }
        match &self.spans {
            Spans::Loaded(spans) => Ok(resolve(spans, position).map(str::to_string)),
            Spans::Pending => Ok(None),
        }
    }

    /// Mark every rule at a matching location whose prefix matches the
    /// message. Returns whether any did.
    fn consume(&mut self, location: &str, message: &str) -> bool {
        let mut suppressed = false;
        for group in self.table.iter_mut().filter(|g| g.pattern.matches(location)) {
            for rule in group.rules.iter_mut().filter(|r| r.matches_message(message)) {
                if rule.reason.is_none() {
                    self.defects
                        .push(Defect::unjustified(&self.label, location, &rule.message_prefix));
                }
                rule.handled = true;
                suppressed = true;
            }
        }
        if suppressed {
            debug!(resource = %self.label, location, "issue suppressed");
        }
        suppressed
    }

    /// End the outcome: collected defects plus one per required rule that
    /// never fired.
    pub fn finish(self) -> Vec<Defect> {
        let mut defects = self.defects;
        for group in &self.table {
            for rule in group.rules.iter().filter(|r| r.require_occurrence && !r.handled) {
                defects.push(Defect::stale(
                    &self.label,
                    group.pattern.as_str(),
                    &rule.message_prefix,
                ));
            }
        }
        defects
    }
}

/// True for an outcome whose only issue is the validator's "All OK".
pub fn is_success_sentinel(issues: &[Issue]) -> bool {
    matches!(issues, [only] if only.severity == Severity::Information && only.message == ALL_OK)
}

/// Run one outcome's issues through `ctx` and finish it.
///
/// Every issue is evaluated; an error (such as an unparsable source while
/// resolving element ids) discards the partial result entirely.
pub fn reconcile(mut ctx: ResourceContext, issues: Vec<Issue>) -> Result<(Vec<Issue>, Vec<Defect>)> {
    let mut kept = Vec::new();
    if !is_success_sentinel(&issues) {
        for issue in issues {
            if ctx.check(&issue)? == Verdict::Kept {
                kept.push(issue);
            }
        }
    }
    Ok((kept, ctx.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DefectKind;
    use std::path::Path;

    fn rules(text: &str) -> RuleSet {
        let mut set = RuleSet::new();
        set.load_str(text, Path::new("ignored.yaml")).unwrap();
        set
    }

    fn json_source(text: &str) -> SourceFile {
        SourceFile::from_text(Path::new("p1.json"), text.to_string()).unwrap()
    }

    const PATIENT: &str = "{\n  \"resourceType\": \"Patient\",\n  \"id\": \"p1\",\n  \"extension\": [\n    {\n      \"id\": \"ext-a\",\n      \"url\": \"x\"\n    }\n  ]\n}";

    #[test]
    fn suppresses_by_expression_with_prefix() {
        let set = rules("p1:\n  ignored issues:\n    Patient.code:\n      - message: Invalid code\n        reason: known\n");
        let mut ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        let hit = Issue::new(None, Severity::Error, "Invalid code 'X'", "Patient.code");
        let other_msg = Issue::new(None, Severity::Error, "Unknown code", "Patient.code");
        assert_eq!(ctx.check(&hit).unwrap(), Verdict::Suppressed);
        assert_eq!(ctx.check(&other_msg).unwrap(), Verdict::Kept);
        assert!(!ctx.spans_loaded());
        assert!(ctx.finish().is_empty());
    }

    #[test]
    fn suppresses_by_element_id_and_loads_spans_lazily() {
        let set = rules("p1:\n  ignored issues:\n    ext-*:\n      - message: Unknown extension\n        reason: local ext\n");
        let mut ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        assert!(!ctx.spans_loaded());
        let inside = Issue::new(Some(Position::new(6, 7)), Severity::Error, "Unknown extension x", "");
        assert_eq!(ctx.check(&inside).unwrap(), Verdict::Suppressed);
        assert!(ctx.spans_loaded());
        // Resolves to the resource itself, which the rule does not name.
        let outside = Issue::new(Some(Position::new(2, 3)), Severity::Error, "Unknown extension y", "");
        assert_eq!(ctx.check(&outside).unwrap(), Verdict::Kept);
    }

    #[test]
    fn unjustified_rule_still_suppresses() {
        let set = rules("p1:\n  ignored issues:\n    Patient.code:\n      - message: Invalid\n");
        let mut ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        let is = Issue::new(None, Severity::Error, "Invalid code", "Patient.code");
        assert_eq!(ctx.check(&is).unwrap(), Verdict::Suppressed);
        let defects = ctx.finish();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].kind, DefectKind::UnjustifiedSuppression);
        assert_eq!(defects[0].location, "Patient.code");
    }

    #[test]
    fn unconsumed_required_rule_is_stale() {
        let set = rules(
            "p1:\n  ignored issues:\n    Patient.code:\n      - message: Invalid\n        reason: r\n      - message: Maybe\n        reason: r\n        requireOccurrence: false\n",
        );
        let ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        let defects = ctx.finish();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].kind, DefectKind::StaleSuppression);
        assert_eq!(defects[0].resource, "p1");
        assert_eq!(defects[0].location, "Patient.code");
    }

    #[test]
    fn every_matching_rule_is_marked_handled() {
        let set = rules(
            "p1:\n  ignored issues:\n    Patient.*:\n      - message: Invalid\n        reason: r\n    Patient.code:\n      - message: Invalid code\n        reason: r\n",
        );
        let mut ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        let is = Issue::new(None, Severity::Error, "Invalid code", "Patient.code");
        assert_eq!(ctx.check(&is).unwrap(), Verdict::Suppressed);
        assert!(ctx.finish().is_empty());
    }

    #[test]
    fn rules_sharing_a_location_are_all_consumed() {
        let set = rules(
            "p1:\n  ignored issues:\n    Patient.code:\n      - message: Invalid\n        reason: r\n      - message: Invalid code\n        reason: r\n      - message: Unrelated\n        reason: r\n",
        );
        let mut ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        let is = Issue::new(None, Severity::Error, "Invalid code 'X'", "Patient.code");
        assert_eq!(ctx.check(&is).unwrap(), Verdict::Suppressed);
        let defects = ctx.finish();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].kind, DefectKind::StaleSuppression);
        assert_eq!(defects[0].location, "Patient.code");
        assert!(defects[0].message.contains("'Unrelated'"));
    }

    #[test]
    fn sentinel_is_never_checked() {
        let set = rules("p1:\n  ignored issues:\n    \"\":\n      - message: All\n        reason: r\n");
        let ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        let (kept, defects) = reconcile(
            ctx,
            vec![Issue::new(None, Severity::Information, ALL_OK, "")],
        )
        .unwrap();
        assert!(kept.is_empty());
        // The rule did not consume the sentinel.
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].kind, DefectKind::StaleSuppression);
    }

    #[test]
    fn all_ok_among_other_issues_is_a_real_issue() {
        let set = RuleSet::new();
        let ctx = ResourceContext::activate(&set, json_source(PATIENT), "p1.json", SpanMode::Any);
        let issues = vec![
            Issue::new(None, Severity::Information, ALL_OK, ""),
            Issue::new(None, Severity::Warning, "w", ""),
        ];
        let (kept, _) = reconcile(ctx, issues).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn span_parse_failure_aborts_outcome() {
        let set = rules("\"*\":\n  ignored issues:\n    x:\n      - message: m\n        reason: r\n        requireOccurrence: false\n");
        let source = SourceFile {
            path: "broken.xml".into(),
            kind: Some(crate::spans::SourceKind::Xml),
            text: Some("<a><b></a>".into()),
            resource_id: None,
        };
        let ctx = ResourceContext::activate(&set, source, "broken.xml", SpanMode::Any);
        let issues = vec![Issue::new(Some(Position::new(1, 2)), Severity::Error, "m", "")];
        assert!(reconcile(ctx, issues).is_err());
    }
}
