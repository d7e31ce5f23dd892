//! Suppression rule set: loading, wildcard patterns, and activation.
//!
//! Rule documents are compiled once into a two-level table
//! (resource pattern -> location pattern -> rules). Identical pattern
//! strings from different documents share one group and their rules
//! accumulate. Activation hands out *copies* of the matching rules, so
//! consumption state never leaks between outcomes.

use crate::error::{GateError, Result};
use crate::models::rules::{ResourceEntry, RuleDocument, RuleEntry};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Clone)]
/// Anchored wildcard pattern: `*` matches any run of characters, every
/// other character matches itself.
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn compile(source: &str) -> Result<Self> {
        let body = source
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^(?s:{})$", body)).map_err(|e| {
            GateError::Configuration(format!("invalid pattern '{}': {}", source, e))
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn is_wildcard(&self) -> bool {
        self.source.contains('*')
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One declared exemption. `handled` flips to true the first time the
/// rule suppresses an issue within an activation.
pub struct SuppressionRule {
    pub resource_pattern: String,
    pub location_pattern: String,
    pub message_prefix: String,
    pub reason: Option<String>,
    pub require_occurrence: bool,
    pub handled: bool,
}

impl SuppressionRule {
    pub fn matches_message(&self, message: &str) -> bool {
        message.starts_with(&self.message_prefix)
    }
}

#[derive(Debug, Clone)]
/// Rules sharing one location pattern.
pub struct LocationGroup {
    pub pattern: Pattern,
    pub rules: Vec<SuppressionRule>,
}

#[derive(Debug)]
struct ResourceGroup {
    pattern: Pattern,
    locations: Vec<LocationGroup>,
}

#[derive(Debug, Default)]
pub struct RuleSet {
    groups: Vec<ResourceGroup>,
}

fn key_string(key: &Yaml) -> Option<String> {
    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Decode an order-preserving mapping into `(key, T)` pairs.
fn entries<T: for<'de> Deserialize<'de>>(
    map: serde_yaml::Mapping,
    what: &str,
    origin: &Path,
) -> Result<Vec<(String, T)>> {
    let mut out = Vec::with_capacity(map.len());
    for (k, v) in map {
        let key = key_string(&k)
            .ok_or_else(|| GateError::parse(origin, format!("{} keys must be scalars", what)))?;
        let value: T = serde_yaml::from_value(v)
            .map_err(|e| GateError::parse(origin, format!("{} '{}': {}", what, key, e)))?;
        out.push((key, value));
    }
    Ok(out)
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge every source in order.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut set = RuleSet::new();
        for p in paths {
            set.load_file(p)?;
        }
        Ok(set)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GateError::Configuration(format!(
                "cannot read ignored issues file {}: {}",
                path.display(),
                e
            ))
        })?;
        self.load_str(&text, path)
    }

    /// Merge all YAML documents in `text`. `origin` is used for messages.
    pub fn load_str(&mut self, text: &str, origin: &Path) -> Result<()> {
        for doc in serde_yaml::Deserializer::from_str(text) {
            let value = Yaml::deserialize(doc).map_err(|e| GateError::parse(origin, e.to_string()))?;
            if value.is_null() {
                warn!(file = %origin.display(), "empty ignored issues document");
                continue;
            }
            let doc: RuleDocument =
                serde_yaml::from_value(value).map_err(|e| GateError::parse(origin, e.to_string()))?;
            self.add_document(doc, origin)?;
        }
        debug!(file = %origin.display(), rules = self.rule_count(), "loaded ignored issues");
        Ok(())
    }

    fn add_document(&mut self, doc: RuleDocument, origin: &Path) -> Result<()> {
        let default_require = doc.issues_should_occur.unwrap_or(true);
        for (resource, entry) in entries::<ResourceEntry>(doc.resources, "resource", origin)? {
            let Some(ignored) = entry.ignored_issues else {
                continue;
            };
            let resource_pattern = Pattern::compile(&resource)?;
            for (location, list) in entries::<Vec<RuleEntry>>(ignored, "location", origin)? {
                let location_pattern = Pattern::compile(&location)?;
                let mut rules = Vec::with_capacity(list.len());
                for e in list {
                    rules.push(compile_rule(e, &resource_pattern, &location, default_require, origin)?);
                }
                self.group_mut(&resource_pattern)
                    .location_mut(&location_pattern)
                    .rules
                    .extend(rules);
            }
        }
        Ok(())
    }

    fn group_mut(&mut self, pattern: &Pattern) -> &mut ResourceGroup {
        let idx = match self
            .groups
            .iter()
            .position(|g| g.pattern.as_str() == pattern.as_str())
        {
            Some(i) => i,
            None => {
                self.groups.push(ResourceGroup {
                    pattern: pattern.clone(),
                    locations: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count() == 0
    }

    pub fn rule_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.locations.iter())
            .map(|l| l.rules.len())
            .sum()
    }

    /// Copy out every rule whose resource pattern matches `resource_id`
    /// (when present) or `file_path`, merged by location pattern.
    pub fn activate(&self, resource_id: Option<&str>, file_path: &str) -> Vec<LocationGroup> {
        let mut table: Vec<LocationGroup> = Vec::new();
        for g in &self.groups {
            let hit = resource_id.is_some_and(|id| g.pattern.matches(id)) || g.pattern.matches(file_path);
            if !hit {
                continue;
            }
            debug!(pattern = g.pattern.as_str(), file = file_path, "activated resource rules");
            for loc in &g.locations {
                let fresh = loc.rules.iter().cloned().map(|mut r| {
                    r.handled = false;
                    r
                });
                match table
                    .iter_mut()
                    .find(|t| t.pattern.as_str() == loc.pattern.as_str())
                {
                    Some(existing) => existing.rules.extend(fresh),
                    None => table.push(LocationGroup {
                        pattern: loc.pattern.clone(),
                        rules: fresh.collect(),
                    }),
                }
            }
        }
        table
    }
}

impl ResourceGroup {
    fn location_mut(&mut self, pattern: &Pattern) -> &mut LocationGroup {
        let idx = match self
            .locations
            .iter()
            .position(|l| l.pattern.as_str() == pattern.as_str())
        {
            Some(i) => i,
            None => {
                self.locations.push(LocationGroup {
                    pattern: pattern.clone(),
                    rules: Vec::new(),
                });
                self.locations.len() - 1
            }
        };
        &mut self.locations[idx]
    }
}

fn compile_rule(
    entry: RuleEntry,
    resource: &Pattern,
    location: &str,
    default_require: bool,
    origin: &Path,
) -> Result<SuppressionRule> {
    let message_prefix = entry.message.ok_or_else(|| {
        GateError::Configuration(format!(
            "ignored issue for '{}' at '{}' in {} has no message",
            resource.as_str(),
            location,
            origin.display()
        ))
    })?;
    let require_occurrence = entry.require_occurrence.unwrap_or(default_require);
    if require_occurrence && resource.is_wildcard() {
        return Err(GateError::Configuration(format!(
            "wildcards were used to suppress an issue on multiple resources ('{}' in {}), \
             but this is only allowed for issues that aren't required to occur",
            resource.as_str(),
            origin.display()
        )));
    }
    Ok(SuppressionRule {
        resource_pattern: resource.as_str().to_string(),
        location_pattern: location.to_string(),
        message_prefix,
        reason: entry.reason,
        require_occurrence,
        handled: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> Result<RuleSet> {
        let mut set = RuleSet::new();
        set.load_str(text, Path::new("ignored.yaml"))?;
        Ok(set)
    }

    #[test]
    fn wildcard_patterns_are_anchored() {
        let p = Pattern::compile("Patient/*").unwrap();
        assert!(p.matches("Patient/123"));
        assert!(p.matches("Patient/"));
        assert!(!p.matches("Observation/123"));
        assert!(!p.matches("xPatient/1"));
        let all = Pattern::compile("*").unwrap();
        assert!(all.matches("anything at all"));
        assert!(all.matches(""));
        let lit = Pattern::compile("Patient.name[0].given").unwrap();
        assert!(lit.matches("Patient.name[0].given"));
        assert!(!lit.matches("PatientXname[0].given"));
    }

    #[test]
    fn loads_and_activates_by_id_or_path() {
        let set = load(
            r#"
p1:
  ignored issues:
    Patient.code:
      - message: Invalid code
        reason: known data issue
"#,
        )
        .unwrap();
        assert_eq!(set.rule_count(), 1);
        let t = set.activate(Some("p1"), "/data/p1.json");
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].rules[0].message_prefix, "Invalid code");
        assert!(t[0].rules[0].require_occurrence);
        assert!(set.activate(Some("p2"), "/data/p1.json").is_empty());
        assert_eq!(set.activate(None, "p1").len(), 1);
    }

    #[test]
    fn duplicate_keys_accumulate_across_documents() {
        let set = load(
            r#"
p1:
  ignored issues:
    Patient.code:
      - message: A
        reason: r
---
p1:
  ignored issues:
    Patient.code:
      - message: B
        reason: r
    Patient.name:
      - message: C
        reason: r
"#,
        )
        .unwrap();
        let t = set.activate(Some("p1"), "x.json");
        assert_eq!(t.len(), 2);
        let code: Vec<&str> = t[0].rules.iter().map(|r| r.message_prefix.as_str()).collect();
        assert_eq!(code, vec!["A", "B"]);
    }

    #[test]
    fn wildcard_resource_requires_optional_occurrence() {
        let err = load(
            r#"
"Patient/*":
  ignored issues:
    "*":
      - message: x
        reason: r
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));

        let ok = load(
            r#"
issues should occur: false
"Patient/*":
  ignored issues:
    "*":
      - message: x
        reason: r
"#,
        )
        .unwrap();
        let t = ok.activate(Some("Patient/9"), "f.xml");
        assert!(!t[0].rules[0].require_occurrence);

        let per_rule = load(
            r#"
"*":
  ignored issues:
    "*":
      - message: x
        reason: r
        requireOccurrence: false
"#,
        );
        assert!(per_rule.is_ok());
    }

    #[test]
    fn rule_without_message_is_rejected() {
        let err = load("p1:\n  ignored issues:\n    a:\n      - reason: r\n").unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            load("p1: [unclosed").unwrap_err(),
            GateError::Parse { .. }
        ));
        assert!(matches!(
            load("p1:\n  ignored issues:\n    a:\n      - message: m\n        typo: 1\n").unwrap_err(),
            GateError::Parse { .. }
        ));
    }

    #[test]
    fn overlapping_resource_groups_merge_by_location() {
        let set = load(
            r#"
issues should occur: false
"*":
  ignored issues:
    Patient.code:
      - message: generic
p1:
  ignored issues:
    Patient.code:
      - message: specific
        reason: r
"#,
        )
        .unwrap();
        let t = set.activate(Some("p1"), "p1.json");
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].rules.len(), 2);
    }

    #[test]
    fn entries_without_ignored_issues_are_skipped() {
        let set = load("p1:\n  note: nothing here\n").unwrap();
        assert!(set.is_empty());
    }
}
