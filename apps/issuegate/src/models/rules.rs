//! Schema of one suppression rule document.
//!
//! A document maps resource patterns to entries holding an
//! `ignored issues` map from location pattern to a list of rules:
//!
//! ```yaml
//! issues should occur: true      # optional document default
//! Patient/p1:
//!   ignored issues:
//!     Patient.code:
//!       - message: Invalid code
//!         reason: known data issue
//!         requireOccurrence: false
//! ```
//!
//! Mappings are kept as `serde_yaml::Mapping` so declaration order survives
//! into the compiled rule set.

use serde::Deserialize;

#[derive(Deserialize, Debug, Default)]
/// One YAML document of a rule source.
pub struct RuleDocument {
    /// Default `requireOccurrence` for every rule in this document.
    #[serde(rename = "issues should occur", default)]
    pub issues_should_occur: Option<bool>,
    /// Resource pattern -> [`ResourceEntry`].
    #[serde(flatten)]
    pub resources: serde_yaml::Mapping,
}

#[derive(Deserialize, Debug, Default)]
pub struct ResourceEntry {
    /// Location pattern -> list of [`RuleEntry`].
    #[serde(rename = "ignored issues", default)]
    pub ignored_issues: Option<serde_yaml::Mapping>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    /// Prefix the issue message must start with.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(
        rename = "requireOccurrence",
        alias = "require occurrence",
        alias = "require_occurrence",
        default
    )]
    pub require_occurrence: Option<bool>,
}
