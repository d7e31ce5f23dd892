//! Reader for validator reports.
//!
//! The validator emits FHIR `OperationOutcome` resources, one per checked
//! file, either alone or gathered in a `Bundle`. Both the XML and the JSON
//! encodings are accepted; the encoding is sniffed from the first
//! non-blank character.

use crate::error::{GateError, Result};
use crate::models::{Issue, Position, Severity};
use crate::xml::{self, Element};
use serde_json::Value as Json;
use std::path::{Path, PathBuf};

pub const FILE_EXTENSION: &str = "http://hl7.org/fhir/StructureDefinition/operationoutcome-file";
pub const LINE_EXTENSION: &str = "http://hl7.org/fhir/StructureDefinition/operationoutcome-issue-line";
pub const COL_EXTENSION: &str = "http://hl7.org/fhir/StructureDefinition/operationoutcome-issue-col";

const NO_DESCRIPTION: &str = "_No description_";

#[derive(Debug, Clone, PartialEq, Eq)]
/// One validation result: the checked file and its issues, in order.
pub struct Outcome {
    pub file: String,
    pub issues: Vec<Issue>,
}

pub fn read_report(path: &Path) -> Result<Vec<Outcome>> {
    let text = crate::error::read_file(path)?;
    parse_report(&text, path)
}

pub fn parse_report(text: &str, path: &Path) -> Result<Vec<Outcome>> {
    let body = text.strip_prefix('\u{feff}').unwrap_or(text);
    match body.trim_start().chars().next() {
        Some('{') | Some('[') => parse_json_report(body, path),
        _ => parse_xml_report(body, path),
    }
}

fn severity(raw: Option<&str>, file: &str) -> Result<Severity> {
    let raw = raw.unwrap_or_default();
    raw.parse().map_err(|_| GateError::UnknownSeverity {
        severity: raw.to_string(),
        path: PathBuf::from(file),
    })
}

fn location(line: Option<u32>, col: Option<u32>) -> Option<Position> {
    match (line, col) {
        (Some(l), Some(c)) => Some(Position::new(l, c)),
        _ => None,
    }
}

fn parse_xml_report(text: &str, path: &Path) -> Result<Vec<Outcome>> {
    let root = xml::parse_document(text).map_err(|e| GateError::parse(path, e.to_string()))?;
    let mut outcomes: Vec<&Element> = Vec::new();
    if root.local_name() == "OperationOutcome" {
        outcomes.push(&root);
    } else {
        root.descendants_named("OperationOutcome", &mut outcomes);
    }
    outcomes.into_iter().map(|o| xml_outcome(o, path)).collect()
}

fn xml_extension<'e>(el: &'e Element, url: &str, value: &str) -> Option<&'e str> {
    el.children_named("extension")
        .find(|e| e.attr("url") == Some(url))
        .and_then(|e| e.child_value(value))
}

fn xml_outcome(outcome: &Element, path: &Path) -> Result<Outcome> {
    let file = xml_extension(outcome, FILE_EXTENSION, "valueString")
        .ok_or_else(|| GateError::parse(path, "OperationOutcome without a file extension"))?
        .to_string();
    let mut issues = Vec::new();
    for is in outcome.children_named("issue") {
        let message = is
            .child("details")
            .and_then(|d| d.child_value("text"))
            .unwrap_or(NO_DESCRIPTION);
        let line = xml_extension(is, LINE_EXTENSION, "valueInteger").and_then(|v| v.trim().parse().ok());
        let col = xml_extension(is, COL_EXTENSION, "valueInteger").and_then(|v| v.trim().parse().ok());
        let expression = is
            .child_value("expression")
            .or_else(|| is.child_value("location"))
            .unwrap_or_default();
        issues.push(Issue::new(
            location(line, col),
            severity(is.child_value("severity"), &file)?,
            message,
            expression,
        ));
    }
    Ok(Outcome { file, issues })
}

fn parse_json_report(text: &str, path: &Path) -> Result<Vec<Outcome>> {
    let root: Json = serde_json::from_str(text).map_err(|e| GateError::parse(path, e.to_string()))?;
    let mut found: Vec<&Json> = Vec::new();
    collect_json_outcomes(&root, &mut found);
    found.into_iter().map(|o| json_outcome(o, path)).collect()
}

/// Depth-first search for `OperationOutcome` resources.
fn collect_json_outcomes<'v>(v: &'v Json, out: &mut Vec<&'v Json>) {
    match v {
        Json::Object(map) => {
            if map.get("resourceType").and_then(Json::as_str) == Some("OperationOutcome") {
                out.push(v);
                return;
            }
            for child in map.values() {
                collect_json_outcomes(child, out);
            }
        }
        Json::Array(items) => {
            for child in items {
                collect_json_outcomes(child, out);
            }
        }
        _ => {}
    }
}

fn json_extension<'v>(v: &'v Json, url: &str, value: &str) -> Option<&'v Json> {
    v.get("extension")?
        .as_array()?
        .iter()
        .find(|e| e.get("url").and_then(Json::as_str) == Some(url))?
        .get(value)
}

fn json_u32(v: Option<&Json>) -> Option<u32> {
    match v? {
        Json::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First string of a FHIR `string[]` element (or a bare string).
fn first_string(v: Option<&Json>) -> Option<&str> {
    match v? {
        Json::Array(items) => items.first().and_then(Json::as_str),
        Json::String(s) => Some(s),
        _ => None,
    }
}

fn json_outcome(outcome: &Json, path: &Path) -> Result<Outcome> {
    let file = json_extension(outcome, FILE_EXTENSION, "valueString")
        .and_then(Json::as_str)
        .ok_or_else(|| GateError::parse(path, "OperationOutcome without a file extension"))?
        .to_string();
    let mut issues = Vec::new();
    for is in outcome
        .get("issue")
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let message = is
            .get("details")
            .and_then(|d| d.get("text"))
            .and_then(Json::as_str)
            .unwrap_or(NO_DESCRIPTION);
        let line = json_u32(json_extension(is, LINE_EXTENSION, "valueInteger"));
        let col = json_u32(json_extension(is, COL_EXTENSION, "valueInteger"));
        let expression = first_string(is.get("expression"))
            .or_else(|| first_string(is.get("location")))
            .unwrap_or_default();
        issues.push(Issue::new(
            location(line, col),
            severity(is.get("severity").and_then(Json::as_str), &file)?,
            message,
            expression,
        ));
    }
    Ok(Outcome { file, issues })
}
