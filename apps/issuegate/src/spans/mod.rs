//! Element span mapping for XML and JSON resources.
//!
//! A span is the inclusive textual extent of one identified element, from
//! the first character of its opening tag (`<` or `{`) to the last character
//! of its closing tag (`>` or `}`). Coordinates are 1-based and columns
//! count characters. Spans are returned in document order of their start,
//! so nested elements yield nested spans after their parent.

pub mod json;
pub mod xml;

use crate::error::{GateError, Result};
use crate::models::Position;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSpan {
    pub start: Position,
    pub end: Position,
    pub id: String,
}

impl ElementSpan {
    pub fn new(start: Position, end: Position, id: impl Into<String>) -> Self {
        Self {
            start,
            end,
            id: id.into(),
        }
    }

    /// Inclusive containment on both ends.
    pub fn contains(&self, p: Position) -> bool {
        self.start <= p && p <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Xml,
    Json,
}

impl SourceKind {
    /// Detect from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(SourceKind::Xml),
            "json" => Some(SourceKind::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Which XML elements contribute spans. JSON ignores the mode.
pub enum SpanMode {
    /// Every element carrying an `id` attribute.
    #[default]
    Any,
    /// Only `element` elements carrying an `id` attribute
    /// (StructureDefinition snapshots and differentials).
    ElementOnly,
}

impl std::str::FromStr for SpanMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "any" => Ok(SpanMode::Any),
            "element-only" => Ok(SpanMode::ElementOnly),
            other => Err(format!(
                "unknown span mode '{}' (expected any|element-only)",
                other
            )),
        }
    }
}

/// Map spans of an already loaded source text.
pub fn map_text(text: &str, kind: SourceKind, mode: SpanMode, path: &Path) -> Result<Vec<ElementSpan>> {
    let spans = match kind {
        SourceKind::Xml => xml::map_spans(text, mode).map_err(|e| GateError::parse(path, e.to_string()))?,
        SourceKind::Json => json::map_spans(text).map_err(|e| GateError::parse(path, e.to_string()))?,
    };
    tracing::debug!(file = %path.display(), count = spans.len(), "mapped element spans");
    Ok(spans)
}

/// Read `path` and map its spans; the kind comes from the extension.
pub fn map_spans(path: &Path, mode: SpanMode) -> Result<Vec<ElementSpan>> {
    let kind = SourceKind::from_path(path).ok_or_else(|| {
        GateError::parse(path, "unsupported file type (expected .xml or .json)")
    })?;
    let text = crate::error::read_file(path)?;
    map_text(&text, kind, mode, path)
}
