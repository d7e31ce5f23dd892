//! The checked resource file behind one outcome.
//!
//! The file is read once. Its resource id is extracted eagerly because
//! rule activation needs it; element spans are mapped later, on demand,
//! from the same buffered text.

use crate::error::{GateError, Result};
use crate::spans::{self, ElementSpan, SourceKind, SpanMode};
use crate::xml;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: Option<SourceKind>,
    pub text: Option<String>,
    pub resource_id: Option<String>,
}

impl SourceFile {
    /// Load `path`. A missing file yields a source without text or id.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            warn!(file = %path.display(), "checked file not found; matching by path only");
            return Ok(Self {
                path: path.to_path_buf(),
                kind: SourceKind::from_path(path),
                text: None,
                resource_id: None,
            });
        }
        let text = crate::error::read_file(path)?;
        Self::from_text(path, text)
    }

    pub fn from_text(path: &Path, text: String) -> Result<Self> {
        let kind = SourceKind::from_path(path);
        let resource_id = match kind {
            Some(SourceKind::Xml) => {
                let root = xml::parse_document(&text).map_err(|e| GateError::parse(path, e.to_string()))?;
                xml_resource_id(&root)
            }
            Some(SourceKind::Json) => {
                let body = text.strip_prefix('\u{feff}').unwrap_or(&text);
                let v: serde_json::Value =
                    serde_json::from_str(body).map_err(|e| GateError::parse(path, e.to_string()))?;
                v.get("id").and_then(|id| id.as_str()).map(str::to_string)
            }
            None => None,
        };
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            text: Some(text),
            resource_id,
        })
    }

    /// Map element spans; sources without text or a known kind have none.
    pub fn element_spans(&self, mode: SpanMode) -> Result<Vec<ElementSpan>> {
        match (&self.text, self.kind) {
            (Some(text), Some(kind)) => spans::map_text(text, kind, mode, &self.path),
            _ => Ok(Vec::new()),
        }
    }
}

/// `<id value="..."/>` directly under the root, else the first one anywhere.
fn xml_resource_id(root: &xml::Element) -> Option<String> {
    root.child_value("id")
        .or_else(|| root.find_descendant("id").and_then(|e| e.attr("value")))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_xml_and_json_ids() {
        let x = SourceFile::from_text(
            Path::new("p.xml"),
            r#"<Patient xmlns="http://hl7.org/fhir"><meta><id value="m"/></meta><id value="p1"/></Patient>"#.into(),
        )
        .unwrap();
        assert_eq!(x.resource_id.as_deref(), Some("p1"));

        let j = SourceFile::from_text(Path::new("p.JSON"), r#"{"resourceType":"Patient","id":"p2"}"#.into()).unwrap();
        assert_eq!(j.resource_id.as_deref(), Some("p2"));
        assert_eq!(j.kind, Some(SourceKind::Json));

        let other = SourceFile::from_text(Path::new("notes.txt"), "hello".into()).unwrap();
        assert_eq!(other.resource_id, None);
        assert!(other.element_spans(SpanMode::Any).unwrap().is_empty());
    }

    #[test]
    fn malformed_source_is_a_parse_error() {
        let err = SourceFile::from_text(Path::new("p.json"), "{".into()).unwrap_err();
        assert!(matches!(err, GateError::Parse { .. }));
    }

    #[test]
    fn json_with_byte_order_mark() {
        let s = SourceFile::from_text(Path::new("p.json"), "\u{feff}{\"id\":\"p1\"}".into()).unwrap();
        assert_eq!(s.resource_id.as_deref(), Some("p1"));
        let spans = s.element_spans(SpanMode::Any).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].id, "p1");
    }

    #[test]
    fn missing_file_has_no_id() {
        let s = SourceFile::load(Path::new("/nonexistent/issuegate/p.xml")).unwrap();
        assert_eq!(s.resource_id, None);
        assert!(s.text.is_none());
    }
}
