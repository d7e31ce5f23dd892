//! XML span mapper: a stack of open elements over [`crate::xml::Reader`].

use super::{ElementSpan, SpanMode};
use crate::models::Position;
use crate::xml::{local_name, Attribute, Event, Reader, XmlError};

struct Open {
    start: Position,
    id: Option<String>,
}

fn span_id(name: &str, attributes: &[Attribute], mode: SpanMode) -> Option<String> {
    if mode == SpanMode::ElementOnly && local_name(name) != "element" {
        return None;
    }
    attributes
        .iter()
        .find(|a| a.name == "id")
        .map(|a| a.value.clone())
}

pub fn map_spans(src: &str, mode: SpanMode) -> Result<Vec<ElementSpan>, XmlError> {
    let mut reader = Reader::new(src);
    let mut stack: Vec<Open> = Vec::new();
    let mut spans: Vec<ElementSpan> = Vec::new();
    while let Some(ev) = reader.next_event()? {
        match ev {
            Event::Start {
                name,
                attributes,
                start,
                end,
                empty,
            } => {
                let id = span_id(&name, &attributes, mode);
                if empty {
                    if let Some(id) = id {
                        spans.push(ElementSpan::new(start, end, id));
                    }
                } else {
                    stack.push(Open { start, id });
                }
            }
            Event::End { end, .. } => {
                // The reader guarantees balance; a missing frame cannot happen.
                if let Some(Open { start, id: Some(id) }) = stack.pop() {
                    spans.push(ElementSpan::new(start, end, id));
                }
            }
            Event::Text(_) => {}
        }
    }
    // Closing order is innermost-first; report in opening order.
    spans.sort_by_key(|s| s.start);
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SD: &str = r#"<StructureDefinition xmlns="http://hl7.org/fhir">
  <id value="sd"/>
  <differential>
    <element id="Patient.name">
      <path value="Patient.name"/>
      <extension id="ext1" url="x"/>
    </element>
    <element id="Patient.gender">
      <path value="Patient.gender"/>
    </element>
  </differential>
</StructureDefinition>"#;

    #[test]
    fn maps_nested_spans_in_document_order() {
        let spans = map_spans(SD, SpanMode::Any).unwrap();
        let ids: Vec<&str> = spans.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["Patient.name", "ext1", "Patient.gender"]);
        assert_eq!(spans[0].start, Position::new(4, 5));
        assert_eq!(spans[0].end, Position::new(7, 14));
        assert_eq!(spans[1].start, Position::new(6, 7));
        assert_eq!(spans[1].end, Position::new(6, 36));
    }

    #[test]
    fn element_only_mode_ignores_other_ids() {
        let spans = map_spans(SD, SpanMode::ElementOnly).unwrap();
        let ids: Vec<&str> = spans.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["Patient.name", "Patient.gender"]);
    }

    #[test]
    fn malformed_document_fails() {
        assert!(map_spans("<a id=\"x\"><b></a>", SpanMode::Any).is_err());
    }
}
