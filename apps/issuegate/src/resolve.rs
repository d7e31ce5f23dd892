//! Location resolver: reported (line, column) -> innermost element id.

use crate::models::Position;
use crate::spans::ElementSpan;

/// Id of the innermost span containing `position`, if any.
///
/// An unknown position never resolves. Among containing spans the one
/// opened last wins; with well-nested spans that is the innermost.
pub fn resolve(spans: &[ElementSpan], position: Option<Position>) -> Option<&str> {
    let p = position?;
    spans
        .iter()
        .filter(|s| s.contains(p))
        .max_by_key(|s| s.start)
        .map(|s| s.id.as_str())
}
