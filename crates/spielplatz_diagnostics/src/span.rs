//! Span and location types for source coordinates.
//!
//! The engine reports every position in three coordinate systems at
//! once. None of them can be derived from the others without the source
//! buffer, so all three travel together.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// A position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Line number as reported by the engine.
    pub line: u32,
    /// Column number as reported by the engine.
    pub column: u32,
    /// Character offset from the start of the source.
    ///
    /// Decoding also accepts `charIdx`. A location carrying both spellings
    /// is rejected as a duplicate field.
    #[serde(alias = "charIdx")]
    pub char_index: u32,
}

impl Location {
    /// Creates a new location.
    #[inline]
    pub const fn new(line: u32, column: u32, char_index: u32) -> Self {
        Self {
            line,
            column,
            char_index,
        }
    }
}

/// A range in source text.
///
/// The end never lies before the start in character order. A zero-width
/// span (`start == end`) is valid and marks a point diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSpan")]
pub struct Span {
    start: Location,
    end: Location,
}

/// Unchecked wire shape of a span.
#[derive(Deserialize)]
struct RawSpan {
    start: Location,
    end: Location,
}

impl TryFrom<RawSpan> for Span {
    type Error = ProtocolError;

    fn try_from(raw: RawSpan) -> Result<Self, Self::Error> {
        Span::new(raw.start, raw.end)
    }
}

impl Span {
    /// Creates a span, rejecting an end that precedes the start.
    pub fn new(start: Location, end: Location) -> Result<Self, ProtocolError> {
        if end.char_index < start.char_index {
            return Err(ProtocolError::InvertedSpan {
                start: start.char_index,
                end: end.char_index,
            });
        }
        Ok(Self { start, end })
    }

    /// Creates a zero-width span at `at`.
    #[inline]
    pub const fn point(at: Location) -> Self {
        Self { start: at, end: at }
    }

    /// Start of the span.
    #[inline]
    pub const fn start(&self) -> Location {
        self.start
    }

    /// End of the span.
    #[inline]
    pub const fn end(&self) -> Location {
        self.end
    }

    /// Returns the length of the span in characters.
    #[inline]
    pub const fn len(&self) -> u32 {
        self.end.char_index - self.start.char_index
    }

    /// Returns true for a zero-width span.
    #[inline]
    pub const fn is_point(&self) -> bool {
        self.start.char_index == self.end.char_index
    }

    /// Returns true if this span covers the given character offset.
    #[inline]
    pub const fn contains(&self, char_index: u32) -> bool {
        self.start.char_index <= char_index && char_index < self.end.char_index
    }

    /// Returns true if the span starts and ends on the same line.
    #[inline]
    pub const fn is_single_line(&self) -> bool {
        self.start.line == self.end.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_new() {
        let span = Span::new(Location::new(1, 0, 0), Location::new(1, 5, 5)).unwrap();
        assert_eq!(span.start().char_index, 0);
        assert_eq!(span.end().char_index, 5);
        assert_eq!(span.len(), 5);
        assert!(!span.is_point());
    }

    #[test]
    fn test_span_rejects_inverted_range() {
        let result = Span::new(Location::new(1, 5, 5), Location::new(1, 2, 2));
        assert!(matches!(
            result,
            Err(ProtocolError::InvertedSpan { start: 5, end: 2 })
        ));
    }

    #[test]
    fn test_point_span() {
        let span = Span::point(Location::new(3, 4, 20));
        assert!(span.is_point());
        assert_eq!(span.len(), 0);
        assert!(!span.contains(20));
    }

    #[test]
    fn test_span_contains() {
        let span = Span::new(Location::new(1, 2, 2), Location::new(1, 6, 6)).unwrap();
        assert!(!span.contains(1));
        assert!(span.contains(2));
        assert!(span.contains(5));
        assert!(!span.contains(6));
    }

    #[test]
    fn test_multiline_span() {
        let span = Span::new(Location::new(1, 4, 4), Location::new(3, 0, 20)).unwrap();
        assert!(!span.is_single_line());
    }

    #[test]
    fn test_location_accepts_legacy_field_name() {
        let loc: Location =
            serde_json::from_str(r#"{ "line": 2, "column": 3, "charIdx": 11 }"#).unwrap();
        assert_eq!(loc, Location::new(2, 3, 11));
    }

    #[test]
    fn test_location_rejects_both_field_names() {
        let json = r#"{ "line": 2, "column": 3, "charIndex": 11, "charIdx": 11 }"#;

        let err = serde_json::from_str::<Location>(json).unwrap_err();

        assert!(err.to_string().contains("duplicate field `charIndex`"), "{err}");
    }

    #[test]
    fn test_location_serializes_camel_case() {
        let json = serde_json::to_string(&Location::new(1, 2, 3)).unwrap();
        assert_eq!(json, r#"{"line":1,"column":2,"charIndex":3}"#);
    }

    #[test]
    fn test_span_deserialize_rejects_inverted() {
        let json = r#"{
            "start": { "line": 1, "column": 9, "charIndex": 9 },
            "end": { "line": 1, "column": 1, "charIndex": 1 }
        }"#;
        let err = serde_json::from_str::<Span>(json).unwrap_err();
        assert!(err.to_string().contains("precedes"));
    }

    #[test]
    fn test_location_rejects_negative_coordinates() {
        let result = serde_json::from_str::<Location>(r#"{ "line": -1, "column": 0, "charIndex": 0 }"#);
        assert!(result.is_err());
    }
}
