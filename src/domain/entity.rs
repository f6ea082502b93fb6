// ============================================================
// Layer 3 — Entity Span Types
// ============================================================
// An entity span is a character range inside a sentence plus
// one of six semantic type codes used by the KLUE RE corpus:
//
//   ORG 단체   PER 사람   DAT 날짜
//   LOC 위치   POH 기타   NOH 수량
//
// Offsets count Unicode scalar values (not bytes) and the end
// offset is exclusive, so a span covers chars [start, end).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ReError;

/// The closed set of entity type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "ORG")]
    Org,
    #[serde(rename = "PER")]
    Per,
    #[serde(rename = "DAT")]
    Dat,
    #[serde(rename = "LOC")]
    Loc,
    #[serde(rename = "POH")]
    Poh,
    #[serde(rename = "NOH")]
    Noh,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Org,
        EntityType::Per,
        EntityType::Dat,
        EntityType::Loc,
        EntityType::Poh,
        EntityType::Noh,
    ];

    /// The three-letter corpus code, e.g. `PER`.
    pub fn code(self) -> &'static str {
        match self {
            EntityType::Org => "ORG",
            EntityType::Per => "PER",
            EntityType::Dat => "DAT",
            EntityType::Loc => "LOC",
            EntityType::Poh => "POH",
            EntityType::Noh => "NOH",
        }
    }

    /// Human-readable Korean name used in query templates and Korean markers.
    pub fn korean(self) -> &'static str {
        match self {
            EntityType::Org => "단체",
            EntityType::Per => "사람",
            EntityType::Dat => "날짜",
            EntityType::Loc => "위치",
            EntityType::Poh => "기타",
            EntityType::Noh => "수량",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for EntityType {
    type Err = ReError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.code() == s)
            .ok_or_else(|| ReError::UnknownEntityType(s.to_string()))
    }
}

// ─── SpanDescriptor ───────────────────────────────────────────────────────────
/// One decoded `subject_entity` / `object_entity` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanDescriptor {
    /// Surface form recorded by the annotator
    pub word: String,

    /// First char offset (inclusive)
    pub start: usize,

    /// Last char offset (exclusive)
    pub end: usize,

    pub entity_type: EntityType,
}

impl SpanDescriptor {
    pub fn new(word: impl Into<String>, start: usize, end: usize, entity_type: EntityType) -> Self {
        Self { word: word.into(), start, end, entity_type }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the two half-open ranges share at least one char.
    pub fn overlaps(&self, other: &SpanDescriptor) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when the span fits inside a sentence of `char_len` chars.
    pub fn fits(&self, char_len: usize) -> bool {
        self.start <= self.end && self.end <= char_len
    }

    /// The chars of `sentence` covered by this span, if it fits.
    pub fn slice<'a>(&self, sentence: &'a str) -> Option<&'a str> {
        let from = char_to_byte(sentence, self.start)?;
        let to   = char_to_byte(sentence, self.end)?;
        sentence.get(from..to)
    }
}

/// Byte offset of the `char_idx`-th char; `char_idx == len` maps to the end.
pub fn char_to_byte(s: &str, char_idx: usize) -> Option<usize> {
    s.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(s.len()))
        .nth(char_idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_round_trip() {
        for t in EntityType::ALL {
            assert_eq!(t.code().parse::<EntityType>().unwrap(), t);
        }
    }

    #[test]
    fn test_unknown_type_code() {
        let err = "XYZ".parse::<EntityType>().unwrap_err();
        assert_eq!(err, ReError::UnknownEntityType("XYZ".into()));
    }

    #[test]
    fn test_korean_names() {
        assert_eq!(EntityType::Per.korean(), "사람");
        assert_eq!(EntityType::Org.korean(), "단체");
        assert_eq!(EntityType::Noh.korean(), "수량");
    }

    #[test]
    fn test_slice_uses_char_offsets() {
        let s    = "영희는 철수의 친구이다.";
        let span = SpanDescriptor::new("철수", 4, 6, EntityType::Per);
        assert_eq!(span.slice(s), Some("철수"));
    }

    #[test]
    fn test_slice_past_end_is_none() {
        let span = SpanDescriptor::new("x", 2, 9, EntityType::Per);
        assert_eq!(span.slice("abc"), None);
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = SpanDescriptor::new("ab", 0, 2, EntityType::Per);
        let b = SpanDescriptor::new("cd", 2, 4, EntityType::Per);
        let c = SpanDescriptor::new("bc", 1, 3, EntityType::Per);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }
}
