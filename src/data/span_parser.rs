// ============================================================
// Layer 4 — Span Descriptor Parser
// ============================================================
// Decodes the serialized entity fields of the KLUE RE csv:
//
//   {'word': '비틀즈', 'start_idx': 24, 'end_idx': 26, 'type': 'ORG'}
//
// The field is a Python dict literal. It is read in two passes:
//
//   1. Syntax  — a small recursive-descent reader turns the text
//                into (key, literal) pairs. Strings may use either
//                quote style and backslash escapes; values are
//                strings or integers.
//   2. Schema  — the pairs must be exactly `word`, `start_idx`,
//                `end_idx` and `type`, each once, with the right
//                literal kind. Offsets are non-negative and
//                start <= end. The type must be a known code.
//
// Every failure names the offending field and its raw text.
//
// Reference: Rust Book §8 (Strings), §9 (Error Handling)

use std::iter::Peekable;
use std::str::CharIndices;

use crate::domain::entity::{EntityType, SpanDescriptor};
use crate::domain::error::ReError;

const KEY_WORD:  &str = "word";
const KEY_START: &str = "start_idx";
const KEY_END:   &str = "end_idx";
const KEY_TYPE:  &str = "type";

/// Field name used for errors that are not tied to a single key.
const WHOLE_FIELD: &str = "span";

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Int(i64),
}

impl Literal {
    fn raw(&self) -> String {
        match self {
            Literal::Str(s) => format!("'{s}'"),
            Literal::Int(i) => i.to_string(),
        }
    }
}

/// Stateless decoder for serialized span records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanDescriptorParser;

impl SpanDescriptorParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw_field: &str) -> Result<SpanDescriptor, ReError> {
        let pairs = Reader::new(raw_field).read_dict()?;

        let mut word:  Option<String>     = None;
        let mut start: Option<usize>      = None;
        let mut end:   Option<usize>      = None;
        let mut kind:  Option<EntityType> = None;

        for (key, value) in pairs {
            match key.as_str() {
                KEY_WORD => {
                    ensure_unset(&word, &key, &value)?;
                    word = Some(expect_str(&key, value)?);
                }
                KEY_START => {
                    ensure_unset(&start, &key, &value)?;
                    start = Some(expect_offset(&key, value)?);
                }
                KEY_END => {
                    ensure_unset(&end, &key, &value)?;
                    end = Some(expect_offset(&key, value)?);
                }
                KEY_TYPE => {
                    ensure_unset(&kind, &key, &value)?;
                    kind = Some(expect_str(&key, value)?.parse()?);
                }
                _ => return Err(ReError::malformed(key, value.raw())),
            }
        }

        let word  = word.ok_or_else(|| missing(KEY_WORD, raw_field))?;
        let start = start.ok_or_else(|| missing(KEY_START, raw_field))?;
        let end   = end.ok_or_else(|| missing(KEY_END, raw_field))?;
        let kind  = kind.ok_or_else(|| missing(KEY_TYPE, raw_field))?;

        if start > end {
            return Err(ReError::malformed(KEY_END, format!("{end} < start_idx {start}")));
        }

        Ok(SpanDescriptor::new(word, start, end, kind))
    }
}

fn missing(key: &str, raw: &str) -> ReError {
    ReError::malformed(key, format!("missing in {raw}"))
}

fn ensure_unset<T>(slot: &Option<T>, key: &str, value: &Literal) -> Result<(), ReError> {
    match slot {
        Some(_) => Err(ReError::malformed(key, format!("duplicate key, value {}", value.raw()))),
        None    => Ok(()),
    }
}

fn expect_str(key: &str, value: Literal) -> Result<String, ReError> {
    match value {
        Literal::Str(s) => Ok(s),
        other           => Err(ReError::malformed(key, other.raw())),
    }
}

fn expect_offset(key: &str, value: Literal) -> Result<usize, ReError> {
    match value {
        Literal::Int(i) if i >= 0 => usize::try_from(i).map_err(|_| ReError::malformed(key, i.to_string())),
        other                     => Err(ReError::malformed(key, other.raw())),
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────────
// Recursive-descent reader over a dict literal of string keys.
struct Reader<'a> {
    raw:   &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Reader<'a> {
    fn new(raw: &'a str) -> Self {
        Self { raw, chars: raw.char_indices().peekable() }
    }

    fn read_dict(mut self) -> Result<Vec<(String, Literal)>, ReError> {
        self.skip_ws();
        self.expect('{')?;
        let mut pairs = Vec::new();

        loop {
            self.skip_ws();
            if self.eat('}') {
                break;
            }
            let key = match self.peek() {
                Some('\'') | Some('"') => self.read_string()?,
                _ => return Err(self.error("expected quoted key")),
            };
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.read_literal(&key)?;
            pairs.push((key, value));

            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.skip_ws();
            self.expect('}')?;
            break;
        }

        self.skip_ws();
        if self.peek().is_some() {
            return Err(self.error("trailing characters after '}'"));
        }
        Ok(pairs)
    }

    fn read_literal(&mut self, key: &str) -> Result<Literal, ReError> {
        match self.peek() {
            Some('\'') | Some('"')               => Ok(Literal::Str(self.read_string()?)),
            Some(c) if c == '-' || c.is_ascii_digit() => self.read_int(key),
            _ => Err(ReError::malformed(key, self.rest())),
        }
    }

    fn read_int(&mut self, key: &str) -> Result<Literal, ReError> {
        let mut text = String::new();
        if self.eat('-') {
            text.push('-');
        }
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.bump();
        }
        text.parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| ReError::malformed(key, text))
    }

    fn read_string(&mut self) -> Result<String, ReError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.read_escape()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, ReError> {
        match self.bump() {
            Some('n')  => Ok('\n'),
            Some('t')  => Ok('\t'),
            Some('r')  => Ok('\r'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"')  => Ok('"'),
            Some('x')  => self.read_hex(2),
            Some('u')  => self.read_hex(4),
            Some('U')  => self.read_hex(8),
            _          => Err(self.error("invalid escape sequence")),
        }
    }

    fn read_hex(&mut self, digits: usize) -> Result<char, ReError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let d = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid hex escape"))?;
            code = code * 16 + d;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), ReError> {
        if self.eat(want) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{want}'")))
        }
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn rest(&mut self) -> String {
        match self.chars.peek() {
            Some(&(i, _)) => self.raw[i..].to_string(),
            None          => String::new(),
        }
    }

    fn error(&self, what: &str) -> ReError {
        ReError::malformed(WHOLE_FIELD, format!("{what} in {}", self.raw))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<SpanDescriptor, ReError> {
        SpanDescriptorParser::new().parse(raw)
    }

    #[test]
    fn test_parses_klue_field() {
        let span = parse("{'word': '비틀즈', 'start_idx': 24, 'end_idx': 26, 'type': 'ORG'}").unwrap();
        assert_eq!(span, SpanDescriptor::new("비틀즈", 24, 26, EntityType::Org));
    }

    #[test]
    fn test_key_order_is_free() {
        let span = parse("{'type': 'PER', 'end_idx': 2, 'word': '영희', 'start_idx': 0}").unwrap();
        assert_eq!(span.word, "영희");
        assert_eq!((span.start, span.end), (0, 2));
    }

    #[test]
    fn test_word_with_comma_colon_and_quote() {
        // Positional splitting on ", " or ':' would break on this word.
        let span = parse(r#"{'word': "O'Neil, Jr.: 1", 'start_idx': 0, 'end_idx': 14, 'type': 'PER'}"#).unwrap();
        assert_eq!(span.word, "O'Neil, Jr.: 1");
    }

    #[test]
    fn test_escaped_quote_in_word() {
        let span = parse(r"{'word': 'it\'s', 'start_idx': 0, 'end_idx': 4, 'type': 'POH'}").unwrap();
        assert_eq!(span.word, "it's");
    }

    #[test]
    fn test_missing_key() {
        let err = parse("{'word': '영희', 'start_idx': 0, 'type': 'PER'}").unwrap_err();
        match err {
            ReError::MalformedSpan { field, .. } => assert_eq!(field, "end_idx"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_key() {
        let err = parse("{'word': 'a', 'start_idx': 0, 'end_idx': 1, 'type': 'PER', 'x': 1}").unwrap_err();
        assert_eq!(err, ReError::malformed("x", "1"));
    }

    #[test]
    fn test_duplicate_key() {
        let err = parse("{'word': 'a', 'word': 'b', 'start_idx': 0, 'end_idx': 1, 'type': 'PER'}").unwrap_err();
        assert!(matches!(err, ReError::MalformedSpan { ref field, .. } if field == "word"));
    }

    #[test]
    fn test_negative_offset() {
        let err = parse("{'word': 'a', 'start_idx': -1, 'end_idx': 1, 'type': 'PER'}").unwrap_err();
        assert_eq!(err, ReError::malformed("start_idx", "-1"));
    }

    #[test]
    fn test_offset_as_string_is_rejected() {
        let err = parse("{'word': 'a', 'start_idx': '0', 'end_idx': 1, 'type': 'PER'}").unwrap_err();
        assert_eq!(err, ReError::malformed("start_idx", "'0'"));
    }

    #[test]
    fn test_start_after_end() {
        let err = parse("{'word': 'a', 'start_idx': 5, 'end_idx': 1, 'type': 'PER'}").unwrap_err();
        assert!(matches!(err, ReError::MalformedSpan { ref field, .. } if field == "end_idx"));
    }

    #[test]
    fn test_unknown_type() {
        let err = parse("{'word': 'a', 'start_idx': 0, 'end_idx': 1, 'type': 'FOO'}").unwrap_err();
        assert_eq!(err, ReError::UnknownEntityType("FOO".into()));
    }

    #[test]
    fn test_not_a_dict() {
        assert!(matches!(parse("영희, 0, 2, PER"), Err(ReError::MalformedSpan { .. })));
        assert!(matches!(parse(""), Err(ReError::MalformedSpan { .. })));
        assert!(matches!(
            parse("{'word': 'a', 'start_idx': 0, 'end_idx': 1, 'type': 'PER'} extra"),
            Err(ReError::MalformedSpan { .. })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            parse("{'word': 'abc, 'start_idx': 0}"),
            Err(ReError::MalformedSpan { .. })
        ));
    }
}
