// ============================================================
// Layer 4 — Entity Marker
// ============================================================
// Rewrites a sentence so the classifier can see where the
// subject and object are. Each strategy is a fixed pair of
// (prefix, suffix) strings per role, placed immediately around
// the span's [start, end) chars:
//
//   strategy                  subject                  object
//   ────────────────────────  ───────────────────────  ───────────────────────
//   punct_star                @*PER*영희@              #^PER^철수#
//   punct_kr / default        @*사람*영희@             #^사람^철수#
//   punct_kr_subject_object   @*사람(주체)*영희@       #^사람(대상)^철수#
//   suffix_kr                 영희(사람)               철수(사람)
//   token                     [SUBJ]영희[/SUBJ]        [OBJ]철수[/OBJ]
//   token_with_type           [SUBJ:PER]영희[/SUBJ:PER] [OBJ:PER]철수[/OBJ:PER]
//   swap_token_with_type      [PER]영희[/PER]          [PER]철수[/PER]
//
// Inserting text shifts every later offset, so spans are
// processed from the highest start offset down: the suffix is
// inserted first, then the prefix. Text outside both spans is
// copied untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::entity::{char_to_byte, EntityType, SpanDescriptor};
use crate::domain::error::ReError;
use crate::domain::record::{PreparedRecord, RawRecord};

// ─── MarkerStrategy ───────────────────────────────────────────────────────────
/// Closed set of marking strategies, chosen by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MarkerStrategy {
    PunctStar,
    SuffixKr,
    PunctKr,
    PunctKrSubjectObject,
    Token,
    TokenWithType,
    SwapTokenWithType,
    Default,
}

impl MarkerStrategy {
    pub const ALL: [MarkerStrategy; 8] = [
        MarkerStrategy::PunctStar,
        MarkerStrategy::SuffixKr,
        MarkerStrategy::PunctKr,
        MarkerStrategy::PunctKrSubjectObject,
        MarkerStrategy::Token,
        MarkerStrategy::TokenWithType,
        MarkerStrategy::SwapTokenWithType,
        MarkerStrategy::Default,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MarkerStrategy::PunctStar            => "punct_star",
            MarkerStrategy::SuffixKr             => "suffix_kr",
            MarkerStrategy::PunctKr              => "punct_kr",
            MarkerStrategy::PunctKrSubjectObject => "punct_kr_subject_object",
            MarkerStrategy::Token                => "token",
            MarkerStrategy::TokenWithType        => "token_with_type",
            MarkerStrategy::SwapTokenWithType    => "swap_token_with_type",
            MarkerStrategy::Default              => "default",
        }
    }

    /// Marker strings wrapped around a span of `kind` in `role`.
    pub fn markers(self, role: Role, kind: EntityType) -> (String, String) {
        let (code, kr) = (kind.code(), kind.korean());
        match (self, role) {
            (MarkerStrategy::PunctStar, Role::Subject) => (format!("@*{code}*"), "@".into()),
            (MarkerStrategy::PunctStar, Role::Object)  => (format!("#^{code}^"), "#".into()),

            (MarkerStrategy::PunctKr | MarkerStrategy::Default, Role::Subject) => (format!("@*{kr}*"), "@".into()),
            (MarkerStrategy::PunctKr | MarkerStrategy::Default, Role::Object)  => (format!("#^{kr}^"), "#".into()),

            (MarkerStrategy::PunctKrSubjectObject, Role::Subject) => (format!("@*{kr}(주체)*"), "@".into()),
            (MarkerStrategy::PunctKrSubjectObject, Role::Object)  => (format!("#^{kr}(대상)^"), "#".into()),

            (MarkerStrategy::SuffixKr, _) => (String::new(), format!("({kr})")),

            (MarkerStrategy::Token, r) => {
                let tag = r.tag();
                (format!("[{tag}]"), format!("[/{tag}]"))
            }
            (MarkerStrategy::TokenWithType, r) => {
                let tag = r.tag();
                (format!("[{tag}:{code}]"), format!("[/{tag}:{code}]"))
            }
            (MarkerStrategy::SwapTokenWithType, _) => (format!("[{code}]"), format!("[/{code}]")),
        }
    }

    /// Synthetic tokens this strategy can emit; the tokenizer must keep them whole.
    pub fn special_tokens(self) -> Vec<String> {
        match self {
            MarkerStrategy::Token | MarkerStrategy::TokenWithType | MarkerStrategy::SwapTokenWithType => {
                let mut out = Vec::new();
                for role in [Role::Subject, Role::Object] {
                    for kind in EntityType::ALL {
                        let (pre, suf) = self.markers(role, kind);
                        for tok in [pre, suf] {
                            if !out.contains(&tok) {
                                out.push(tok);
                            }
                        }
                    }
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for MarkerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MarkerStrategy {
    type Err = ReError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarkerStrategy::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ReError::UnknownStrategy(s.to_string()))
    }
}

impl TryFrom<String> for MarkerStrategy {
    type Error = ReError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MarkerStrategy> for String {
    fn from(m: MarkerStrategy) -> Self {
        m.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Subject,
    Object,
}

impl Role {
    fn tag(self) -> &'static str {
        match self {
            Role::Subject => "SUBJ",
            Role::Object  => "OBJ",
        }
    }
}

// ─── EntityMarker ─────────────────────────────────────────────────────────────
/// Applies one strategy. Holds no state beyond the strategy itself.
#[derive(Debug, Clone, Copy)]
pub struct EntityMarker {
    strategy: MarkerStrategy,
}

impl EntityMarker {
    pub fn new(strategy: MarkerStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> MarkerStrategy {
        self.strategy
    }

    /// Insert the strategy's markers around both spans.
    pub fn mark(
        &self,
        sentence: &str,
        subject:  &SpanDescriptor,
        object:   &SpanDescriptor,
    ) -> Result<String, ReError> {
        check_spans(sentence, subject, object)?;

        let mut out = sentence.to_string();
        for (span, role) in descending(subject, object) {
            let (prefix, suffix) = self.strategy.markers(role, span.entity_type);
            // Chars before `span.end` are untouched by earlier insertions.
            let end = char_to_byte(&out, span.end).ok_or_else(|| out_of_bounds(span))?;
            out.insert_str(end, &suffix);
            let start = char_to_byte(&out, span.start).ok_or_else(|| out_of_bounds(span))?;
            out.insert_str(start, &prefix);
        }
        Ok(out)
    }

    /// Remove the markers `mark` inserted; `None` if they are not where expected.
    pub fn strip(
        &self,
        marked:  &str,
        subject: &SpanDescriptor,
        object:  &SpanDescriptor,
    ) -> Option<String> {
        let mut spans = descending(subject, object);
        spans.reverse();

        let chars: Vec<char> = marked.chars().collect();
        let mut out          = String::with_capacity(marked.len());
        let mut cursor       = 0usize; // position in `chars`
        let mut orig         = 0usize; // position in the unmarked sentence

        for (span, role) in spans {
            let (prefix, suffix) = self.strategy.markers(role, span.entity_type);

            let gap = span.start.checked_sub(orig)?;
            out.extend(chars.get(cursor..cursor + gap)?);
            cursor += gap;

            cursor = expect_at(&chars, cursor, &prefix)?;
            out.extend(chars.get(cursor..cursor + span.len())?);
            cursor += span.len();
            cursor = expect_at(&chars, cursor, &suffix)?;

            orig = span.end;
        }
        out.extend(chars.get(cursor..)?);
        Some(out)
    }

    /// Rewrite one raw record into its prepared form.
    pub fn prepare(&self, record: &RawRecord) -> Result<PreparedRecord, ReError> {
        if record.subject.overlaps(&record.object) {
            return Err(ReError::OverlappingSpans { id: record.id.clone() });
        }
        let marked_sentence = self.mark(&record.sentence, &record.subject, &record.object)?;
        Ok(PreparedRecord {
            id:              record.id.clone(),
            marked_sentence,
            subject_word:    record.subject.word.clone(),
            object_word:     record.object.word.clone(),
            subject_type:    record.subject.entity_type,
            object_type:     record.object.entity_type,
            label:           record.label.clone(),
        })
    }
}

/// Spans ordered by (start, end) descending; on a full tie the object comes
/// first so the subject's markers end up leftmost.
fn descending<'a>(
    subject: &'a SpanDescriptor,
    object:  &'a SpanDescriptor,
) -> Vec<(&'a SpanDescriptor, Role)> {
    let mut spans = vec![(subject, Role::Subject), (object, Role::Object)];
    spans.sort_by(|(a, ra), (b, rb)| (b.start, b.end, rb).cmp(&(a.start, a.end, ra)));
    spans
}

fn check_spans(sentence: &str, subject: &SpanDescriptor, object: &SpanDescriptor) -> Result<(), ReError> {
    let len = sentence.chars().count();
    for span in [subject, object] {
        if !span.fits(len) {
            return Err(out_of_bounds(span));
        }
    }
    if subject.overlaps(object) {
        return Err(ReError::malformed(
            "span",
            format!("subject [{}, {}) overlaps object [{}, {})", subject.start, subject.end, object.start, object.end),
        ));
    }
    Ok(())
}

fn out_of_bounds(span: &SpanDescriptor) -> ReError {
    ReError::malformed("end_idx", format!("[{}, {}) outside sentence", span.start, span.end))
}

fn expect_at(chars: &[char], at: usize, text: &str) -> Option<usize> {
    let mut pos = at;
    for c in text.chars() {
        if chars.get(pos) != Some(&c) {
            return None;
        }
        pos += 1;
    }
    Some(pos)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &str = "영희는 철수의 친구이다.";

    fn younghee() -> SpanDescriptor {
        SpanDescriptor::new("영희", 0, 2, EntityType::Per)
    }

    fn cheolsu() -> SpanDescriptor {
        SpanDescriptor::new("철수", 4, 6, EntityType::Per)
    }

    #[test]
    fn test_default_scenario() {
        let marker = EntityMarker::new(MarkerStrategy::Default);
        let out    = marker.mark(SENTENCE, &younghee(), &cheolsu()).unwrap();
        assert_eq!(out, "@*사람*영희@는 #^사람^철수#의 친구이다.");
        assert!(out.contains("영희") && out.contains("철수"));
    }

    #[test]
    fn test_each_strategy_output() {
        let s = younghee();
        let o = SpanDescriptor::new("친구", 8, 10, EntityType::Org);
        let cases = [
            (MarkerStrategy::PunctStar,            "@*PER*영희@는 철수의 #^ORG^친구#이다."),
            (MarkerStrategy::SuffixKr,             "영희(사람)는 철수의 친구(단체)이다."),
            (MarkerStrategy::PunctKr,              "@*사람*영희@는 철수의 #^단체^친구#이다."),
            (MarkerStrategy::PunctKrSubjectObject, "@*사람(주체)*영희@는 철수의 #^단체(대상)^친구#이다."),
            (MarkerStrategy::Token,                "[SUBJ]영희[/SUBJ]는 철수의 [OBJ]친구[/OBJ]이다."),
            (MarkerStrategy::TokenWithType,        "[SUBJ:PER]영희[/SUBJ:PER]는 철수의 [OBJ:ORG]친구[/OBJ:ORG]이다."),
            (MarkerStrategy::SwapTokenWithType,    "[PER]영희[/PER]는 철수의 [ORG]친구[/ORG]이다."),
        ];
        for (strategy, expected) in cases {
            let out = EntityMarker::new(strategy).mark(SENTENCE, &s, &o).unwrap();
            assert_eq!(out, expected, "strategy {strategy}");
        }
    }

    #[test]
    fn test_order_invariance() {
        // Object before subject in the sentence.
        let subject = SpanDescriptor::new("철수", 4, 6, EntityType::Per);
        let object  = SpanDescriptor::new("영희", 0, 2, EntityType::Per);
        let out = EntityMarker::new(MarkerStrategy::Token).mark(SENTENCE, &subject, &object).unwrap();
        assert_eq!(out, "[OBJ]영희[/OBJ]는 [SUBJ]철수[/SUBJ]의 친구이다.");
    }

    #[test]
    fn test_round_trip_all_strategies_both_orders() {
        let pairs = [(younghee(), cheolsu()), (cheolsu(), younghee())];
        for strategy in MarkerStrategy::ALL {
            let marker = EntityMarker::new(strategy);
            for (s, o) in &pairs {
                let marked = marker.mark(SENTENCE, s, o).unwrap();
                assert_eq!(marker.strip(&marked, s, o).as_deref(), Some(SENTENCE), "{strategy}");
            }
        }
    }

    #[test]
    fn test_adjacent_and_empty_spans() {
        let text = "abcd";
        let s = SpanDescriptor::new("ab", 0, 2, EntityType::Org);
        let o = SpanDescriptor::new("cd", 2, 4, EntityType::Loc);
        let e = SpanDescriptor::new("", 2, 2, EntityType::Dat);
        for strategy in MarkerStrategy::ALL {
            let marker = EntityMarker::new(strategy);
            for (a, b) in [(&s, &o), (&o, &s), (&e, &o), (&o, &e), (&e, &e)] {
                let marked = marker.mark(text, a, b).unwrap();
                assert_eq!(marker.strip(&marked, a, b).as_deref(), Some(text));
            }
        }
        let out = EntityMarker::new(MarkerStrategy::Token).mark(text, &s, &o).unwrap();
        assert_eq!(out, "[SUBJ]ab[/SUBJ][OBJ]cd[/OBJ]");
    }

    #[test]
    fn test_deterministic() {
        for strategy in MarkerStrategy::ALL {
            let marker = EntityMarker::new(strategy);
            let a = marker.mark(SENTENCE, &younghee(), &cheolsu()).unwrap();
            let b = marker.mark(SENTENCE, &younghee(), &cheolsu()).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_span_past_sentence_end() {
        let bad = SpanDescriptor::new("x", 10, 40, EntityType::Per);
        let err = EntityMarker::new(MarkerStrategy::PunctKr)
            .mark(SENTENCE, &younghee(), &bad)
            .unwrap_err();
        assert!(matches!(err, ReError::MalformedSpan { .. }));
    }

    #[test]
    fn test_overlapping_record_rejected() {
        let record = RawRecord {
            id:       "7".into(),
            sentence: SENTENCE.into(),
            subject:  SpanDescriptor::new("영희는", 0, 3, EntityType::Per),
            object:   SpanDescriptor::new("희는", 1, 3, EntityType::Per),
            label:    "no_relation".into(),
        };
        let err = EntityMarker::new(MarkerStrategy::PunctKr).prepare(&record).unwrap_err();
        assert_eq!(err, ReError::OverlappingSpans { id: "7".into() });
    }

    #[test]
    fn test_strategy_names_parse() {
        for strategy in MarkerStrategy::ALL {
            assert_eq!(strategy.name().parse::<MarkerStrategy>().unwrap(), strategy);
        }
        assert_eq!(
            "add_entity_magic".parse::<MarkerStrategy>().unwrap_err(),
            ReError::UnknownStrategy("add_entity_magic".into())
        );
    }

    #[test]
    fn test_strategy_serde_rejects_unknown() {
        let ok: MarkerStrategy = serde_json::from_str("\"token_with_type\"").unwrap();
        assert_eq!(ok, MarkerStrategy::TokenWithType);
        assert!(serde_json::from_str::<MarkerStrategy>("\"nope\"").is_err());
    }

    #[test]
    fn test_special_tokens() {
        assert!(MarkerStrategy::PunctKr.special_tokens().is_empty());
        assert_eq!(MarkerStrategy::Token.special_tokens().len(), 4);
        assert_eq!(MarkerStrategy::TokenWithType.special_tokens().len(), 24);
        assert_eq!(MarkerStrategy::SwapTokenWithType.special_tokens().len(), 12);
    }
}
