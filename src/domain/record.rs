// ============================================================
// Layer 3 — Relation Records
// ============================================================
// A csv row before and after entity marking.

use serde::{Deserialize, Serialize};

use crate::domain::entity::{EntityType, SpanDescriptor};

/// One input row after both span fields were decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id:       String,
    pub sentence: String,
    pub subject:  SpanDescriptor,
    pub object:   SpanDescriptor,
    pub label:    String,
}

/// A record whose sentence has been rewritten by one marker strategy.
/// Serialised with the column names of the prepared CSV table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedRecord {
    pub id: String,
    #[serde(rename = "sentence")]
    pub marked_sentence: String,
    #[serde(rename = "subject_entity")]
    pub subject_word: String,
    #[serde(rename = "object_entity")]
    pub object_word: String,
    #[serde(rename = "subject_entity_type")]
    pub subject_type: EntityType,
    #[serde(rename = "object_entity_type")]
    pub object_type: EntityType,
    pub label: String,
}
