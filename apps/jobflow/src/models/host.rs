use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type FieldId = String;
pub type RecordId = String;

/// Field id → cell value, as sent to the host when appending a row.
pub type RecordFields = HashMap<FieldId, Value>;

/// Column metadata as listed by the host table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub id: FieldId,
    pub name: String,
}

/// A row already present in the host table, offered for resume analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingJobOpening {
    pub record_id: RecordId,
    pub position: String,
}

/// Reads a text cell. The host returns either a plain string or a list of
/// rich-text segments (`[{"type":"text","text":"..."}]`); only the first
/// segment is taken.
pub fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Array(segments) => segments.first()?.get("text")?.as_str()?,
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
