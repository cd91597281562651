//! Value structure summaries for output previews

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::structure::{ARRAY_SAMPLE_ITEMS, OBJECT_SAMPLE_FIELDS, STRING_SAMPLE_CHARS};

/// Shape of a value, with small samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ValueStructure {
    Null,
    Boolean {
        sample: bool,
    },
    Number {
        sample: serde_json::Number,
    },
    String {
        length: usize,
        sample: String,
    },
    Array {
        length: usize,
        /// Structure of the first few items
        items: Vec<ValueStructure>,
    },
    Object {
        /// Structure of the first few fields, in key order
        fields: Vec<(String, ValueStructure)>,
        /// Fields left out of the summary
        #[serde(default, skip_serializing_if = "is_zero")]
        more: usize,
    },
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ValueStructure {
    /// Summarize a value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean { sample: *b },
            Value::Number(n) => Self::Number { sample: n.clone() },
            Value::String(s) => Self::String {
                length: s.chars().count(),
                sample: s.chars().take(STRING_SAMPLE_CHARS).collect(),
            },
            Value::Array(items) => Self::Array {
                length: items.len(),
                items: items.iter().take(ARRAY_SAMPLE_ITEMS).map(Self::of).collect(),
            },
            Value::Object(map) => Self::Object {
                fields: map
                    .iter()
                    .take(OBJECT_SAMPLE_FIELDS)
                    .map(|(k, v)| (k.clone(), Self::of(v)))
                    .collect(),
                more: map.len().saturating_sub(OBJECT_SAMPLE_FIELDS),
            },
        }
    }

    /// Short type name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean { .. } => "boolean",
            Self::Number { .. } => "number",
            Self::String { .. } => "string",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }
}
