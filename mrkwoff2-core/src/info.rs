//! Structured view of the module's info text.
//!
//! The text itself is opaque; this only splits it into a headline and
//! `key: value` lines so it can be rendered or serialized. Unknown shapes
//! degrade to a headline with no fields.

use serde::Serialize;

/// A single `key: value` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoField {
    /// Text before the first `": "`.
    pub key: String,
    /// Text after it, trimmed.
    pub value: String,
}

/// Info text split into lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoReport {
    /// First line that is not a `key: value` pair.
    pub headline: Option<String>,
    /// Every `key: value` line, in order.
    pub fields: Vec<InfoField>,
    /// Remaining lines that fit neither shape.
    pub notes: Vec<String>,
}

impl InfoReport {
    /// Split info text into headline, fields and notes.
    pub fn parse(text: &str) -> Self {
        let mut headline = None;
        let mut fields = Vec::new();
        let mut notes = Vec::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.split_once(": ") {
                Some((key, value)) if !key.is_empty() => fields.push(InfoField {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                }),
                _ if headline.is_none() => headline = Some(line.to_string()),
                _ => notes.push(line.to_string()),
            }
        }

        Self {
            headline,
            fields,
            notes,
        }
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    /// Serialize as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
