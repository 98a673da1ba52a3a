//! Accumulated errors, warnings, messages, and match metadata.
//!
//! Translation is best-effort: local failures append an entry here and
//! drop the offending fragment instead of aborting the query.

use serde_json::{Value, json};

/// Per-query accumulator handed once to the serializer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reports {
    pub errors: Vec<(u32, String)>,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
    /// User-visible class ids (1-127), in first-use order.
    pub highlight: Vec<u32>,
    /// Class-id pairs marking aligned token boundaries; `-1` is the
    /// start/end of the whole match.
    pub alignment: Vec<(i32, i32)>,
}

impl Reports {
    pub fn new() -> Self {
        Reports::default()
    }

    pub fn error(&mut self, code: u32, message: impl Into<String>) {
        self.errors.push((code, message.into()));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn highlight(&mut self, class: u32) {
        if !self.highlight.contains(&class) {
            self.highlight.push(class);
        }
    }

    pub fn alignment(&mut self, left: i32, right: i32) {
        self.alignment.push((left, right));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors_value(&self) -> Value {
        let entries: Vec<Value> = self
            .errors
            .iter()
            .map(|(code, msg)| json!([code, msg]))
            .collect();
        json!(entries)
    }

    pub fn warnings_value(&self) -> Value {
        let entries: Vec<Value> = self.warnings.iter().map(|m| json!([m])).collect();
        json!(entries)
    }

    pub fn messages_value(&self) -> Value {
        let entries: Vec<Value> = self.messages.iter().map(|m| json!([m])).collect();
        json!(entries)
    }
}
