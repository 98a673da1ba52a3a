//! Boundaries and distances.

use serde_json::{Map, Value, json};

/// Min/max occurrence bounds. `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub min: u32,
    pub max: Option<u32>,
}

impl Boundary {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        debug_assert!(max.is_none_or(|m| min <= m));
        Boundary { min, max }
    }

    pub fn fixed(n: u32) -> Self {
        Boundary { min: n, max: Some(n) }
    }

    /// Element-wise sum; unbounded if either side is.
    pub fn sum(self, other: Boundary) -> Boundary {
        Boundary {
            min: self.min + other.min,
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a + b),
                _ => None,
            },
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@type".into(), json!("koral:boundary"));
        obj.insert("min".into(), json!(self.min));
        if let Some(max) = self.max {
            obj.insert("max".into(), json!(max));
        }
        Value::Object(obj)
    }
}

/// Text dimension a distance constraint is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceKey {
    Word,
    Sentence,
    Paragraph,
    Text,
}

impl DistanceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceKey::Word => "w",
            DistanceKey::Sentence => "s",
            DistanceKey::Paragraph => "p",
            DistanceKey::Text => "t",
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'w' => Some(DistanceKey::Word),
            's' => Some(DistanceKey::Sentence),
            'p' => Some(DistanceKey::Paragraph),
            't' => Some(DistanceKey::Text),
            _ => None,
        }
    }
}

/// A proximity constraint between two sequence operands
/// (`koral:distance`; COSMAS proximity uses the legacy `cosmas:distance`
/// tag the engine still expects).
#[derive(Debug, Clone, PartialEq)]
pub struct Distance {
    pub key: DistanceKey,
    pub boundary: Boundary,
    pub exclude: bool,
    pub cosmas: bool,
}

impl Distance {
    pub fn new(key: DistanceKey, boundary: Boundary) -> Self {
        Distance { key, boundary, exclude: false, cosmas: false }
    }

    pub fn cosmas(key: DistanceKey, boundary: Boundary) -> Self {
        Distance { key, boundary, exclude: false, cosmas: true }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        let type_tag = if self.cosmas { "cosmas:distance" } else { "koral:distance" };
        obj.insert("@type".into(), json!(type_tag));
        obj.insert("key".into(), json!(self.key.as_str()));
        obj.insert("boundary".into(), self.boundary.to_value());
        if self.exclude {
            obj.insert("exclude".into(), json!(true));
        }
        Value::Object(obj)
    }
}
