//! Terms and boolean term groups — the leaves of every query tree.

use serde_json::{Map, Value, json};

use crate::bounds::Boundary;

/// Polarity of a term match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Match {
    #[default]
    Eq,
    Ne,
}

impl Match {
    pub fn as_str(self) -> &'static str {
        match self {
            Match::Eq => "match:eq",
            Match::Ne => "match:ne",
        }
    }

    pub fn negated(self) -> Match {
        match self {
            Match::Eq => Match::Ne,
            Match::Ne => Match::Eq,
        }
    }
}

/// How the term key is to be interpreted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermType {
    Regex,
    Punct,
    Wildcard,
}

impl TermType {
    pub fn as_str(self) -> &'static str {
        match self {
            TermType::Regex => "type:regex",
            TermType::Punct => "type:punct",
            TermType::Wildcard => "type:wildcard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    CaseInsensitive,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::CaseInsensitive => "flags:caseInsensitive",
        }
    }
}

/// A single annotation constraint (`koral:term`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Term {
    pub foundry: Option<String>,
    pub layer: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    /// Match polarity; absent on terms that only name a layer (relation
    /// edge labels, bare structure spans) or carry node attributes.
    pub match_op: Option<Match>,
    pub term_type: Option<TermType>,
    pub flags: Vec<Flag>,
    /// Node-attribute constraints (tree queries): root flag, child and
    /// token arity bounds. A term carrying only these emits no `match`.
    pub root: Option<bool>,
    pub arity: Option<Boundary>,
    pub tokenarity: Option<Boundary>,
}

impl Term {
    /// Surface-form term on the given layer (`orth`, `lemma`, ...).
    pub fn new(layer: impl Into<String>, key: impl Into<String>) -> Self {
        Term {
            layer: Some(layer.into()),
            key: Some(key.into()),
            match_op: Some(Match::Eq),
            ..Term::default()
        }
    }

    pub fn with_foundry(mut self, foundry: impl Into<String>) -> Self {
        self.foundry = Some(foundry.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_match(mut self, m: Match) -> Self {
        self.match_op = Some(m);
        self
    }

    pub fn with_type(mut self, t: TermType) -> Self {
        self.term_type = Some(t);
        self
    }

    /// `root`, `arity` and `tokenarity` constraints on a span node.
    pub fn node_attribute(
        root: bool,
        arity: Option<Boundary>,
        tokenarity: Option<Boundary>,
    ) -> Self {
        Term {
            root: root.then_some(true),
            arity,
            tokenarity,
            ..Term::default()
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        if !self.flags.contains(&Flag::CaseInsensitive) {
            self.flags.push(Flag::CaseInsensitive);
        }
        self
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@type".into(), json!("koral:term"));
        if let Some(foundry) = &self.foundry {
            obj.insert("foundry".into(), json!(foundry));
        }
        if let Some(layer) = &self.layer {
            obj.insert("layer".into(), json!(layer));
        }
        if let Some(key) = &self.key {
            obj.insert("key".into(), json!(key));
        }
        if let Some(value) = &self.value {
            obj.insert("value".into(), json!(value));
        }
        if let Some(m) = self.match_op {
            obj.insert("match".into(), json!(m.as_str()));
        }
        if let Some(root) = self.root {
            obj.insert("root".into(), json!(root));
        }
        if let Some(arity) = &self.arity {
            obj.insert("arity".into(), arity.to_value());
        }
        if let Some(tokenarity) = &self.tokenarity {
            obj.insert("tokenarity".into(), tokenarity.to_value());
        }
        if let Some(t) = self.term_type {
            obj.insert("type".into(), json!(t.as_str()));
        }
        if !self.flags.is_empty() {
            let flags: Vec<&str> = self.flags.iter().map(|f| f.as_str()).collect();
            obj.insert("flags".into(), json!(flags));
        }
        Value::Object(obj)
    }
}

/// Boolean connective inside a term group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermRelation {
    And,
    Or,
}

impl TermRelation {
    pub fn as_str(self) -> &'static str {
        match self {
            TermRelation::And => "relation:and",
            TermRelation::Or => "relation:or",
        }
    }
}

/// Coordinated field expression (`koral:termGroup`).
#[derive(Debug, Clone, PartialEq)]
pub struct TermGroup {
    pub relation: TermRelation,
    pub operands: Vec<TermExpr>,
}

impl TermGroup {
    pub fn new(relation: TermRelation, operands: Vec<TermExpr>) -> Self {
        TermGroup { relation, operands }
    }

    pub fn to_value(&self) -> Value {
        let operands: Vec<Value> = self.operands.iter().map(|o| o.to_value()).collect();
        json!({
            "@type": "koral:termGroup",
            "operands": operands,
            "relation": self.relation.as_str(),
        })
    }
}

/// Either a bare term or a nested term group; what a token wraps.
#[derive(Debug, Clone, PartialEq)]
pub enum TermExpr {
    Term(Term),
    Group(TermGroup),
}

impl TermExpr {
    pub fn to_value(&self) -> Value {
        match self {
            TermExpr::Term(t) => t.to_value(),
            TermExpr::Group(g) => g.to_value(),
        }
    }

    /// Flip match polarity, distributing over groups via De Morgan.
    pub fn negate(self) -> TermExpr {
        match self {
            TermExpr::Term(mut t) => {
                t.match_op = t.match_op.map(Match::negated);
                TermExpr::Term(t)
            }
            TermExpr::Group(g) => {
                let relation = match g.relation {
                    TermRelation::And => TermRelation::Or,
                    TermRelation::Or => TermRelation::And,
                };
                let operands = g.operands.into_iter().map(TermExpr::negate).collect();
                TermExpr::Group(TermGroup { relation, operands })
            }
        }
    }
}

impl From<Term> for TermExpr {
    fn from(t: Term) -> Self {
        TermExpr::Term(t)
    }
}

impl From<TermGroup> for TermExpr {
    fn from(g: TermGroup) -> Self {
        TermExpr::Group(g)
    }
}
