//! The query tree itself: tokens, spans, operation groups, references.

use serde_json::{Map, Value, json};

use crate::bounds::{Boundary, Distance};
use crate::frame::{ClassRefCheck, ClassRefOp, Frame};
use crate::term::{Term, TermExpr};

/// One node of the language-independent query tree. Immutable once linked
/// into a parent; the tree owns its children exclusively.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// A single position match; empty wrap matches any token.
    Token { wrap: Option<TermExpr> },
    /// A structural span (sentence, NP, ...) with optional attribute filter.
    Span {
        wrap: Option<TermExpr>,
        attr: Option<TermExpr>,
    },
    Group(Group),
    Reference(Reference),
    /// Named external query inclusion.
    QueryRef { id: String },
}

impl QueryNode {
    pub fn any_token() -> Self {
        QueryNode::Token { wrap: None }
    }

    pub fn token(wrap: impl Into<TermExpr>) -> Self {
        QueryNode::Token { wrap: Some(wrap.into()) }
    }

    /// Structure span; the sentence span additionally names its layer.
    pub fn span(key: impl Into<String>) -> Self {
        let key = key.into();
        let mut term = Term::default();
        if key == "s" {
            term.layer = Some("s".into());
        }
        term.key = Some(key);
        QueryNode::Span {
            wrap: Some(term.into()),
            attr: None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            QueryNode::Token { wrap } => {
                let mut obj = Map::new();
                obj.insert("@type".into(), json!("koral:token"));
                if let Some(wrap) = wrap {
                    obj.insert("wrap".into(), wrap.to_value());
                }
                Value::Object(obj)
            }
            QueryNode::Span { wrap, attr } => {
                let mut obj = Map::new();
                obj.insert("@type".into(), json!("koral:span"));
                if let Some(wrap) = wrap {
                    obj.insert("wrap".into(), wrap.to_value());
                }
                if let Some(attr) = attr {
                    obj.insert("attr".into(), attr.to_value());
                }
                Value::Object(obj)
            }
            QueryNode::Group(g) => g.to_value(),
            QueryNode::Reference(r) => r.to_value(),
            QueryNode::QueryRef { id } => json!({
                "@type": "koral:queryRef",
                "ref": id,
            }),
        }
    }
}

impl serde::Serialize for QueryNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl From<Group> for QueryNode {
    fn from(g: Group) -> Self {
        QueryNode::Group(g)
    }
}

impl From<Reference> for QueryNode {
    fn from(r: Reference) -> Self {
        QueryNode::Reference(r)
    }
}

/// Edge label of a `relation` group (`koral:relation`).
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSpec {
    pub wrap: Option<TermExpr>,
    pub boundary: Option<Boundary>,
}

impl RelationSpec {
    pub fn wrapping(term: impl Into<TermExpr>) -> Self {
        RelationSpec { wrap: Some(term.into()), boundary: None }
    }

    fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@type".into(), json!("koral:relation"));
        if let Some(wrap) = &self.wrap {
            obj.insert("wrap".into(), wrap.to_value());
        }
        if let Some(boundary) = &self.boundary {
            obj.insert("boundary".into(), boundary.to_value());
        }
        Value::Object(obj)
    }
}

/// An operation over child query nodes (`koral:group`). Variants carry
/// exactly the attributes their operation serializes.
#[derive(Debug, Clone, PartialEq)]
pub enum Group {
    Sequence {
        operands: Vec<QueryNode>,
        in_order: Option<bool>,
        distances: Vec<Distance>,
    },
    Disjunction {
        operands: Vec<QueryNode>,
    },
    Relation {
        operands: Vec<QueryNode>,
        relation: RelationSpec,
    },
    /// Tree dominance: the first operand dominates the second. An edge
    /// label or a depth bound makes the dominance conditional/indirect.
    Hierarchy {
        operands: Vec<QueryNode>,
        relation: Option<RelationSpec>,
        boundary: Option<Boundary>,
    },
    Position {
        operands: Vec<QueryNode>,
        frames: Vec<Frame>,
    },
    Exclusion {
        operands: Vec<QueryNode>,
        frames: Vec<Frame>,
    },
    Class {
        operands: Vec<QueryNode>,
        class_out: Option<u32>,
        class_in: Vec<u32>,
        check: Vec<ClassRefCheck>,
        refop: Option<ClassRefOp>,
    },
    Repetition {
        operands: Vec<QueryNode>,
        boundary: Boundary,
    },
    Merge {
        operands: Vec<QueryNode>,
    },
}

impl Group {
    pub fn sequence(operands: Vec<QueryNode>) -> Self {
        Group::Sequence { operands, in_order: None, distances: Vec::new() }
    }

    pub fn disjunction(operands: Vec<QueryNode>) -> Self {
        Group::Disjunction { operands }
    }

    pub fn position(frames: Vec<Frame>, operands: Vec<QueryNode>) -> Self {
        Group::Position { operands, frames }
    }

    /// Plain class wrap issuing `classOut`.
    pub fn class(class_out: u32, node: QueryNode) -> Self {
        Group::Class {
            operands: vec![node],
            class_out: Some(class_out),
            class_in: Vec::new(),
            check: Vec::new(),
            refop: None,
        }
    }

    /// Set-comparison group over previously issued classes.
    pub fn class_ref_check(
        check: Vec<ClassRefCheck>,
        class_in: Vec<u32>,
        node: QueryNode,
    ) -> Self {
        Group::Class {
            operands: vec![node],
            class_out: None,
            class_in,
            check,
            refop: None,
        }
    }

    /// Set-combination group producing `class_out` from `class_in`.
    pub fn class_ref_op(
        refop: ClassRefOp,
        class_in: Vec<u32>,
        class_out: u32,
        node: QueryNode,
    ) -> Self {
        Group::Class {
            operands: vec![node],
            class_out: Some(class_out),
            class_in,
            check: Vec::new(),
            refop: Some(refop),
        }
    }

    pub fn repetition(boundary: Boundary, node: QueryNode) -> Self {
        Group::Repetition { operands: vec![node], boundary }
    }

    pub fn hierarchy(parent: QueryNode, child: QueryNode) -> Self {
        Group::Hierarchy {
            operands: vec![parent, child],
            relation: None,
            boundary: None,
        }
    }

    pub fn operands(&self) -> &[QueryNode] {
        match self {
            Group::Sequence { operands, .. }
            | Group::Disjunction { operands }
            | Group::Relation { operands, .. }
            | Group::Hierarchy { operands, .. }
            | Group::Position { operands, .. }
            | Group::Exclusion { operands, .. }
            | Group::Class { operands, .. }
            | Group::Repetition { operands, .. }
            | Group::Merge { operands } => operands,
        }
    }

    pub fn operands_mut(&mut self) -> &mut Vec<QueryNode> {
        match self {
            Group::Sequence { operands, .. }
            | Group::Disjunction { operands }
            | Group::Relation { operands, .. }
            | Group::Hierarchy { operands, .. }
            | Group::Position { operands, .. }
            | Group::Exclusion { operands, .. }
            | Group::Class { operands, .. }
            | Group::Repetition { operands, .. }
            | Group::Merge { operands } => operands,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            Group::Sequence { .. } => "operation:sequence",
            Group::Disjunction { .. } => "operation:disjunction",
            Group::Relation { .. } => "operation:relation",
            Group::Hierarchy { .. } => "operation:hierarchy",
            Group::Position { .. } => "operation:position",
            Group::Exclusion { .. } => "operation:exclusion",
            Group::Class { .. } => "operation:class",
            Group::Repetition { .. } => "operation:repetition",
            Group::Merge { .. } => "operation:merge",
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@type".into(), json!("koral:group"));
        obj.insert("operation".into(), json!(self.operation()));
        match self {
            Group::Sequence { in_order, distances, .. } => {
                if let Some(in_order) = in_order {
                    obj.insert("inOrder".into(), json!(in_order));
                }
                if !distances.is_empty() {
                    let ds: Vec<Value> = distances.iter().map(|d| d.to_value()).collect();
                    obj.insert("distances".into(), json!(ds));
                }
            }
            Group::Relation { relation, .. } => {
                obj.insert("relation".into(), relation.to_value());
            }
            Group::Hierarchy { relation, boundary, .. } => {
                if let Some(relation) = relation {
                    obj.insert("relation".into(), relation.to_value());
                }
                if let Some(boundary) = boundary {
                    obj.insert("boundary".into(), boundary.to_value());
                }
            }
            Group::Position { frames, .. } | Group::Exclusion { frames, .. } => {
                let fs: Vec<&str> = frames.iter().map(|f| f.as_str()).collect();
                obj.insert("frames".into(), json!(fs));
            }
            Group::Class { class_out, class_in, check, refop, .. } => {
                if !check.is_empty() {
                    let cs: Vec<&str> = check.iter().map(|c| c.as_str()).collect();
                    obj.insert("classRefCheck".into(), json!(cs));
                }
                if let Some(refop) = refop {
                    obj.insert("classRefOp".into(), json!(refop.as_str()));
                }
                if !class_in.is_empty() {
                    obj.insert("classIn".into(), json!(class_in));
                }
                if let Some(class_out) = class_out {
                    obj.insert("classOut".into(), json!(class_out));
                }
            }
            Group::Repetition { boundary, .. } => {
                obj.insert("boundary".into(), boundary.to_value());
            }
            Group::Disjunction { .. } | Group::Merge { .. } => {}
        }
        let operands: Vec<Value> = self.operands().iter().map(|o| o.to_value()).collect();
        obj.insert("operands".into(), json!(operands));
        Value::Object(obj)
    }
}

/// `focus` or `split` over a reference node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOp {
    Focus,
    Split,
}

impl RefOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RefOp::Focus => "operation:focus",
            RefOp::Split => "operation:split",
        }
    }
}

/// Re-exposes a previously classed or span-addressed subtree as the
/// query's new top-level match (`koral:reference`).
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub operation: RefOp,
    pub class_ref: Vec<u32>,
    /// `(start, length)`; length absent means "to the end".
    pub span_ref: Option<(i32, Option<i32>)>,
    pub class_ref_op: Option<ClassRefOp>,
    pub operands: Vec<QueryNode>,
}

impl Reference {
    pub fn focus(class_ref: u32) -> Self {
        Reference {
            operation: RefOp::Focus,
            class_ref: vec![class_ref],
            span_ref: None,
            class_ref_op: None,
            operands: Vec::new(),
        }
    }

    pub fn focus_on(class_ref: u32, operand: QueryNode) -> Self {
        let mut r = Reference::focus(class_ref);
        r.operands.push(operand);
        r
    }

    pub fn span_focus(start: i32, length: Option<i32>, operand: QueryNode) -> Self {
        Reference {
            operation: RefOp::Focus,
            class_ref: Vec::new(),
            span_ref: Some((start, length)),
            class_ref_op: None,
            operands: vec![operand],
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@type".into(), json!("koral:reference"));
        obj.insert("operation".into(), json!(self.operation.as_str()));
        if !self.class_ref.is_empty() {
            obj.insert("classRef".into(), json!(self.class_ref));
        }
        if let Some(refop) = self.class_ref_op {
            obj.insert("classRefOp".into(), json!(refop.as_str()));
        }
        if let Some((start, length)) = self.span_ref {
            let span_ref = match length {
                Some(length) => json!([start, length]),
                None => json!([start]),
            };
            obj.insert("spanRef".into(), span_ref);
        }
        if !self.operands.is_empty() {
            let operands: Vec<Value> = self.operands.iter().map(|o| o.to_value()).collect();
            obj.insert("operands".into(), json!(operands));
        }
        Value::Object(obj)
    }
}
