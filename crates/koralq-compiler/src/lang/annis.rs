//! ANNIS QL front end.
//!
//! ANNIS declares operands once (`cat="NP" & tok="der"`) and constrains
//! them with numbered back-references (`#1 > #2`). The tree output has
//! no aliasing, so the constraint set is handed to [`chain::resolve`],
//! which rewrites operand reuse into class wraps and focus references.

use indexmap::IndexMap;
use logos::Logos;

use koralq_core::status;
use koralq_core::{
    Boundary, Distance, DistanceKey, Frame, Group, Match, QueryNode, Reference, Reports,
    RelationSpec, Term, TermExpr, TermGroup, TermRelation, TermType,
};

use super::Compilation;
use crate::chain::{self, Constraint};
use crate::classes::ClassAllocator;

const PARSE_ERROR: &str = "Could not parse query.";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[token("&")]
    Amp,

    #[token("|")]
    Pipe,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token("==")]
    EqEq,

    #[token("=")]
    Equals,

    #[token("!=")]
    NotEquals,

    #[token("[")]
    BracketOpen,

    #[token("]")]
    BracketClose,

    #[token(">@l")]
    LeftChild,

    #[token(">@r")]
    RightChild,

    #[token(">")]
    Gt,

    #[token("->")]
    Arrow,

    #[token("$")]
    Dollar,

    #[token("^")]
    Caret,

    #[token(".")]
    Dot,

    #[token("*")]
    Star,

    #[regex(r"_(=|i|l|r|o|ol|or)_")]
    SpanRel,

    #[regex(r"#[0-9]+")]
    Ref,

    #[token("/")]
    Slash,

    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    Quoted,

    // Whitespace is excluded from the body so a stray `/` later in the
    // query cannot close a regex literal (escape spaces inside one).
    #[regex(r"/(?:[^/\\ \t\r\n&|]|\\.)+/", priority = 3)]
    Regexp,

    #[regex(r"[0-9]+")]
    Number,

    #[regex(r"[A-Za-z][A-Za-z0-9_\-]*")]
    Ident,
}

/// A binary ANNIS operator, carried through [`chain::resolve`].
#[derive(Debug, Clone)]
enum Op {
    /// `.`, `.n`, `.n,m`, `.*` (ordered) and the `^` near family
    /// (unordered).
    Sequence { distance: Option<Boundary>, in_order: bool },
    /// `>` and its range/alignment variants.
    Dominance {
        boundary: Option<Boundary>,
        edge: Option<TermExpr>,
        align: Option<Frame>,
    },
    /// `$`: both operands are children of one shared parent node.
    CommonParent { boundary: Option<Boundary> },
    /// `->label`: a typed pointing relation.
    Pointing { wrap: Term, boundary: Option<Boundary> },
    /// `_=_`, `_i_`, ... span overlap predicates.
    Position { frames: Vec<Frame> },
}

pub fn compile(query: &str, reports: &mut Reports) -> Compilation {
    if query.trim().is_empty() {
        reports.error(status::NO_QUERY, "The query is empty.");
        return Compilation::empty();
    }
    let Some(tokens) = lex(query, reports) else {
        return Compilation::empty();
    };
    let mut parser = Parser {
        source: query,
        tokens,
        pos: 0,
        slot_counter: 0,
    };
    let mut classes = ClassAllocator::new();

    let mut alternatives = Vec::new();
    loop {
        match parser.alternative(&mut classes, reports) {
            Some(node) => alternatives.push(node),
            None => {
                super::ensure_reported(reports, status::MALFORMED_QUERY, PARSE_ERROR);
                return Compilation::empty();
            }
        }
        if !parser.eat(Tok::Pipe) {
            break;
        }
    }
    if parser.pos < parser.tokens.len() {
        reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
        return Compilation::empty();
    }

    let node = if alternatives.len() == 1 {
        alternatives.pop()
    } else {
        Some(Group::disjunction(alternatives).into())
    };
    match node {
        Some(node) => Compilation::query(node),
        None => Compilation::empty(),
    }
}

fn lex(source: &str, reports: &mut Reports) -> Option<Vec<(Tok, std::ops::Range<usize>)>> {
    let mut tokens = Vec::new();
    let mut lexer = Tok::lexer(source);
    while let Some(result) = lexer.next() {
        match result {
            Ok(kind) => tokens.push((kind, lexer.span())),
            Err(()) => {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                return None;
            }
        }
    }
    Some(tokens)
}

/// Node-attribute constraints gathered from unary relations
/// (`#1:root`, `#1:arity=2`).
#[derive(Default)]
struct UnaryAttrs {
    terms: Vec<Term>,
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(Tok, std::ops::Range<usize>)>,
    pos: usize,
    /// Declaration counter; `#n` refers to the n-th declaration across
    /// the whole query.
    slot_counter: u32,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Tok> {
        self.tokens.get(self.pos).map(|(kind, _)| *kind)
    }

    fn peek_text(&self) -> Option<(Tok, &str)> {
        self.tokens
            .get(self.pos)
            .map(|(kind, span)| (*kind, &self.source[span.clone()]))
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, kind: Tok) -> bool {
        if self.peek() == Some(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn text(&mut self, kind: Tok) -> Option<String> {
        match self.peek_text() {
            Some((k, text)) if k == kind => {
                let text = text.to_string();
                self.bump();
                Some(text)
            }
            _ => None,
        }
    }

    /// One `|`-alternative: `&`-separated declarations, unary
    /// relations, and relation chains, resolved into a single tree.
    fn alternative(
        &mut self,
        classes: &mut ClassAllocator,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        let mut slots: IndexMap<u32, QueryNode> = IndexMap::new();
        let mut constraints: Vec<Constraint<Op>> = Vec::new();
        let mut unary: IndexMap<u32, UnaryAttrs> = IndexMap::new();

        loop {
            self.element(&mut slots, &mut constraints, &mut unary, reports)?;
            if self.peek() == Some(Tok::Amp) {
                self.bump();
                continue;
            }
            break;
        }

        for (slot, attrs) in unary {
            apply_unary(&mut slots, slot, attrs, reports)?;
        }

        chain::resolve(slots, constraints, classes, reports, |op, left, right, classes, _| {
            Some(build(op, left, right, classes))
        })
    }

    /// A declaration, a unary relation, or an operand chain.
    fn element(
        &mut self,
        slots: &mut IndexMap<u32, QueryNode>,
        constraints: &mut Vec<Constraint<Op>>,
        unary: &mut IndexMap<u32, UnaryAttrs>,
        reports: &mut Reports,
    ) -> Option<()> {
        let start = self.pos;
        let first = self.operand(slots, reports)?;

        // `#1:root` and friends attach to the slot, not to a chain.
        if self.peek() == Some(Tok::Colon) {
            self.bump();
            let term = self.unary_relation(reports)?;
            unary.entry(first).or_default().terms.push(term);
            return Some(());
        }

        let mut prev = first;
        let mut prev_start = start;
        let mut parent: Option<u32> = None;
        loop {
            let Some(op) = self.operator(reports)? else {
                break;
            };
            let right_start = self.pos;
            let right = self.operand(slots, reports)?;
            let text = self.span_text(prev_start);
            if let Op::CommonParent { boundary } = &op {
                // All `$` links of one chain share a single invented
                // parent node.
                let parent_slot = match parent {
                    Some(slot) => slot,
                    None => {
                        self.slot_counter += 1;
                        slots.insert(self.slot_counter, QueryNode::Span { wrap: None, attr: None });
                        parent = Some(self.slot_counter);
                        self.slot_counter
                    }
                };
                let op = Op::CommonParent { boundary: *boundary };
                constraints.push(Constraint {
                    left: parent_slot,
                    right: prev,
                    op: op.clone(),
                    text: text.clone(),
                });
                constraints.push(Constraint { left: parent_slot, right, op, text });
            } else {
                constraints.push(Constraint { left: prev, right, op, text });
            }
            prev = right;
            prev_start = right_start;
        }
        Some(())
    }

    /// Source text from the token at `start` up to the current
    /// position, for diagnostics.
    fn span_text(&self, start: usize) -> String {
        let begin = self.tokens[start].1.start;
        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| span.end)
            .unwrap_or(begin);
        self.source[begin..end].trim().to_string()
    }

    /// `#n` or an inline declaration; declarations allocate the next
    /// slot number.
    fn operand(
        &mut self,
        slots: &mut IndexMap<u32, QueryNode>,
        reports: &mut Reports,
    ) -> Option<u32> {
        if let Some(text) = self.text(Tok::Ref) {
            return text[1..].parse().ok();
        }
        let node = self.declaration(reports)?;
        self.slot_counter += 1;
        slots.insert(self.slot_counter, node);
        Some(self.slot_counter)
    }

    fn declaration(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        match self.peek() {
            Some(Tok::Quoted) => {
                let raw = self.text(Tok::Quoted)?;
                Some(QueryNode::token(Term::new("orth", unquote(&raw))))
            }
            Some(Tok::Regexp) => {
                let raw = self.text(Tok::Regexp)?;
                Some(QueryNode::token(
                    Term::new("orth", inner(&raw)).with_type(TermType::Regex),
                ))
            }
            Some(Tok::Ident) => self.annotation(reports),
            _ => {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                None
            }
        }
    }

    /// `(foundry/)? layer ((=|!=) value)?` plus the `tok` and `node`
    /// keywords.
    fn annotation(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let first = self.text(Tok::Ident)?;
        let (foundry, layer) = if self.eat(Tok::Slash) {
            let layer = self.text(Tok::Ident).or_else(|| {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                None
            })?;
            (Some(first), layer)
        } else {
            (None, first)
        };

        let polarity = match self.peek() {
            Some(Tok::Equals) => {
                self.bump();
                Some(Match::Eq)
            }
            Some(Tok::NotEquals) => {
                self.bump();
                Some(Match::Ne)
            }
            _ => None,
        };

        let value = match polarity {
            Some(_) => match self.peek() {
                Some(Tok::Quoted) => {
                    let raw = self.text(Tok::Quoted)?;
                    Some((unquote(&raw), None))
                }
                Some(Tok::Regexp) => {
                    let raw = self.text(Tok::Regexp)?;
                    Some((inner(&raw).to_string(), Some(TermType::Regex)))
                }
                _ => {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
            },
            None => None,
        };

        match (layer.as_str(), &value) {
            ("node", None) => return Some(QueryNode::Span { wrap: None, attr: None }),
            ("tok", None) => return Some(QueryNode::any_token()),
            (_, None) => {
                // A bare identifier is not a valid search expression.
                reports.error(status::MALFORMED_QUERY, "Malformed query.");
                return Some(QueryNode::Span { wrap: None, attr: None });
            }
            _ => {}
        }

        let (key, term_type) = value?;
        let is_span = matches!(layer.as_str(), "cat" | "c");
        let layer = match layer.as_str() {
            "cat" | "c" => "c",
            "tok" => "orth",
            "pos" => "p",
            other => other,
        };
        let mut term = Term::new(layer, key);
        if let Some(foundry) = foundry {
            term = term.with_foundry(foundry);
        }
        if let Some(polarity) = polarity {
            term = term.with_match(polarity);
        }
        if let Some(term_type) = term_type {
            term = term.with_type(term_type);
        }
        if is_span {
            Some(QueryNode::Span { wrap: Some(term.into()), attr: None })
        } else {
            Some(QueryNode::Token { wrap: Some(term.into()) })
        }
    }

    /// The operator between two chain operands, if one follows.
    fn operator(&mut self, reports: &mut Reports) -> Option<Option<Op>> {
        let op = match self.peek_text() {
            Some((Tok::Dot, _)) => {
                self.bump();
                Op::Sequence { distance: self.range(true, reports)?, in_order: true }
            }
            Some((Tok::Caret, _)) => {
                self.bump();
                Op::Sequence { distance: self.range(true, reports)?, in_order: false }
            }
            Some((Tok::LeftChild, _)) => {
                self.bump();
                Op::Dominance { boundary: None, edge: None, align: Some(Frame::StartsWith) }
            }
            Some((Tok::RightChild, _)) => {
                self.bump();
                Op::Dominance { boundary: None, edge: None, align: Some(Frame::EndsWith) }
            }
            Some((Tok::Gt, _)) => {
                self.bump();
                let edge = self.edge_annotation(reports)?;
                Op::Dominance { boundary: self.range(false, reports)?, edge, align: None }
            }
            Some((Tok::Dollar, _)) => {
                self.bump();
                let boundary = if self.eat(Tok::Star) {
                    Some(Boundary::new(1, None))
                } else {
                    None
                };
                Op::CommonParent { boundary }
            }
            Some((Tok::Arrow, _)) => {
                self.bump();
                self.pointing(reports)?
            }
            Some((Tok::SpanRel, text)) => {
                let frames = span_relation_frames(text);
                self.bump();
                Op::Position { frames }
            }
            Some((Tok::EqEq, _)) => {
                reports.error(
                    status::UNKNOWN_QUERY_ELEMENT,
                    "Operator == is currently unsupported.",
                );
                return None;
            }
            _ => return Some(None),
        };
        Some(Some(op))
    }

    /// `*`, `n`, or `n,m` after a distance-like operator. Sequence
    /// distances count gaps, so their bounds are decremented by one.
    fn range(&mut self, decrement: bool, reports: &mut Reports) -> Option<Option<Boundary>> {
        if self.eat(Tok::Star) {
            return Some(Some(Boundary::new(0, None)));
        }
        let Some(min) = self.number() else {
            return Some(None);
        };
        let max = if self.eat(Tok::Comma) { self.number() } else { None };
        if decrement {
            if min == 0 || max == Some(0) {
                reports.error(status::MALFORMED_QUERY, "Distance may not be 0!");
                return None;
            }
            Some(Some(Boundary::new(min - 1, max.map(|m| m - 1))))
        } else {
            Some(Some(Boundary::new(min, max)))
        }
    }

    fn number(&mut self) -> Option<u32> {
        if let Some((Tok::Number, text)) = self.peek_text() {
            let value = text.parse().ok();
            self.bump();
            return value;
        }
        None
    }

    /// `[name="value"]` edge annotation after `>` or a pointing label.
    fn edge_annotation(&mut self, reports: &mut Reports) -> Option<Option<TermExpr>> {
        if !self.eat(Tok::BracketOpen) {
            return Some(None);
        }
        let name = self.text(Tok::Ident).or_else(|| {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            None
        })?;
        if !self.eat(Tok::Equals) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        let raw = self.text(Tok::Quoted).or_else(|| {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            None
        })?;
        if !self.eat(Tok::BracketClose) {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            return None;
        }
        Some(Some(Term::new(name, unquote(&raw)).into()))
    }

    /// `->(foundry/)?label(="value")?([anno])?(range)?`.
    fn pointing(&mut self, reports: &mut Reports) -> Option<Op> {
        let first = self.text(Tok::Ident).or_else(|| {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            None
        })?;
        let (foundry, layer) = if self.eat(Tok::Slash) {
            let layer = self.text(Tok::Ident).or_else(|| {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                None
            })?;
            (Some(first), layer)
        } else {
            (None, first)
        };

        let mut term = Term { layer: Some(layer), ..Term::default() };
        if let Some(foundry) = foundry {
            term = term.with_foundry(foundry);
        }
        if self.eat(Tok::Equals) {
            let raw = self.text(Tok::Quoted).or_else(|| {
                reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                None
            })?;
            term.key = Some(unquote(&raw));
        }
        if let Some(TermExpr::Term(anno)) = self.edge_annotation(reports)? {
            // The annotation value is the edge label when the qualified
            // name alone did not provide one.
            if term.key.is_none() {
                term.key = anno.key;
            } else {
                term.value = anno.key;
            }
        }
        let boundary = self.range(false, reports)?;
        if term.key.is_some() {
            term.match_op = Some(Match::Eq);
        }
        Some(Op::Pointing { wrap: term, boundary })
    }

    /// `root`, `arity=n(,m)`, or `tokenarity=n(,m)`.
    fn unary_relation(&mut self, reports: &mut Reports) -> Option<Term> {
        let name = self.text(Tok::Ident).or_else(|| {
            reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
            None
        })?;
        match name.as_str() {
            "root" => Some(Term::node_attribute(true, None, None)),
            "arity" | "tokenarity" => {
                if !self.eat(Tok::Equals) {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    return None;
                }
                let min = self.number().or_else(|| {
                    reports.error(status::MALFORMED_QUERY, PARSE_ERROR);
                    None
                })?;
                let max = if self.eat(Tok::Comma) {
                    self.number()
                } else {
                    Some(min)
                };
                let bounds = Boundary::new(min, max);
                if name == "arity" {
                    Some(Term::node_attribute(false, Some(bounds), None))
                } else {
                    Some(Term::node_attribute(false, None, Some(bounds)))
                }
            }
            _ => {
                reports.error(
                    status::UNKNOWN_QUERY_ELEMENT,
                    format!("Unary relation {name} is unsupported."),
                );
                None
            }
        }
    }
}

fn apply_unary(
    slots: &mut IndexMap<u32, QueryNode>,
    slot: u32,
    attrs: UnaryAttrs,
    reports: &mut Reports,
) -> Option<()> {
    let Some(QueryNode::Span { attr, .. }) = slots.get_mut(&slot) else {
        reports.error(
            status::MALFORMED_QUERY,
            format!("The unary relation on #{slot} requires a span operand."),
        );
        return None;
    };
    let mut terms = attrs.terms;
    *attr = Some(if terms.len() == 1 {
        terms.remove(0).into()
    } else {
        TermGroup::new(TermRelation::And, terms.into_iter().map(Into::into).collect()).into()
    });
    Some(())
}

fn span_relation_frames(text: &str) -> Vec<Frame> {
    match text {
        "_=_" => vec![Frame::Matches],
        "_i_" => vec![Frame::IsAround],
        "_l_" => vec![Frame::StartsWith, Frame::Matches],
        "_r_" => vec![Frame::EndsWith, Frame::Matches],
        "_o_" => vec![Frame::OverlapsLeft, Frame::OverlapsRight],
        "_ol_" => vec![Frame::OverlapsLeft],
        "_or_" => vec![Frame::OverlapsRight],
        _ => Vec::new(),
    }
}

fn build(op: &Op, left: QueryNode, right: QueryNode, classes: &mut ClassAllocator) -> QueryNode {
    match op {
        Op::Sequence { distance, in_order } => Group::Sequence {
            operands: vec![left, right],
            in_order: Some(*in_order),
            distances: distance
                .map(|b| vec![Distance::new(DistanceKey::Word, b)])
                .unwrap_or_default(),
        }
        .into(),
        Op::Dominance { boundary, edge, align } => {
            let relation = edge.clone().map(RelationSpec::wrapping);
            match align {
                None => Group::Hierarchy {
                    operands: vec![left, right],
                    relation,
                    boundary: *boundary,
                }
                .into(),
                Some(frame) => {
                    let (class, wrapped) = classes.wrap_fresh(right);
                    let hierarchy = Group::Hierarchy {
                        operands: vec![left, wrapped],
                        relation,
                        boundary: *boundary,
                    };
                    Group::position(
                        vec![*frame],
                        vec![hierarchy.into(), Reference::focus(class).into()],
                    )
                    .into()
                }
            }
        }
        Op::CommonParent { boundary } => Group::Relation {
            operands: vec![left, right],
            relation: RelationSpec {
                wrap: Some(Term { layer: Some("c".into()), ..Term::default() }.into()),
                boundary: *boundary,
            },
        }
        .into(),
        Op::Pointing { wrap, boundary } => Group::Relation {
            operands: vec![left, right],
            relation: RelationSpec {
                wrap: Some(wrap.clone().into()),
                boundary: *boundary,
            },
        }
        .into(),
        Op::Position { frames } => Group::position(frames.clone(), vec![left, right]).into(),
    }
}

fn unquote(raw: &str) -> String {
    crate::literal::unquote(raw).unwrap_or_else(|| raw.to_string())
}

/// Text between the delimiters of a `/regex/` literal.
fn inner(raw: &str) -> &str {
    &raw[1..raw.len() - 1]
}
