//! Poliqarp+ front end.
//!
//! Poliqarp+ is positional: a query is a sequence of segments (bracketed
//! feature bundles, bare words, structure spans) with regex-style
//! quantifiers, plus wrapping operators (classes, focus/split,
//! containment, relation calls) written as functions. Unlike the
//! reference-based languages there is no operand aliasing, so the parse
//! maps onto the tree directly.

use logos::Logos;
use serde_json::{Value, json};

use koralq_core::status;
use koralq_core::{
    Boundary, ClassRefOp, Frame, Group, Match, QueryNode, RefOp, Reference, Reports,
    RelationSpec, Term, TermExpr, TermGroup, TermRelation, TermType,
};

use super::Compilation;
use crate::literal::substring_regex;

const META_WARNING: &str = "You used the 'meta' keyword in a PoliqarpPlus query. \
     This feature is currently not supported. Please use virtual collections to \
     restrict documents by metadata.";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[token("[")]
    BracketOpen,

    #[token("]")]
    BracketClose,

    #[token("<")]
    AngleOpen,

    #[token(">")]
    AngleClose,

    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token("{#")]
    QueryRefOpen,

    #[token("{")]
    BraceOpen,

    #[token("}")]
    BraceClose,

    #[token("|")]
    Pipe,

    #[token("&")]
    Amp,

    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEquals,

    #[token("=")]
    Equals,

    #[token("!")]
    Bang,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    #[token("^")]
    Caret,

    #[token("*")]
    Star,

    #[token("+")]
    Plus,

    #[token("?")]
    Question,

    #[token("/")]
    Slash,

    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    Quoted,

    #[regex(r"'(?:[^'\\]|\\.)*'")]
    Verbatim,

    #[regex(r"[0-9]+")]
    Number,

    #[regex(r"[\p{L}_][\p{L}\p{N}_\-]*")]
    Word,
}

pub fn compile(query: &str, reports: &mut Reports) -> Compilation {
    if query.trim().is_empty() {
        reports.error(status::NO_QUERY, "The query is empty.");
        return Compilation::empty();
    }
    let parse_error = format!("Could not parse query >>> {query} <<<.");
    let Some(tokens) = lex(query, reports, &parse_error) else {
        return Compilation::empty();
    };
    let mut parser = Parser {
        source: query,
        tokens,
        pos: 0,
        align_counter: 0,
        depth: 0,
    };

    let node = parser.alternation(reports);
    let node = match node {
        Some(node) => node,
        None => {
            super::ensure_reported(reports, status::MALFORMED_QUERY, &parse_error);
            return Compilation::empty();
        }
    };
    let node = match parser.within(node, reports) {
        Some(node) => node,
        None => {
            super::ensure_reported(reports, status::MALFORMED_QUERY, &parse_error);
            return Compilation::empty();
        }
    };
    let collection = if parser.at_keyword("meta") {
        parser.bump();
        reports.warning(META_WARNING);
        match parser.meta_fields(reports) {
            Some(collection) => Some(collection),
            None => {
                super::ensure_reported(reports, status::MALFORMED_QUERY, &parse_error);
                return Compilation::empty();
            }
        }
    } else {
        None
    };
    if parser.pos < parser.tokens.len() {
        reports.error(status::MALFORMED_QUERY, parse_error);
        return Compilation::empty();
    }
    Compilation { query: Some(node), collection }
}

fn lex(
    source: &str,
    reports: &mut Reports,
    parse_error: &str,
) -> Option<Vec<(Tok, std::ops::Range<usize>)>> {
    let mut tokens = Vec::new();
    let mut lexer = Tok::lexer(source);
    while let Some(result) = lexer.next() {
        match result {
            Ok(kind) => tokens.push((kind, lexer.span())),
            Err(()) => {
                reports.error(status::MALFORMED_QUERY, parse_error);
                return None;
            }
        }
    }
    Some(tokens)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(Tok, std::ops::Range<usize>)>,
    pos: usize,
    /// Alignment anchors number their neighbor classes independently of
    /// explicitly written class ids.
    align_counter: u32,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Tok> {
        self.kind_at(self.pos)
    }

    fn kind_at(&self, pos: usize) -> Option<Tok> {
        self.tokens.get(pos).map(|(kind, _)| *kind)
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

    fn number(&mut self) -> Option<u32> {
        self.text(Tok::Number).and_then(|n| n.parse().ok())
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek_text(), Some((Tok::Word, text)) if text == word)
    }

    fn alternation(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        self.depth += 1;
        if self.depth > super::MAX_NESTING {
            reports.error(status::QUERY_TOO_COMPLEX, super::NESTING_ERROR);
            return None;
        }
        let node = self.alternation_inner(reports);
        self.depth -= 1;
        node
    }

    fn alternation_inner(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let mut alternatives = vec![self.sequence(reports)?];
        while self.eat(Tok::Pipe) {
            alternatives.push(self.sequence(reports)?);
        }
        if alternatives.len() == 1 {
            alternatives.pop()
        } else {
            Some(Group::disjunction(alternatives).into())
        }
    }

    /// One run of segments. Consecutive empty tokens fold into a single
    /// repetition; alignment anchors wrap their neighbors in classes.
    fn sequence(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let mut segments: Vec<QueryNode> = Vec::new();
        // Summed quantifiers of the current run of `[]` segments.
        let mut pending_empty: Option<Boundary> = None;
        // Class id of the last pushed segment, if an alignment anchor
        // already wrapped it.
        let mut last_class: Option<u32> = None;

        loop {
            match self.peek() {
                None
                | Some(
                    Tok::Pipe | Tok::Comma | Tok::ParenClose | Tok::BraceClose
                    | Tok::BracketClose | Tok::AngleClose,
                ) => break,
                Some(Tok::Word) if self.at_keyword("within") || self.at_keyword("meta") => break,
                Some(Tok::Caret) => {
                    self.bump();
                    flush_empty(&mut segments, &mut pending_empty);
                    let left = match segments.last() {
                        Some(_) => match last_class {
                            Some(id) => id as i32,
                            None => {
                                self.align_counter += 1;
                                let id = self.align_counter;
                                let node = segments.pop().unwrap_or(QueryNode::any_token());
                                segments.push(Group::class(id, node).into());
                                id as i32
                            }
                        },
                        None => -1,
                    };
                    let right = if self.at_segment_start() {
                        let node = self.quantified_segment(reports)?;
                        self.align_counter += 1;
                        let id = self.align_counter;
                        segments.push(Group::class(id, node).into());
                        last_class = Some(id);
                        id as i32
                    } else {
                        -1
                    };
                    reports.alignment(left, right);
                }
                _ => {
                    let (node, empty) = self.segment(reports)?;
                    let boundary = self.quantifier(reports)?;
                    if empty {
                        let boundary = boundary.unwrap_or(Boundary::fixed(1));
                        pending_empty = Some(match pending_empty {
                            Some(run) => run.sum(boundary),
                            None => boundary,
                        });
                        continue;
                    }
                    flush_empty(&mut segments, &mut pending_empty);
                    let node = match boundary {
                        Some(boundary) => Group::repetition(boundary, node).into(),
                        None => node,
                    };
                    segments.push(node);
                    last_class = None;
                }
            }
        }
        flush_empty(&mut segments, &mut pending_empty);

        match segments.len() {
            0 => None,
            1 => segments.pop(),
            _ => Some(Group::sequence(segments).into()),
        }
    }

    fn at_segment_start(&self) -> bool {
        match self.peek() {
            Some(
                Tok::BracketOpen | Tok::AngleOpen | Tok::ParenOpen | Tok::QueryRefOpen
                | Tok::BraceOpen | Tok::Bang | Tok::Quoted | Tok::Verbatim | Tok::Number,
            ) => true,
            Some(Tok::Word) => !self.at_keyword("within") && !self.at_keyword("meta"),
            _ => false,
        }
    }

    /// A segment with its quantifier already applied (alignment
    /// neighbors are classed as a whole).
    fn quantified_segment(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        let (node, empty) = self.segment(reports)?;
        let boundary = self.quantifier(reports)?;
        match boundary {
            Some(boundary) => Some(Group::repetition(boundary, node).into()),
            None if empty => Some(QueryNode::any_token()),
            None => Some(node),
        }
    }

    /// Returns the segment node and whether it was a bare `[]`.
    fn segment(&mut self, reports: &mut Reports) -> Option<(QueryNode, bool)> {
        match self.peek() {
            Some(Tok::BracketOpen) => self.token_segment(false, reports),
            Some(Tok::Bang) => {
                let mut negated = false;
                while self.eat(Tok::Bang) {
                    negated = !negated;
                }
                match self.peek() {
                    Some(Tok::BracketOpen) => self.token_segment(negated, reports),
                    Some(Tok::Word | Tok::Number | Tok::Quoted | Tok::Verbatim) => {
                        self.word_segment(negated).map(|n| (n, false))
                    }
                    _ => None,
                }
            }
            Some(Tok::AngleOpen) => self.span_segment(reports).map(|n| (n, false)),
            Some(Tok::ParenOpen) => {
                self.bump();
                let node = self.alternation(reports)?;
                if !self.eat(Tok::ParenClose) {
                    return None;
                }
                Some((node, false))
            }
            Some(Tok::QueryRefOpen) => self.query_ref().map(|n| (n, false)),
            Some(Tok::BraceOpen) => self.class_segment(reports).map(|n| (n, false)),
            Some(Tok::Word) => {
                if self.kind_at(self.pos + 1) == Some(Tok::ParenOpen) {
                    if let Some(node) = self.function_segment(reports) {
                        return Some((node?, false));
                    }
                }
                self.word_segment(false).map(|n| (n, false))
            }
            Some(Tok::Number | Tok::Quoted | Tok::Verbatim) => {
                self.word_segment(false).map(|n| (n, false))
            }
            _ => None,
        }
    }

    /// Quantifier following a segment: `*`, `+`, `?`, or a numeric
    /// range in braces. Braces that do not contain a plain range are a
    /// class and stay untouched.
    fn quantifier(&mut self, reports: &mut Reports) -> Option<Option<Boundary>> {
        match self.peek() {
            Some(Tok::Star) => {
                self.bump();
                Some(Some(Boundary::new(0, None)))
            }
            Some(Tok::Plus) => {
                self.bump();
                Some(Some(Boundary::new(1, None)))
            }
            Some(Tok::Question) => {
                self.bump();
                Some(Some(Boundary::new(0, Some(1))))
            }
            Some(Tok::BraceOpen) if self.brace_is_range() => {
                self.bump();
                let boundary = self.range(reports)?;
                if !self.eat(Tok::BraceClose) {
                    return None;
                }
                Some(Some(boundary))
            }
            _ => Some(None),
        }
    }

    /// Distinguishes `{3}` / `{3,}` / `{,3}` / `{3,7}` from a class.
    fn brace_is_range(&self) -> bool {
        let mut pos = self.pos + 1;
        let mut numbers = 0;
        let mut commas = 0;
        loop {
            match self.kind_at(pos) {
                Some(Tok::Number) => numbers += 1,
                Some(Tok::Comma) => commas += 1,
                Some(Tok::BraceClose) => return numbers > 0 && commas <= 1,
                _ => return false,
            }
            pos += 1;
        }
    }

    /// Range body between braces, cursor past the opening brace.
    fn range(&mut self, _reports: &mut Reports) -> Option<Boundary> {
        if self.eat(Tok::Comma) {
            // {,max}
            let max = self.number()?;
            return Some(Boundary::new(0, Some(max)));
        }
        let first = self.number()?;
        if self.eat(Tok::Comma) {
            match self.peek() {
                Some(Tok::Number) => Some(Boundary::new(first, self.number())),
                _ => Some(Boundary::new(first, None)),
            }
        } else {
            Some(Boundary::fixed(first))
        }
    }

    /// `Baum`, `"geh.*"`, `'Mann'`, optionally followed by `/i`-style
    /// flags, as a full segment.
    fn word_segment(&mut self, negated: bool) -> Option<QueryNode> {
        let (key, is_regex) = self.key()?;
        let mut term = Term::new("orth", key);
        if is_regex {
            term = term.with_type(TermType::Regex);
        }
        if negated {
            term = term.with_match(Match::Ne);
        }
        self.flags(&mut term, is_regex)?;
        Some(QueryNode::token(term))
    }

    /// A key literal: bare word, number, regex quotes, or verbatim
    /// quotes. Returns the resolved text and whether it is a regex.
    fn key(&mut self) -> Option<(String, bool)> {
        match self.peek() {
            Some(Tok::Word) => Some((self.text(Tok::Word)?, false)),
            Some(Tok::Number) => Some((self.text(Tok::Number)?, false)),
            Some(Tok::Quoted) => {
                let raw = self.text(Tok::Quoted)?;
                Some((raw[1..raw.len() - 1].to_string(), true))
            }
            Some(Tok::Verbatim) => {
                let raw = self.text(Tok::Verbatim)?;
                Some((verbatim_inner(&raw), false))
            }
            _ => None,
        }
    }

    /// Trailing `/i`, `/x`, `/xi` flag runs on a term.
    fn flags(&mut self, term: &mut Term, is_regex: bool) -> Option<()> {
        while self.peek() == Some(Tok::Slash) {
            self.bump();
            let letters = self.text(Tok::Word)?;
            if letters.contains('i') {
                *term = std::mem::take(term).case_insensitive();
            }
            if letters.contains('x') {
                if let Some(key) = term.key.take() {
                    // An already-regex key embeds verbatim; a literal
                    // key needs its metacharacters escaped first.
                    term.key = Some(if is_regex {
                        format!(".*?{key}.*?")
                    } else {
                        substring_regex(&key)
                    });
                }
                term.term_type = Some(TermType::Regex);
            }
        }
        Some(())
    }

    /// `[...]`: a feature bundle or the empty token.
    fn token_segment(
        &mut self,
        negated: bool,
        reports: &mut Reports,
    ) -> Option<(QueryNode, bool)> {
        self.bump();
        if self.eat(Tok::BracketClose) {
            return Some((QueryNode::any_token(), !negated));
        }
        let expr = self.term_disjunction(reports)?;
        if !self.eat(Tok::BracketClose) {
            return None;
        }
        let expr = if negated { expr.negate() } else { expr };
        Some((QueryNode::Token { wrap: Some(expr) }, false))
    }

    fn term_disjunction(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut operands = vec![self.term_conjunction(reports)?];
        while self.eat(Tok::Pipe) {
            operands.push(self.term_conjunction(reports)?);
        }
        Some(fold_terms(TermRelation::Or, operands))
    }

    fn term_conjunction(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut operands = vec![self.term_unit(reports)?];
        while self.eat(Tok::Amp) {
            operands.push(self.term_unit(reports)?);
        }
        Some(fold_terms(TermRelation::And, operands))
    }

    fn term_unit(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut negated = false;
        while self.eat(Tok::Bang) {
            negated = !negated;
        }
        let expr = if self.eat(Tok::ParenOpen) {
            let expr = self.term_disjunction(reports)?;
            if !self.eat(Tok::ParenClose) {
                return None;
            }
            expr
        } else {
            self.term(reports)?.into()
        };
        Some(if negated { expr.negate() } else { expr })
    }

    /// `(foundry/)? layer (=|!=|==) key (:value)? flags*`.
    fn term(&mut self, _reports: &mut Reports) -> Option<Term> {
        let first = self.text(Tok::Word)?;
        let (foundry, layer) = if self.peek() == Some(Tok::Slash)
            && self.kind_at(self.pos + 1) == Some(Tok::Word)
        {
            self.bump();
            let layer = self.text(Tok::Word)?;
            (Some(first), layer)
        } else {
            (None, first)
        };

        let negated = match self.peek() {
            Some(Tok::Equals | Tok::EqEq) => {
                self.bump();
                false
            }
            Some(Tok::NotEquals) => {
                self.bump();
                true
            }
            _ => return None,
        };

        let (key, is_regex) = self.key()?;
        let mut term = Term::new(&layer, key);
        match layer.as_str() {
            "base" => term.layer = Some("lemma".into()),
            "punct" => {
                term.layer = Some("orth".into());
                term.term_type = Some(TermType::Punct);
            }
            _ => {}
        }
        if is_regex && term.term_type.is_none() {
            term.term_type = Some(TermType::Regex);
        }
        if let Some(foundry) = foundry {
            term = term.with_foundry(foundry);
        }
        if self.eat(Tok::Colon) {
            let (value, _) = self.key()?;
            term = term.with_value(value);
        }
        if negated {
            term = term.with_match(Match::Ne);
        }
        self.flags(&mut term, is_regex)?;
        Some(term)
    }

    /// `<s>`, `<cnx/c!=vp>`, `<".*">`, with optional attribute terms.
    fn span_segment(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        self.bump();
        let mut wrap = Term::default();
        match self.peek() {
            Some(Tok::Quoted) => {
                let (key, _) = self.key()?;
                wrap.key = Some(key);
                wrap.term_type = Some(TermType::Regex);
            }
            Some(Tok::Word) => {
                let first = self.text(Tok::Word)?;
                if self.peek() == Some(Tok::Slash) {
                    self.bump();
                    let layer = self.text(Tok::Word)?;
                    wrap.foundry = Some(first);
                    wrap.layer = Some(layer);
                    wrap.match_op = self.span_match()?;
                    let (key, is_regex) = self.key()?;
                    wrap.key = Some(key);
                    if is_regex {
                        wrap.term_type = Some(TermType::Regex);
                    }
                } else if matches!(
                    self.peek(),
                    Some(Tok::Equals | Tok::EqEq | Tok::NotEquals)
                ) {
                    wrap.layer = Some(first);
                    wrap.match_op = self.span_match()?;
                    let (key, is_regex) = self.key()?;
                    wrap.key = Some(key);
                    if is_regex {
                        wrap.term_type = Some(TermType::Regex);
                    }
                } else {
                    wrap.key = Some(first);
                }
            }
            _ => return None,
        }

        let attr = if self.peek() != Some(Tok::AngleClose) {
            Some(self.span_attr(reports)?)
        } else {
            None
        };
        if !self.eat(Tok::AngleClose) {
            return None;
        }
        Some(QueryNode::Span { wrap: Some(wrap.into()), attr })
    }

    /// A plain `=` inside a span names the structure without asserting
    /// polarity; `==` and `!=` do.
    fn span_match(&mut self) -> Option<Option<Match>> {
        match self.peek() {
            Some(Tok::Equals) => {
                self.bump();
                Some(None)
            }
            Some(Tok::EqEq) => {
                self.bump();
                Some(Some(Match::Eq))
            }
            Some(Tok::NotEquals) => {
                self.bump();
                Some(Some(Match::Ne))
            }
            _ => None,
        }
    }

    fn span_attr(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut negated = false;
        while self.eat(Tok::Bang) {
            negated = !negated;
        }
        let expr = if self.eat(Tok::ParenOpen) {
            let expr = self.span_attr_disjunction(reports)?;
            if !self.eat(Tok::ParenClose) {
                return None;
            }
            expr
        } else {
            self.span_attr_term()?.into()
        };
        Some(if negated { expr.negate() } else { expr })
    }

    fn span_attr_disjunction(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut operands = vec![self.span_attr_conjunction(reports)?];
        while self.eat(Tok::Pipe) {
            operands.push(self.span_attr_conjunction(reports)?);
        }
        Some(fold_terms(TermRelation::Or, operands))
    }

    fn span_attr_conjunction(&mut self, reports: &mut Reports) -> Option<TermExpr> {
        let mut operands = vec![self.span_attr(reports)?];
        while self.eat(Tok::Amp) {
            operands.push(self.span_attr(reports)?);
        }
        Some(fold_terms(TermRelation::And, operands))
    }

    /// Attribute terms carry the attribute name as `key` and its value
    /// as `value`.
    fn span_attr_term(&mut self) -> Option<Term> {
        let name = self.text(Tok::Word)?;
        let polarity = match self.peek() {
            Some(Tok::Equals | Tok::EqEq) => Match::Eq,
            Some(Tok::NotEquals) => Match::Ne,
            _ => return None,
        };
        self.bump();
        let (value, _) = self.key()?;
        Some(Term {
            key: Some(name),
            value: Some(value),
            match_op: Some(polarity),
            ..Term::default()
        })
    }

    /// `{expr}` and `{n:expr}` class wraps; unnumbered classes share
    /// id 1.
    fn class_segment(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        self.bump();
        let id = if self.peek() == Some(Tok::Number)
            && self.kind_at(self.pos + 1) == Some(Tok::Colon)
        {
            let id = self.number()?;
            self.bump();
            id
        } else {
            1
        };
        reports.highlight(id);
        let node = self.alternation(reports)?;
        if !self.eat(Tok::BraceClose) {
            return None;
        }
        Some(Group::class(id, node).into())
    }

    /// `{#name}` or `{#owner/name}`.
    fn query_ref(&mut self) -> Option<QueryNode> {
        self.bump();
        let mut id = self.text(Tok::Word)?;
        if self.eat(Tok::Slash) {
            let name = self.text(Tok::Word)?;
            id = format!("{id}/{name}");
        }
        if !self.eat(Tok::BraceClose) {
            return None;
        }
        Some(QueryNode::QueryRef { id })
    }

    /// Function-style segments. Returns `None` when the word is not a
    /// known function, so the caller can fall back to a bare token.
    fn function_segment(&mut self, reports: &mut Reports) -> Option<Option<QueryNode>> {
        let Some((Tok::Word, name)) = self.peek_text() else {
            return None;
        };
        let frames = match name {
            "contains" => Some(vec![Frame::IsAround]),
            "matches" => Some(vec![Frame::Matches]),
            "startswith" => Some(vec![Frame::StartsWith, Frame::Matches]),
            "endswith" => Some(vec![Frame::EndsWith, Frame::Matches]),
            "overlaps" => Some(vec![Frame::OverlapsLeft, Frame::OverlapsRight]),
            _ => None,
        };
        if let Some(frames) = frames {
            self.bump();
            return Some(self.position_call(frames, reports));
        }
        match name {
            "focus" | "split" => {
                let split = name == "split";
                self.bump();
                Some(self.focus_call(split, reports))
            }
            // Legacy alias; kept for old clients.
            "shrink" => {
                self.bump();
                reports.warning("'shrink' is deprecated; use 'focus' instead.");
                Some(self.focus_call(false, reports))
            }
            "submatch" => {
                self.bump();
                Some(self.submatch_call(reports))
            }
            "dominates" | "dependency" | "relatesTo" => {
                let layer = match name {
                    "dominates" => Some("c"),
                    "dependency" => Some("d"),
                    _ => None,
                };
                self.bump();
                Some(self.relation_call(layer, reports))
            }
            _ => None,
        }
    }

    fn position_call(
        &mut self,
        frames: Vec<Frame>,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            return None;
        }
        let first = self.alternation(reports)?;
        if !self.eat(Tok::Comma) {
            return None;
        }
        let second = self.alternation(reports)?;
        if !self.eat(Tok::ParenClose) {
            return None;
        }
        Some(Group::position(frames, vec![first, second]).into())
    }

    /// `focus(...)`, `focus(n: ...)`, `split(n|m: ...)`.
    fn focus_call(&mut self, split: bool, reports: &mut Reports) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            return None;
        }
        let mut class_refs = Vec::new();
        let mut class_ref_op = None;
        if self.class_refs_follow() {
            class_refs.push(self.number()?);
            loop {
                match self.peek() {
                    Some(Tok::Pipe) => {
                        self.bump();
                        class_ref_op = Some(ClassRefOp::Intersection);
                        class_refs.push(self.number()?);
                    }
                    Some(Tok::Amp) => {
                        self.bump();
                        class_ref_op = Some(ClassRefOp::Union);
                        class_refs.push(self.number()?);
                    }
                    Some(Tok::Colon) => {
                        self.bump();
                        break;
                    }
                    _ => {
                        reports.error(
                            status::INVALID_CLASS_REFERENCE,
                            "The specified class reference in the \
                             focus/split-Operator is not a number.",
                        );
                        return None;
                    }
                }
            }
        } else {
            class_refs.push(1);
        }
        let operand = self.alternation(reports)?;
        if !self.eat(Tok::ParenClose) {
            return None;
        }
        let mut reference = Reference::focus_on(class_refs[0], operand);
        reference.class_ref = class_refs;
        reference.class_ref_op = class_ref_op;
        if split {
            reference.operation = RefOp::Split;
        }
        Some(reference.into())
    }

    /// A leading class-reference list ends in a colon; anything else
    /// after the parenthesis belongs to the operand.
    fn class_refs_follow(&self) -> bool {
        let mut pos = self.pos;
        loop {
            match self.kind_at(pos) {
                Some(Tok::Number | Tok::Pipe | Tok::Amp) => pos += 1,
                Some(Tok::Colon) => return pos > self.pos,
                _ => return false,
            }
        }
    }

    /// `submatch(start(,length)?: expr)`.
    fn submatch_call(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            return None;
        }
        let start = self.number()? as i32;
        let length = if self.eat(Tok::Comma) {
            Some(self.number()? as i32)
        } else {
            None
        };
        if !self.eat(Tok::Colon) {
            return None;
        }
        let operand = self.alternation(reports)?;
        if !self.eat(Tok::ParenClose) {
            return None;
        }
        Some(Reference::span_focus(start, length, operand).into())
    }

    /// `dominates((relSpec:)?A,B)` and friends. The edge term never
    /// asserts a match polarity.
    fn relation_call(
        &mut self,
        layer: Option<&str>,
        reports: &mut Reports,
    ) -> Option<QueryNode> {
        if !self.eat(Tok::ParenOpen) {
            return None;
        }
        let mut wrap = Term::default();
        if let Some(layer) = layer {
            wrap.layer = Some(layer.into());
        }
        let mut boundary = None;
        if self.rel_spec_follows() {
            let first = self.text(Tok::Word)?;
            if self.eat(Tok::Slash) {
                wrap.foundry = Some(first);
                wrap.layer = Some(self.text(Tok::Word)?);
            } else {
                wrap.layer = Some(first);
            }
            if self.eat(Tok::Equals) {
                let (key, _) = self.key()?;
                wrap.key = Some(key);
            }
            boundary = self.quantifier(reports)?;
            if !self.eat(Tok::Colon) {
                return None;
            }
        }
        let first = self.relation_operand(reports)?;
        if !self.eat(Tok::Comma) {
            return None;
        }
        let second = self.relation_operand(reports)?;
        if !self.eat(Tok::ParenClose) {
            return None;
        }
        let relation = RelationSpec { wrap: Some(wrap.into()), boundary };
        Some(Group::Relation { operands: vec![first, second], relation }.into())
    }

    fn rel_spec_follows(&self) -> bool {
        let mut pos = self.pos;
        if self.kind_at(pos) != Some(Tok::Word) {
            return false;
        }
        loop {
            match self.kind_at(pos) {
                Some(
                    Tok::Word | Tok::Slash | Tok::Equals | Tok::Star | Tok::BraceOpen
                    | Tok::BraceClose | Tok::Number | Tok::Comma,
                ) => pos += 1,
                Some(Tok::Colon) => return true,
                _ => return false,
            }
        }
    }

    fn relation_operand(&mut self, reports: &mut Reports) -> Option<QueryNode> {
        self.alternation(reports)
    }

    /// An optional trailing `within <domain>` wraps the whole query in
    /// a containment position.
    fn within(&mut self, node: QueryNode, reports: &mut Reports) -> Option<QueryNode> {
        if !self.at_keyword("within") {
            return Some(node);
        }
        self.bump();
        let Some(domain) = self.text(Tok::Word) else {
            reports.error(status::MALFORMED_QUERY, "Within context is missing.");
            return None;
        };
        let span = QueryNode::span(domain);
        Some(Group::position(vec![Frame::IsAround], vec![span, node]).into())
    }

    /// Trailing `meta key=value ...` pairs become a document constraint.
    fn meta_fields(&mut self, _reports: &mut Reports) -> Option<Value> {
        let mut docs = Vec::new();
        while self.peek() == Some(Tok::Word) {
            let key = self.text(Tok::Word)?;
            if !self.eat(Tok::Equals) {
                return None;
            }
            let (value, _) = self.key()?;
            docs.push(json!({
                "@type": "koral:doc",
                "key": key,
                "value": value,
                "match": "match:eq",
            }));
        }
        match docs.len() {
            0 => None,
            1 => docs.pop(),
            _ => Some(json!({
                "@type": "koral:docGroup",
                "operation": "operation:and",
                "operands": docs,
            })),
        }
    }
}

fn flush_empty(segments: &mut Vec<QueryNode>, pending: &mut Option<Boundary>) {
    if let Some(boundary) = pending.take() {
        if boundary == Boundary::fixed(1) {
            segments.push(QueryNode::any_token());
        } else {
            segments.push(Group::repetition(boundary, QueryNode::any_token()).into());
        }
    }
}

fn fold_terms(relation: TermRelation, mut operands: Vec<TermExpr>) -> TermExpr {
    if operands.len() == 1 {
        return operands.pop().unwrap_or_else(|| Term::default().into());
    }
    TermGroup::new(relation, operands).into()
}

/// Single-quoted keys travel verbatim; only the quote and backslash
/// escapes resolve.
fn verbatim_inner(raw: &str) -> String {
    let body = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(e @ ('\\' | '\'')) => out.push(e),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
